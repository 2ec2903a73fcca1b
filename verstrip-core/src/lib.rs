pub mod dynamic;
pub mod header;
pub mod patch;
pub mod sections;
pub mod stream;

pub use dynamic::*;
pub use header::*;
pub use patch::*;
pub use sections::*;
pub use stream::*;
