use anyhow::Result;
use clap::Parser;
use verstrip_core::patch_file;

/// Strip symbol-versioning metadata from an ELF executable, in place
#[derive(Parser)]
#[command(
    name = "verstrip",
    about = "Zero the DT_VERSYM/DT_VERNEED/DT_VERNEEDNUM entries of an ELF file's dynamic section",
    version,
    author
)]
struct Cli {
    /// Path to an ELF executable, opened read-write and patched in place
    #[arg(required = true)]
    path: std::path::PathBuf,
}

fn run(cli: &Cli) -> Result<()> {
    let report = patch_file(&cli.path)?;
    if report.was_noop() {
        log::info!("{}: nothing to strip", cli.path.display());
    } else {
        log::info!(
            "{}: zeroed {} of {} dynamic entries",
            cli.path.display(),
            report.stripped,
            report.entries
        );
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    // Diagnostics go to stdout and any failure exits 1, so the library
    // stays free of process-termination side effects.
    if let Err(err) = run(&cli) {
        println!("{err:#}");
        std::process::exit(1);
    }
}
