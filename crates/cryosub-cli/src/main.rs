mod commands;
mod progress;
mod summary;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cryosub", about = "Subtract projections of a map from cryo-EM particle images")]
#[command(version)]
struct Cli {
    /// Enable verbose output (same as --loglevel debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log filter, e.g. "info", "WARNING" or "cryosub_core=debug"
    #[arg(long, global = true, default_value = "warn")]
    loglevel: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subtract map projections from every particle in a STAR file
    Run(commands::run::RunArgs),
    /// Precompute the Fourier volume of a map
    Fourier(commands::fourier::FourierArgs),
    /// Show MRC or STAR file metadata
    Info(commands::info::InfoArgs),
    /// Print or save a default config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        let directive = log_directive(&cli.loglevel)?;
        EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid --loglevel '{}'", cli.loglevel))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Fourier(args) => commands::fourier::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}

/// Map `--loglevel` to an `EnvFilter` directive. Python-style level names
/// are accepted; a bare word that is not a level is rejected rather than
/// read as a target name.
fn log_directive(level: &str) -> Result<String> {
    let level = level.trim();
    match level.to_ascii_lowercase().as_str() {
        "warning" => return Ok("warn".into()),
        "critical" | "fatal" => return Ok("error".into()),
        "notset" => return Ok("trace".into()),
        _ => {}
    }
    if !level.contains(['=', ',', '[']) && level.parse::<LevelFilter>().is_err() {
        bail!(
            "Invalid --loglevel '{}' (expected a level such as warn, info or debug, or a filter directive)",
            level
        );
    }
    Ok(level.to_string())
}
