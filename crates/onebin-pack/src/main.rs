//! onebin resource packer
//!
//! Builds single-file executables: stages a bundle manifest into numbered
//! payload files, embeds them (plus an icon) into a copy of the launcher, and
//! inspects the result.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use onebin_core::IconChoice;
use onebin_pack::commands::{inspect, pack, stage};
use onebin_pack::output::{resolve_color_choice, StyledOutput};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onebin-pack")]
#[command(about = "Embed a runtime and application into a launcher executable", long_about = None)]
#[command(version)]
struct Cli {
    /// When to use colors: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store payload files and an icon in a target executable
    Pack {
        /// Icon to brand the executable with: standard or debug
        icon: IconChoice,
        /// Executable to update in place
        target: PathBuf,
        /// Payload files, each named after its resource ID (e.g. 42.bin)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Executable to copy the icon from (defaults to the built-in icons)
        #[arg(long)]
        icon_source: Option<PathBuf>,
    },

    /// Write one numbered payload file per slot from a bundle manifest
    Stage {
        /// Bundle manifest (onebin.toml)
        manifest: PathBuf,
        /// Output directory for the numbered files
        out_dir: PathBuf,
    },

    /// Show the slots embedded in an executable
    Inspect {
        /// Executable to inspect
        exe: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ONEBIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Pack {
            icon,
            target,
            files,
            icon_source,
        } => pack::execute(icon, &target, &files, icon_source.as_deref(), &mut out),

        Commands::Stage { manifest, out_dir } => stage::execute(&manifest, &out_dir, &mut out),

        Commands::Inspect { exe, json } => inspect::execute(&exe, json, &mut out),
    };

    if let Err(e) = result {
        out.report_error(&e);
        std::process::exit(1);
    }
}
