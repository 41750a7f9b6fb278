//! Post-Scarcity RTS - AI Development Tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rts_ai_tools::topology::{self, MachineKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rts-ai-tools")]
#[command(about = "Development tools for the Post-Scarcity RTS unit AI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a tuning file
    Validate {
        /// Path to the RON tuning file
        path: PathBuf,
    },
    /// Print transition tables
    Topology {
        /// Machine to print; all when omitted
        #[arg(value_enum)]
        machine: Option<MachineKind>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating tuning file: {}", path.display());
            match rts_ai_tools::validate::validate_tuning_file(&path) {
                Ok(tuning) => {
                    tracing::info!("Validation passed");
                    println!("{tuning:#?}");
                }
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Topology { machine, json } => {
            let kinds = machine.map_or_else(|| MachineKind::ALL.to_vec(), |kind| vec![kind]);
            for kind in kinds {
                if let Err(e) = topology::validate(kind) {
                    tracing::error!("{} is malformed: {e}", kind.name());
                    std::process::exit(1);
                }
                if json {
                    match topology::render_json(kind) {
                        Ok(doc) => println!("{doc}"),
                        Err(e) => {
                            tracing::error!("Cannot encode {}: {e}", kind.name());
                            std::process::exit(1);
                        }
                    }
                } else {
                    println!("{}", topology::render(kind));
                }
            }
        }
    }
}
