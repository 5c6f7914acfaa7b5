use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use drone_nav::config;
use drone_nav::errors::{NavError, NavResult};
use drone_nav::navigation::navigator::Navigator;
use drone_nav::navigation::state::StateStore;

/// Ask a vision model for the next drone move toward a named object.
#[derive(Debug, Parser)]
#[command(name = "drone-nav", version)]
struct Cli {
    /// Path to config.toml (otherwise searched next to the binary, in the
    /// working directory, then in the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the state files. Overrides `[state] dir`.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one navigation step for a camera frame.
    Navigate {
        /// Camera frame to analyse. Defaults to `[mission] image`.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Object to reach. Defaults to `[mission] target`.
        #[arg(long)]
        target: Option<String>,

        /// Print the note and prompt without calling the model or touching state.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print stored state as JSON.
    Show {
        /// Only show the entries and arrival of this frame (file name).
        #[arg(long)]
        image: Option<String>,
    },

    /// Delete all state files.
    Reset,
}

#[tokio::main]
async fn main() {
    drone_nav::init_tracing();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "drone-nav failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> NavResult<()> {
    let mut cfg = config::load_config_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.state_dir {
        cfg.state.dir = dir;
    }

    match cli.command {
        Command::Navigate {
            image,
            target,
            dry_run,
        } => {
            let image = image.or_else(|| cfg.mission.image.clone()).ok_or_else(|| {
                NavError::Config("no image given (--image or [mission] image)".into())
            })?;
            let target = target.or_else(|| cfg.mission.target.clone()).ok_or_else(|| {
                NavError::Config("no target given (--target or [mission] target)".into())
            })?;
            let navigator = Navigator::from_config(&cfg)?;

            if dry_run {
                let prepared = navigator.prepare(&image, &target)?;
                if let Some(arrival) = &prepared.pending_arrival {
                    println!("# would record arrival from {} via {}", arrival.from, arrival.via);
                }
                println!("{}", prepared.note.render());
                println!("{}", prepared.prompt);
                return Ok(());
            }

            let outcome = navigator.step(&image, &target).await?;
            println!("\n{}\n", outcome.note);
            println!("{}", outcome.reply);
        }
        Command::Show { image } => {
            let store = StateStore::from_config(&cfg.state);
            let log = store.load_action_log()?;
            let value = match image {
                Some(image) => serde_json::json!({
                    "image": &image,
                    "entries": log.entries(&image),
                    "arrival": store.arrival(&image)?,
                    "failed": log.failed_actions(&image),
                }),
                None => serde_json::json!({
                    "action_log": log,
                    "last_success": store.last_success()?,
                    "arrivals": store.arrivals()?,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Reset => {
            let store = StateStore::from_config(&cfg.state);
            let removed = store.reset()?;
            tracing::info!(removed, "state reset");
        }
    }
    Ok(())
}
