use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use smtc_bridge::cli::{App, Cli, Commands, DaemonCommands};
use smtc_bridge::models::MediaMetadata;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let app = App::new(cli.home)?;

    match cli.command {
        Commands::Press { button } => {
            app.press(button)?;
        }
        Commands::Metadata {
            title,
            artist,
            album,
            artwork,
        } => {
            app.metadata(MediaMetadata {
                title,
                artist,
                album,
                artwork_path: artwork,
            })?;
        }
        Commands::Playback { state } => {
            app.playback(state.is_playing())?;
        }
        Commands::Timeline {
            position_ms,
            duration_ms,
        } => {
            app.timeline(position_ms, duration_ms)?;
        }
        Commands::Artwork { file } => {
            app.artwork(&file)?;
        }
        Commands::Listen { count } => {
            app.listen(count)?;
        }
        Commands::Status => {
            app.status()?;
        }
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                app.daemon_start()?;
            }
            DaemonCommands::Stop => {
                app.daemon_stop()?;
            }
            DaemonCommands::Status => {
                app.daemon_status()?;
            }
            DaemonCommands::Run => {
                app.daemon_run()?;
            }
        },
    }

    Ok(())
}
