//! Headless inkroom client: list boards, export them, post notes, and
//! follow live activity from a terminal.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inkroom_core::{
    BoardStore, ClientConfig, ConnectionState, HttpBoardStore, JoinError, NativeBoardSession, NativeTransport,
    NotePatch,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Time for the socket thread to write queued frames before exit.
const FLUSH_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "inkroom", version, about = "Headless client for inkroom boards")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Bearer token
    #[arg(long, global = true, env = "INKROOM_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the boards you can open
    Projects,
    /// Render a board and its notes to a PNG file
    Export {
        slug: String,
        /// Output path (defaults to board-<slug>.png)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Add a note to a board
    Note { slug: String, text: String },
    /// Join a board and report live activity until interrupted
    Follow {
        slug: String,
        /// Export the board here on exit
        #[arg(long, value_name = "PATH")]
        export_on_exit: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ClientConfig::load(cli.config.as_deref()).context("loading config")?;
    let token = match cli.token {
        Some(token) if !token.is_empty() => token,
        _ => bail!("no token: pass --token or set INKROOM_TOKEN"),
    };
    let store = HttpBoardStore::new(&config.api_base, token.clone())?;

    match cli.command {
        Command::Projects => {
            for project in store.projects().await? {
                println!("{}\t{}", project.slug, project.name);
            }
        }
        Command::Export { slug, out } => {
            let snapshot = store.board_state(&slug).await?;
            let session =
                NativeBoardSession::from_snapshot(&slug, String::new(), snapshot, &config, NativeTransport::new())?;
            let path = out.unwrap_or_else(|| PathBuf::from(session.export_file_name()));
            std::fs::write(&path, session.export_png()?).with_context(|| format!("writing {}", path.display()))?;
            println!("Exported {} to {}", slug, path.display());
        }
        Command::Note { slug, text } => {
            let mut session = join(&store, &slug, &token, &config).await?;
            wait_connected(&mut session).await?;

            let Some(id) = session.add_note() else {
                bail!("board closed");
            };
            session.update_note(id, &NotePatch::text(text));
            println!("Added note {} to {}", id, slug);

            session.leave();
            tokio::time::sleep(FLUSH_GRACE).await;
        }
        Command::Follow { slug, export_on_exit } => {
            let mut session = join(&store, &slug, &token, &config).await?;
            follow(&mut session).await;

            if let Some(path) = export_on_exit {
                std::fs::write(&path, session.export_png()?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Exported {} to {}", slug, path.display());
            }
            session.leave();
        }
    }
    Ok(())
}

async fn join(store: &HttpBoardStore, slug: &str, token: &str, config: &ClientConfig) -> Result<NativeBoardSession> {
    match NativeBoardSession::join(store, slug, token, config, NativeTransport::new()).await {
        Ok(session) => {
            let title = if session.title().is_empty() { slug } else { session.title() };
            println!("Joined {} as {}", title, session.author());
            Ok(session)
        }
        Err(JoinError::Unauthorized) => bail!("not authorized: check your token"),
        Err(e) => Err(e.into()),
    }
}

async fn wait_connected(session: &mut NativeBoardSession) -> Result<()> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        session.process_incoming();
        match session.connection_state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Error | ConnectionState::Disconnected => bail!("could not reach the relay"),
            ConnectionState::Connecting if Instant::now() >= deadline => bail!("timed out connecting to the relay"),
            ConnectionState::Connecting => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

async fn follow(session: &mut NativeBoardSession) {
    let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut state = session.connection_state();
    let mut events = 0usize;

    loop {
        tokio::select! {
            _ = &mut interrupt => break,
            _ = ticker.tick() => {
                let applied = session.process_incoming();
                session.pump(Instant::now());
                if applied > 0 {
                    events += applied;
                    println!("{} events received, {} notes on board", events, session.notes().len());
                }

                let current = session.connection_state();
                if current != state {
                    println!("Relay: {:?}", current);
                    state = current;
                }
            }
        }
    }
    log::info!("Stopped following after {} events", events);
}
