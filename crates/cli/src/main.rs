//! ACE terminal chat client
//!
//! Reads lines from stdin and sends them to the server; renders the
//! conversation, including streamed replies, on stdout.

mod logging;
mod paths;
mod render;

use std::io::Write;
use std::path::PathBuf;

use ace_client::{ClientConfig, SessionHandle};
use clap::Parser;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::paths::DataDir;
use crate::render::{status_line, Renderer};

#[derive(Parser, Debug)]
#[command(name = "ace-chat", version, about = "Chat with an ACE server from the terminal")]
struct Cli {
    /// Server origin; the socket scheme follows it (https → wss)
    #[arg(long, env = "ACE_SERVER_URL")]
    server: Option<String>,

    /// Directory for config.toml and logs [default: ~/.ace]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Attach a per-process session id to every message
    #[arg(long)]
    scoped: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Quit,
    Status,
    Ping,
    Say(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "/quit" | "/exit" => Command::Quit,
            "/status" => Command::Status,
            "/ping" => Command::Ping,
            text => Command::Say(text),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    data_dir.ensure_dirs()?;
    let logging = logging::init_logging(&data_dir.log_dir())?;

    let mut config = ClientConfig::load(&data_dir.config_path())?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if cli.scoped {
        config.session_scoped = true;
    }
    let ws_url = config.ws_url()?;

    let session = ace_client::start(&config)?;
    info!(
        component = "cli",
        event = "cli.started",
        run_id = %logging.run_id,
        url = %ws_url,
        data_dir = %data_dir.root().display(),
        "Chat client started"
    );
    println!(
        "{}",
        style(format!("Connecting to {ws_url}  (/status, /ping, /quit)")).dim()
    );

    let render_task = tokio::spawn(render_loop(session.clone()));
    session.connect().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Status => println!("{}", style(status_line(&session.snapshot())).dim()),
            Command::Ping => session.ping().await,
            Command::Say(text) => session.send_message(text).await,
        }
    }

    session.disconnect().await;
    render_task.abort();
    info!(component = "cli", event = "cli.stopped", "Chat client stopped");
    Ok(())
}

async fn render_loop(session: SessionHandle) {
    let mut renderer = Renderer::default();
    let mut changes = session.subscribe();
    loop {
        let out = renderer.render(&session.snapshot());
        if !out.is_empty() {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(out.as_bytes());
            let _ = stdout.flush();
        }
        if changes.changed().await.is_err() {
            break;
        }
    }
}
