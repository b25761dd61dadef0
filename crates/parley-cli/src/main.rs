//! Parley chat client binary.
//!
//! Reads chat lines from stdin and prints the channel's history, status and
//! errors to stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Join #general on a local server
//! parley --username alice --channel general
//!
//! # Back off between retries, give up after five attempts
//! parley -u alice -c general --max-reconnect-delay-ms 30000 --max-attempts 5
//! ```
//!
//! Type `/quit` (or send EOF) to disconnect and exit.

use std::{future::Future, time::Duration};

use clap::Parser;
use parley_client::{
    ChatClient, ConnectionParameters, ConnectionStatus, Connector, Environment, InboundMessage,
    ManagerConfig, MessageKind, ReconnectPolicy, WsChatClient,
};
use parley_core::DEFAULT_CONNECT_GRACE;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Ceiling for backoff delays when only `--max-attempts` is given.
const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Parley chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Line-oriented Parley chat client")]
#[command(version)]
struct Args {
    /// Chat server WebSocket endpoint
    #[arg(long, default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Name to chat as
    #[arg(short, long)]
    username: String,

    /// Channel to join
    #[arg(short, long)]
    channel: String,

    /// Delay before reconnecting after a lost connection
    #[arg(long, default_value = "3000")]
    reconnect_delay_ms: u64,

    /// Upper bound for backoff delays (enables exponential backoff)
    #[arg(long)]
    max_reconnect_delay_ms: Option<u64>,

    /// Reconnect attempts before giving up (enables exponential backoff)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn params(&self) -> Result<ConnectionParameters, parley_core::ParamsError> {
        ConnectionParameters::new(self.username.clone(), self.channel.clone(), &self.url)
    }

    fn manager_config(&self) -> ManagerConfig {
        let delay = Duration::from_millis(self.reconnect_delay_ms);

        let reconnect = if self.max_reconnect_delay_ms.is_none() && self.max_attempts.is_none() {
            ReconnectPolicy::Fixed { delay }
        } else {
            let max = self.max_reconnect_delay_ms.unwrap_or(DEFAULT_MAX_RECONNECT_DELAY_MS);
            ReconnectPolicy::Backoff {
                initial: delay,
                max: Duration::from_millis(max).max(delay),
                multiplier: 2,
                max_attempts: self.max_attempts,
            }
        };

        ManagerConfig { connect_grace: DEFAULT_CONNECT_GRACE, reconnect }
    }
}

/// One history entry as a terminal line.
fn render_message(message: &InboundMessage) -> String {
    match message.kind {
        MessageKind::Message => format!("<{}> {}", message.username, message.content),
        MessageKind::System => format!("-- {}", message.content),
        MessageKind::UserConnected => format!("-> {} joined", message.username),
        MessageKind::UserDisconnected => format!("<- {} left", message.username),
    }
}

fn render_status(status: ConnectionStatus) -> String {
    format!("* {status}")
}

fn render_error(error: Option<&str>) -> Option<String> {
    error.map(|e| format!("! {e}"))
}

async fn write_line<W>(out: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Relay input lines to the client and render its outputs until `/quit`, end
/// of input or `interrupt`.
///
/// The caller still owns the client and tears it down afterwards, whether
/// this returns an I/O error or not.
async fn run_session<C, E, R, W>(
    client: &ChatClient<C, E>,
    input: R,
    out: &mut W,
    interrupt: impl Future<Output = ()>,
) -> std::io::Result<()>
where
    C: Connector,
    E: Environment,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut status = client.watch_status();
    let mut error = client.watch_error();
    let mut messages = client.watch_messages();
    let mut lines = input.lines();
    let mut shown = 0;
    tokio::pin!(interrupt);

    let line = render_status(*status.borrow_and_update());
    write_line(out, &line).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == "/quit" => break,
                Some(line) if line.trim().is_empty() => {},
                Some(line) => client.send_message(line),
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render_status(*status.borrow_and_update());
                write_line(out, &line).await?;
            },
            changed = error.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render_error(error.borrow_and_update().as_deref());
                if let Some(line) = line {
                    write_line(out, &line).await?;
                }
            },
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let fresh: Vec<String> = {
                    let history = messages.borrow_and_update();
                    history.iter().skip(shown).map(render_message).collect()
                };
                shown += fresh.len();
                for line in fresh {
                    write_line(out, &line).await?;
                }
            },
            () = &mut interrupt => break,
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let params = args.params()?;
    let config = args.manager_config();
    tracing::info!(endpoint = %params.connect_url(), reconnect = ?config.reconnect, "parley starting");

    let client = WsChatClient::connect(params, config);
    let input = BufReader::new(tokio::io::stdin());
    let outcome = run_session(&client, input, &mut tokio::io::stdout(), ctrl_c()).await;

    client.disconnect();
    client.shutdown().await;
    tracing::info!("parley stopped");

    outcome?;
    Ok(())
}
