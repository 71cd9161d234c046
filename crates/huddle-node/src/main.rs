//! Huddle chat binary.
//!
//! # Usage
//!
//! ```bash
//! # Host a room; the printed code is the listen address
//! huddle --bind 192.168.1.10:0 --host
//!
//! # Join it from another machine
//! huddle --bind 192.168.1.11:0 --join 192.168.1.10:41235
//! ```
//!
//! Interactive commands: `/host`, `/join <code>`, `/leave`, `/who`, `/quit`.
//! Any other line is sent as chat.

use std::time::Duration;

use clap::Parser;
use huddle_core::{LogLevel, MAX_PARTICIPANTS, REJECTION_GRACE, RoomConfig};
use huddle_node::{
    Backoff, BroadcastPolicy, Node, NodeCommand, NodeConfig, NodeEvent, SystemEnv, TcpDirectory,
};
use huddle_proto::{Participant, PeerId, Role};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Serverless room chat
#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Serverless star-topology room chat")]
#[command(version)]
struct Args {
    /// Address to listen on; it doubles as this node's join code
    #[arg(short, long, default_value = "127.0.0.1:0")]
    bind: String,

    /// Create a room as soon as the directory is connected
    #[arg(long, conflicts_with = "join")]
    host: bool,

    /// Join the room with this code as soon as the directory is connected
    #[arg(short, long)]
    join: Option<String>,

    /// Room capacity, host included
    #[arg(long, default_value_t = MAX_PARTICIPANTS)]
    max_participants: usize,

    /// Delay before a rejected candidate's link is closed, in milliseconds
    #[arg(long, default_value_t = REJECTION_GRACE.as_millis() as u64)]
    rejection_grace_ms: u64,

    /// Retries for a failed link write (0 = best effort)
    #[arg(long, default_value_t = 0)]
    write_retries: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    fn node_config(&self) -> NodeConfig {
        let broadcast_policy = match self.write_retries {
            0 => BroadcastPolicy::BestEffort,
            n => BroadcastPolicy::Retry { max_attempts: n, initial_backoff_ms: 50 },
        };

        NodeConfig {
            bind_address: self.bind.clone(),
            room: RoomConfig {
                max_participants: self.max_participants.max(1),
                rejection_grace: Duration::from_millis(self.rejection_grace_ms),
                ..RoomConfig::default()
            },
            reconnect: Backoff::default(),
            broadcast_policy,
            ..NodeConfig::default()
        }
    }

    fn startup_command(&self) -> Option<NodeCommand> {
        if self.host {
            return Some(NodeCommand::CreateRoom);
        }
        self.join.as_ref().map(|code| NodeCommand::JoinRoom { code: PeerId::from(code.as_str()) })
    }
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(NodeCommand),
    Who,
    Help,
    Empty,
}

fn parse_line(line: &str) -> Result<Input, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Input::Command(NodeCommand::SendChat { text: line.to_string() }));
    };

    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("host"), None) => Ok(Input::Command(NodeCommand::CreateRoom)),
        (Some("join"), Some(code)) => {
            Ok(Input::Command(NodeCommand::JoinRoom { code: PeerId::from(code) }))
        },
        (Some("join"), None) => Err("usage: /join <code>".into()),
        (Some("leave"), None) => Ok(Input::Command(NodeCommand::LeaveRoom)),
        (Some("who"), None) => Ok(Input::Who),
        (Some("quit"), None) => Ok(Input::Command(NodeCommand::Shutdown)),
        (Some("help"), None) => Ok(Input::Help),
        _ => Err(format!("unknown command: {trimmed}")),
    }
}

const HELP: &str = "/host  /join <code>  /leave  /who  /quit";

struct Console {
    out: Stdout,
    roster: Vec<Participant>,
}

impl Console {
    async fn line(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }

    async fn render(&mut self, event: NodeEvent) -> std::io::Result<()> {
        match event {
            NodeEvent::Identifier(id) => self.line(&format!("* your code: {id}")).await,
            NodeEvent::StateChanged(state) => self.line(&format!("* {state}")).await,
            NodeEvent::RosterChanged(roster) => {
                self.roster = roster;
                if self.roster.is_empty() {
                    return Ok(());
                }
                let who = self.who();
                self.line(&format!("* in room: {who}")).await
            },
            NodeEvent::Chat { sender, text } => self.line(&format!("<{sender}> {text}")).await,
            NodeEvent::Log { level, message } if level >= LogLevel::Warn => {
                self.line(&format!("! {message}")).await
            },
            NodeEvent::Log { .. } => Ok(()),
            NodeEvent::CommandFailed(e) => self.line(&format!("! {e}")).await,
        }
    }

    fn who(&self) -> String {
        if self.roster.is_empty() {
            return "not in a room".into();
        }
        let names: Vec<String> = self
            .roster
            .iter()
            .map(|p| match p.role {
                Role::Host => format!("{} (host)", p.identifier),
                Role::Client => p.identifier.to_string(),
            })
            .collect();
        names.join(", ")
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

    let config = args.node_config();
    tracing::info!("Huddle starting on {}", config.bind_address);

    let directory = TcpDirectory::parse(&config.bind_address)?;
    let (node, handle) = Node::new(directory, SystemEnv::new(), config);
    let mut node = tokio::spawn(node.run());

    let (commands, mut events) = handle.into_parts();
    let mut startup = args.startup_command();
    let mut console = Console { out: tokio::io::stdout(), roster: Vec::new() };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = &mut node => {
                result??;
                return Ok(());
            },
            Some(event) = events.recv() => {
                if matches!(event, NodeEvent::Identifier(_)) {
                    if let Some(command) = startup.take() {
                        commands.send(command).await?;
                    }
                }
                console.render(event).await?;
            },
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    commands.send(NodeCommand::Shutdown).await?;
                    continue;
                };
                match parse_line(&line) {
                    Ok(Input::Command(command)) => commands.send(command).await?,
                    Ok(Input::Who) => {
                        let who = console.who();
                        console.line(&who).await?;
                    },
                    Ok(Input::Help) => console.line(HELP).await?,
                    Ok(Input::Empty) => {},
                    Err(message) => console.line(&format!("! {message}")).await?,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_chat_verbatim() {
        assert_eq!(
            parse_line("  hello /there ").unwrap(),
            Input::Command(NodeCommand::SendChat { text: "  hello /there ".into() })
        );
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_line("/host").unwrap(), Input::Command(NodeCommand::CreateRoom));
        assert_eq!(
            parse_line("/join 10.0.0.2:4000").unwrap(),
            Input::Command(NodeCommand::JoinRoom { code: PeerId::from("10.0.0.2:4000") })
        );
        assert_eq!(parse_line("/leave").unwrap(), Input::Command(NodeCommand::LeaveRoom));
        assert_eq!(parse_line("/who").unwrap(), Input::Who);
        assert_eq!(parse_line("/quit").unwrap(), Input::Command(NodeCommand::Shutdown));
        assert_eq!(parse_line("   ").unwrap(), Input::Empty);
    }

    #[test]
    fn bad_commands_are_reported() {
        assert!(parse_line("/join").is_err());
        assert!(parse_line("/dance").is_err());
        assert!(parse_line("/host now").is_err());
    }

    #[test]
    fn args_build_node_config() {
        let args = Args::parse_from([
            "huddle",
            "--max-participants",
            "7",
            "--rejection-grace-ms",
            "250",
            "--write-retries",
            "3",
        ]);
        let config = args.node_config();

        assert_eq!(config.room.max_participants, 7);
        assert_eq!(config.room.rejection_grace, Duration::from_millis(250));
        assert_eq!(
            config.broadcast_policy,
            BroadcastPolicy::Retry { max_attempts: 3, initial_backoff_ms: 50 }
        );
        assert_eq!(args.startup_command(), None);
    }
}
