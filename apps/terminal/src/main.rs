use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_settings, AuthToken, ClientEvent, GroupDraft, HttpChatApi, LiveChannel, Message,
    Session, SyncCoordinator,
};
use shared::domain::{ConversationId, Timestamp, UserId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{error::RecvError, Receiver},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides the configured server url.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user: String,
    #[arg(long)]
    token: String,
}

#[derive(Debug, PartialEq)]
enum Command {
    List,
    Open(ConversationId),
    Close,
    Direct(UserId),
    Group { name: String, members: Vec<UserId> },
    Read,
    Search(String),
    Find(String),
    Friends,
    Quit,
    Send(String),
}

impl Command {
    /// `Ok(None)` for a blank line, `Err` with a usage hint for a bad command.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if !line.starts_with('/') {
            return Ok(Some(Self::Send(line.to_string())));
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let command = match verb {
            "/list" => Self::List,
            "/open" => Self::Open(ConversationId::from(required(rest, "/open <conversation id>")?)),
            "/close" => Self::Close,
            "/dm" => Self::Direct(UserId::from(required(rest, "/dm <user id>")?)),
            "/group" => {
                let mut words = rest.split_whitespace();
                let name = words.next().unwrap_or_default().to_string();
                Self::Group {
                    name,
                    members: words.map(UserId::from).collect(),
                }
            }
            "/read" => Self::Read,
            "/search" => Self::Search(rest.to_string()),
            "/find" => Self::Find(rest.to_string()),
            "/friends" => Self::Friends,
            "/quit" => Self::Quit,
            _ => return Err(format!("unknown command {verb}")),
        };
        Ok(Some(command))
    }
}

fn required<'a>(argument: &'a str, usage: &str) -> Result<&'a str, String> {
    if argument.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(argument)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    let session = Session::new(args.user, AuthToken::new(args.token));
    let api = Arc::new(HttpChatApi::new(&settings, session.clone())?);
    let sync = SyncCoordinator::new(session.clone(), api, settings.event_capacity());
    let renderer = tokio::spawn(render_events(Arc::clone(&sync), sync.subscribe_events()));

    sync.refresh_conversations()
        .await
        .context("failed to load conversations")?;
    print_directory(&sync).await;

    let channel = match LiveChannel::connect(&settings, &session).await {
        Ok((channel, inbound)) => {
            let channel = Arc::new(channel);
            sync.attach_channel(channel.clone(), inbound).await;
            Some(channel)
        }
        Err(err) => {
            warn!(%err, "live channel unavailable, continuing without live updates");
            None
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                println!("! {usage}");
                continue;
            }
        };
        if matches!(command, Command::Quit) {
            break;
        }
        if let Err(err) = run(&sync, command).await {
            println!("! {err:#}");
        }
    }

    if let Some(channel) = channel {
        channel.close();
    }
    renderer.abort();
    Ok(())
}

async fn run(sync: &SyncCoordinator, command: Command) -> Result<()> {
    match command {
        Command::List => {
            sync.refresh_conversations().await?;
            print_directory(sync).await;
        }
        Command::Open(conversation_id) => sync.select(conversation_id).await,
        Command::Close => sync.clear_selection().await,
        Command::Direct(peer) => {
            let conversation_id = sync.start_direct(&peer).await?;
            println!("opened {conversation_id}");
        }
        Command::Group { name, members } => {
            let draft = GroupDraft::with_members(name, members);
            let conversation_id = sync.create_group(&draft).await?;
            println!("created group {conversation_id}");
        }
        Command::Read => {
            if let Some(conversation_id) = sync.active_conversation().await {
                sync.mark_read(&conversation_id).await;
            }
        }
        Command::Search(query) => {
            for hit in sync.search(&query).await? {
                println!("{:.2} [{}] {}: {}", hit.score, hit.timestamp, hit.sender, hit.content);
            }
        }
        Command::Find(raw) => {
            let timestamp = Timestamp::parse(&raw).context("expected a timestamp")?;
            match sync.locate_message(&timestamp).await {
                Some(index) => println!("message #{index}"),
                None => println!("no loaded message at {timestamp}"),
            }
        }
        Command::Friends => {
            let friends = sync.friends().await?;
            let without = sync.friends_without_conversation().await?;
            for friend in friends {
                let marker = if without.contains(&friend) { " (no conversation)" } else { "" };
                println!("{friend}{marker}");
            }
        }
        Command::Send(content) => sync.send_message(&content).await?,
        Command::Quit => {}
    }
    Ok(())
}

async fn print_directory(sync: &SyncCoordinator) {
    for summary in sync.conversations().await {
        let unread = match summary.unread_count {
            0 => String::new(),
            count => format!(" ({count})"),
        };
        println!(
            "{} {}{}  {}",
            summary.id,
            sync.display_name(&summary),
            unread,
            summary.last_message.as_deref().unwrap_or_default()
        );
    }
}

fn print_message(message: &Message) {
    let sender = if message.is_mine() { "me" } else { message.sender.as_str() };
    println!(
        "[{}] {}: {}",
        message.timestamp.as_datetime().format("%H:%M:%S"),
        sender,
        message.content
    );
}

async fn render_events(sync: Arc<SyncCoordinator>, mut events: Receiver<ClientEvent>) {
    let mut shown = 0;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "terminal: fell behind on client events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ClientEvent::SelectionChanged(selected) => {
                shown = 0;
                match selected {
                    Some(conversation_id) => println!("-- {conversation_id} --"),
                    None => println!("-- no conversation --"),
                }
            }
            ClientEvent::TimelineChanged { .. } => {
                let messages = sync.messages().await;
                for message in messages.iter().skip(shown) {
                    print_message(message);
                }
                shown = messages.len();
            }
            ClientEvent::HistoryFailed {
                conversation_id,
                message,
            } => println!("! could not load {conversation_id}: {message}"),
            ClientEvent::ChannelClosed => println!("! live channel closed"),
            ClientEvent::Error(message) => println!("! {message}"),
            ClientEvent::DirectoryChanged => {}
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
