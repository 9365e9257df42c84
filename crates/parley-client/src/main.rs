//! Parley console client.
//!
//! A line-oriented front end over [`parley_client::Client`]. Plain lines are
//! sent to the open chat; lines starting with `/` are commands (`/help`).

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use parley_client::messages::MessageView;
use parley_client::outbound::load_attachment;
use parley_client::session::AuthState;
use parley_client::{Client, ClientConfig, ClientEvent, Intent};
use parley_shared::constants::APP_NAME;
use parley_shared::types::{ChatId, MessageId, Profile, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::info;

const HELP: &str = "\
/chats                    list chats
/open <chat id>           open a chat
/dm <user id>             open a private chat
/search <text>            find users
/whois <user id>          show a user's profile
/group <name> <id,id,..>  create a group chat
/file <path> [text]       send a file
/logout                   log out
/quit                     exit
anything else             send as a message";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    parley_client::init_tracing();
    info!("Starting {} client v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(server = %config.server_url, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 2. Client and event printer
    // -----------------------------------------------------------------------
    let client = Client::connect(config).context("failed to initialise client")?;
    let printer = tokio::spawn(print_events(client.subscribe()));

    // -----------------------------------------------------------------------
    // 3. Resume the stored session, or log in from the environment
    // -----------------------------------------------------------------------
    if let AuthState::LoggedOut = client.start().await {
        let username = std::env::var("PARLEY_USERNAME").unwrap_or_default();
        let password = std::env::var("PARLEY_PASSWORD").unwrap_or_default();
        if username.is_empty() {
            println!("Not logged in. Set PARLEY_USERNAME and PARLEY_PASSWORD.");
            printer.abort();
            return Ok(());
        }
        // Failures are printed by the event task.
        if client.login(&username, &password).await.is_err() {
            printer.abort();
            return Ok(());
        }
    }
    println!("Type /help for commands.");

    // -----------------------------------------------------------------------
    // 4. Input loop
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        run_command(&client, line).await;
        if !client.session().is_authenticated() {
            println!("Logged out.");
            break;
        }
    }

    printer.abort();
    info!("{} client stopped", APP_NAME);
    Ok(())
}

async fn run_command(client: &Client, line: &str) {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let intent = match command {
        "/help" => {
            println!("{HELP}");
            return;
        }
        "/chats" => {
            print_chats(client);
            return;
        }
        "/open" => match rest.parse::<ChatId>() {
            Ok(id) => Intent::SelectChat(id),
            Err(_) => return println!("usage: /open <chat id>"),
        },
        "/dm" => match rest.parse::<UserId>() {
            Ok(id) => Intent::OpenPrivateChat(id),
            Err(_) => return println!("usage: /dm <user id>"),
        },
        "/search" => Intent::Search(rest.to_string()),
        "/whois" => {
            match rest.parse::<UserId>() {
                // Failures are printed by the event task.
                Ok(id) => {
                    if let Ok(user) = client.directory().lookup_user(id).await {
                        print_profile(&user);
                    }
                }
                Err(_) => println!("usage: /whois <user id>"),
            }
            return;
        }
        "/group" => {
            let Some((name, ids)) = rest.rsplit_once(' ') else {
                return println!("usage: /group <name> <id,id,..>");
            };
            let member_ids: Result<Vec<UserId>, _> =
                ids.split(',').map(|id| id.parse::<UserId>()).collect();
            match member_ids {
                Ok(member_ids) => Intent::CreateGroup {
                    name: name.to_string(),
                    member_ids,
                },
                Err(_) => return println!("usage: /group <name> <id,id,..>"),
            }
        }
        "/file" => {
            let (path, text) = match rest.split_once(' ') {
                Some((path, text)) => (path, Some(text.to_string())),
                None => (rest, None),
            };
            match load_attachment(Path::new(path)).await {
                Ok(file) => Intent::Send {
                    text,
                    attachment: Some(file),
                },
                Err(e) => return println!("! {}", e.user_message()),
            }
        }
        "/logout" => Intent::Logout,
        _ if command.starts_with('/') => return println!("unknown command, try /help"),
        _ => Intent::Send {
            text: Some(line.to_string()),
            attachment: None,
        },
    };

    // Errors reach the user through the event stream.
    let _ = client.handle(intent).await;
}

fn print_profile(user: &Profile) {
    println!("[{}] {}", user.id, user.username);
    if let Some(email) = &user.email {
        println!("  email: {email}");
    }
    if let Some(avatar) = &user.avatar {
        println!("  avatar: {avatar}");
    }
}

fn print_chats(client: &Client) {
    let chats = client.directory().snapshot();
    if chats.is_empty() {
        println!("(no chats)");
    }
    for chat in chats {
        let unread = if chat.unread_count > 0 {
            format!(" ({} unread)", chat.unread_count)
        } else {
            String::new()
        };
        println!(
            "[{}] {}{}  {}",
            chat.id,
            chat.title,
            unread,
            chat.preview.unwrap_or_default()
        );
    }
}

async fn print_events(mut rx: broadcast::Receiver<ClientEvent>) {
    // Newest message printed per chat, so polls only show what is new.
    let mut seen: HashMap<ChatId, MessageId> = HashMap::new();
    let mut open: Option<ChatId> = None;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            ClientEvent::AuthChanged { user: Some(user) } => {
                println!("Logged in as {}", user.username);
            }
            ClientEvent::AuthChanged { user: None } => {}
            ClientEvent::Notify { message, severity } => {
                println!("! [{severity:?}] {message}");
            }
            ClientEvent::RegisterSucceeded { username } => {
                println!("Registered {username}, you can log in now");
            }
            ClientEvent::SearchResults { query, users } => {
                println!("Users matching {query:?}:");
                for user in users {
                    println!("  [{}] {}", user.id, user.username);
                }
            }
            ClientEvent::MessagesUpdated { chat_id, groups } => {
                if open != Some(chat_id) {
                    println!("--- chat {chat_id} ---");
                    open = Some(chat_id);
                    seen.remove(&chat_id);
                }
                let last_seen = seen.get(&chat_id).copied();
                for group in groups {
                    let mut fresh = group
                        .messages
                        .iter()
                        .filter(|m| last_seen.map_or(true, |last| m.id > last))
                        .peekable();
                    if fresh.peek().is_none() {
                        continue;
                    }
                    println!("  {}", group.title);
                    for message in fresh {
                        print_message(message);
                        let newest = seen.entry(chat_id).or_insert(message.id);
                        *newest = (*newest).max(message.id);
                    }
                }
            }
            ClientEvent::ChatsUpdated { .. } => {}
        }
    }
}

fn print_message(message: &MessageView) {
    let who = if message.is_own {
        "you"
    } else {
        message.sender_name.as_str()
    };
    let file = message
        .file_ref
        .as_deref()
        .map(|f| format!(" <{f}>"))
        .unwrap_or_default();
    println!(
        "    {} {}: {}{}",
        message.created_at.format("%H:%M"),
        who,
        message.text,
        file
    );
}
