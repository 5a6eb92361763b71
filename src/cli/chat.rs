use log::info;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };

use super::ChatArgs;
use crate::client::RelayClient;
use crate::history::{ ConversationStore, JsonFileBackend };
use crate::models::chat::Role;
use crate::session::ChatSession;

const HELP: &str =
    "/new  /list  /switch <id>  /title <text>  /clear  /delete  /stream on|off  /quit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    New,
    List,
    Switch(String),
    Title(String),
    Clear,
    Delete,
    Stream(bool),
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match (name, rest) {
        ("new", _) => Input::New,
        ("list", _) => Input::List,
        ("switch", id) if !id.is_empty() => Input::Switch(id.to_string()),
        ("title", title) if !title.is_empty() => Input::Title(title.to_string()),
        ("clear", _) => Input::Clear,
        ("delete", _) => Input::Delete,
        ("stream", "on") => Input::Stream(true),
        ("stream", "off") => Input::Stream(false),
        ("help", _) => Input::Help,
        ("quit", _) | ("exit", _) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Astra",
    }
}

fn print_active(store: &ConversationStore) {
    if let Some(conversation) = store.active() {
        println!("--- {} ({}) ---", conversation.title, conversation.id);
        for message in &conversation.messages {
            println!("{}: {}", speaker(message.role), message.content);
        }
    }
}

fn print_list(store: &ConversationStore) {
    let active = store.active_id().unwrap_or_default();
    for conversation in store.list() {
        let marker = if conversation.id == active { '*' } else { ' ' };
        println!(
            "{} {}  {}  ({} messages, updated {})",
            marker,
            conversation.id,
            conversation.title,
            conversation.messages.len(),
            conversation.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
}

async fn send_and_print(
    session: &mut ChatSession,
    content: &str
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut streamed = false;
    print!("{}: ", speaker(Role::Assistant));
    std::io::stdout().flush()?;

    let reply = session.send(content, |delta| {
        streamed = true;
        print!("{}", delta);
        let _ = std::io::stdout().flush();
    }).await?;

    match reply {
        Some(message) if !streamed => println!("{}", message.content),
        Some(message) if message.is_error => println!("\n{}", message.content),
        Some(_) => println!(),
        None => println!(),
    }
    Ok(())
}

async fn handle_command(
    session: &mut ChatSession,
    input: Input
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let active = session.store().active_id().map(str::to_string);
    let store = session.store_mut();
    match input {
        Input::Message(_) | Input::Quit => {}
        Input::New => {
            store.create_conversation().await?;
            print_active(store);
        }
        Input::List => print_list(store),
        Input::Switch(id) => {
            store.set_active(&id).await?;
            print_active(store);
        }
        Input::Title(title) => {
            if let Some(id) = active {
                store.rename_conversation(&id, &title).await?;
            }
        }
        Input::Clear => {
            if let Some(id) = active {
                store.clear_conversation(&id).await?;
                print_active(store);
            }
        }
        Input::Delete => {
            if let Some(id) = active {
                store.delete_conversation(&id).await?;
                print_active(store);
            }
        }
        Input::Stream(enabled) => {
            store.set_streaming(enabled).await?;
            println!("Streaming {}", if enabled { "on" } else { "off" });
        }
        Input::Help => println!("{}", HELP),
        Input::Unknown(line) => println!("Unknown command '{}'. {}", line, HELP),
    }
    Ok(())
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let backend = Arc::new(JsonFileBackend::new(&args.store_path));
    let mut store = ConversationStore::open(backend.clone()).await?;
    if let Some(id) = &args.conversation {
        store.set_active(id).await?;
    }
    if let Some(stream) = args.stream {
        store.set_streaming(stream).await?;
    }

    let client = RelayClient::new(&args.relay_url, Duration::from_secs(args.timeout_secs))?;
    info!("Chatting through {} (conversations in {})", client.endpoint(), backend.path().display());
    let mut session = ChatSession::new(store, client);

    if let Some(message) = args.message {
        return send_and_print(&mut session, &message).await;
    }

    print_active(session.store());
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Quit => {
                break;
            }
            Input::Message(text) if text.is_empty() => {}
            Input::Message(text) => send_and_print(&mut session, &text).await?,
            command => {
                if let Err(e) = handle_command(&mut session, command).await {
                    println!("{}", e);
                }
            }
        }
    }

    Ok(())
}
