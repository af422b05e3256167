//! Medchat - terminal front-end for the patient portal assistant
//!
//! Stands in for the launcher and chat panel: commands toggle the panel
//! and switch identity, any other line is sent to the assistant.

use futures::StreamExt;
use medchat::conversation::{Role, Turn};
use medchat::state_machine::Visibility;
use medchat::{spawn_session, ChatConfig, HttpTransport, LoggingTransport, SessionHandle, WidgetEvent};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LAUNCHER_HINT: &str = "Besoin d'aide ?";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr, the conversation to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ChatConfig::from_env()?;
    tracing::info!(
        base_url = %config.base_url,
        user_id = %config.wire_user_id(),
        "Starting medchat"
    );

    let transport = LoggingTransport::new(HttpTransport::new(&config.base_url)?);
    let (handle, session) = spawn_session(&config, transport);

    let renderer = tokio::spawn(render(handle.clone()));
    println!("[{LAUNCHER_HINT}] /open pour discuter, /quit pour quitter");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => {}
            ("/quit", _) => break,
            ("/open", _) => handle.expand().await?,
            ("/close", _) => handle.collapse().await?,
            ("/toggle", _) => handle.toggle().await?,
            ("/login", id) if !id.trim().is_empty() => {
                handle.switch_identity(Some(id.trim().to_string())).await?;
            }
            ("/login", _) => println!("usage: /login <id>"),
            ("/logout", _) => handle.switch_identity(None).await?,
            _ => submit(&handle, line).await?,
        }
    }

    drop(handle);
    renderer.abort();
    session.await?;
    Ok(())
}

/// Send a message the way the panel's input would: only while it is open
/// and no reply is in progress
async fn submit(handle: &SessionHandle, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = handle.snapshot().await?;
    if snapshot.visibility == Visibility::Collapsed {
        println!("[{LAUNCHER_HINT}] /open pour discuter");
        return Ok(());
    }
    if snapshot.state.is_awaiting() {
        println!("(réponse en cours, veuillez patienter)");
        return Ok(());
    }
    handle.submit(text).await?;
    Ok(())
}

async fn render(handle: SessionHandle) {
    let mut events = handle.events();
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Renderer fell behind");
                continue;
            }
        };

        match event {
            WidgetEvent::PendingUpdated { text } => {
                print!("\rAssistant: {text}");
                let _ = std::io::stdout().flush();
            }
            WidgetEvent::PendingCleared => print!("\r"),
            WidgetEvent::TurnCommitted { turn } if turn.role == Role::Assistant => {
                print_turn(&turn);
            }
            WidgetEvent::ErrorRaised { error } => eprintln!("[{}] {}", error.kind, error.message),
            WidgetEvent::Rejected { reason } => println!("({reason})"),
            WidgetEvent::ConversationReset { turns } => {
                println!("-- nouvelle conversation --");
                turns.iter().for_each(print_turn);
            }
            WidgetEvent::VisibilityChanged {
                visibility: Visibility::Expanded,
            } => {
                if let Ok(snapshot) = handle.snapshot().await {
                    snapshot.turns.iter().for_each(print_turn);
                    if let Some(pending) = snapshot.pending {
                        print!("Assistant: {pending}");
                        let _ = std::io::stdout().flush();
                    }
                }
            }
            WidgetEvent::VisibilityChanged {
                visibility: Visibility::Collapsed,
            } => println!("[{LAUNCHER_HINT}]"),
            WidgetEvent::TurnCommitted { .. }
            | WidgetEvent::StateChanged { .. }
            | WidgetEvent::ErrorCleared => {}
        }
    }
}

fn print_turn(turn: &Turn) {
    match turn.role {
        Role::User => println!("Vous: {}", turn.content),
        Role::Assistant => println!("Assistant: {}", turn.content),
    }
}
