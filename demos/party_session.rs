//! # Party Session Example
//!
//! Demonstrates a complete party room client lifecycle:
//!
//! 1. Connect to a party room server via WebSocket
//! 2. Recover the previous session from disk, if one is still live
//! 3. Otherwise create or join a room
//! 4. Print roster changes as participants come and go
//! 5. Shut down gracefully on Ctrl+C or when reconnection gives up
//!
//! ## Running
//!
//! ```sh
//! # Start a party room server on localhost:3000, then:
//! cargo run --example party_session -- Alice
//!
//! # Join an existing room instead of creating one:
//! cargo run --example party_session -- Alice ABC123
//!
//! # Override the server URL:
//! PARTY_ROOM_URL=ws://my-server:3000/ws cargo run --example party_session -- Alice
//! ```

use std::sync::Arc;
use std::time::Duration;

use party_room_client::{
    ChannelObserver, FileStorage, PartyClient, PartyClientConfig, SessionEvent, SessionStore,
    WebSocketConnector,
};

/// Default server URL when `PARTY_ROOM_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:3000/ws";

/// How long to wait for the server to answer a recovery request.
const RECOVERY_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("PARTY_ROOM_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let mut args = std::env::args().skip(1);
    let username = args.next().unwrap_or_else(|| "RustUser".to_string());
    let room_code = args.next();

    let data_dir = std::env::temp_dir().join("party-room-client");
    std::fs::create_dir_all(&data_dir)?;
    let store = SessionStore::new(Arc::new(FileStorage::new(&data_dir)));
    let resuming = store.load().is_some();

    // ── Start ───────────────────────────────────────────────────────
    let (observer, mut events) = ChannelObserver::new(64);
    let mut client = PartyClient::start(
        WebSocketConnector::new(&url),
        store,
        Arc::new(observer),
        PartyClientConfig::default(),
    );
    tracing::info!("Connecting to {url}");
    client.connect()?;

    let join = |client: &PartyClient| match &room_code {
        Some(code) => client.join_room(code.clone(), username.clone()),
        None => client.create_room(username.clone()),
    };

    let recovery_deadline = tokio::time::sleep(RECOVERY_DEADLINE);
    tokio::pin!(recovery_deadline);
    let mut awaiting_recovery = resuming;
    let mut joined = false;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    SessionEvent::StateChanged(state) => {
                        tracing::info!("Connection state: {state}");
                        if state == party_room_client::ConnectionState::Connected
                            && !awaiting_recovery
                            && !joined
                        {
                            join(&client)?;
                            joined = true;
                        }
                    }
                    SessionEvent::SessionSaved(record) => {
                        tracing::info!("In room {} as {}", record.room_code, record.username);
                        joined = true;
                    }
                    SessionEvent::Recovered(session) => {
                        awaiting_recovery = false;
                        tracing::info!(
                            "Recovered room {} ({} participant(s))",
                            session.record.room_code,
                            session.participants.len()
                        );
                    }
                    SessionEvent::RecoveryFailed { reason } => {
                        awaiting_recovery = false;
                        tracing::warn!("Recovery failed ({reason}); joining fresh");
                        join(&client)?;
                        joined = true;
                    }
                    SessionEvent::RosterChanged(participants) => {
                        for p in &participants {
                            let role = if p.is_host { " (host)" } else { "" };
                            let mic = if p.mic_muted { "muted" } else { "live" };
                            tracing::info!("  {}{role} [{mic}]", p.username);
                        }
                    }
                    SessionEvent::ReconnectionFailed => {
                        tracing::error!("Reconnection failed, giving up");
                        break;
                    }
                }
            }

            () = &mut recovery_deadline, if awaiting_recovery => {
                awaiting_recovery = false;
                client.abandon_recovery()?;
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving room");
                client.leave_room()?;
                break;
            }
        }
    }

    client.shutdown().await;
    tracing::info!("Client shut down");
    Ok(())
}
