//! # Party Room Client
//!
//! Session and roster synchronization client for the party room real-time
//! voice service.
//!
//! The crate keeps a client attached to its room across page reloads and
//! network drops, and keeps the local participant list consistent with the
//! server's view of the room.
//!
//! ## Features
//!
//! - **Automatic reconnection** with capped exponential backoff
//!   ([`ReconnectPolicy`])
//! - **Durable sessions**: a TTL-bounded record of the current room membership
//!   ([`SessionStore`]) over any [`SessionStorage`] backend
//! - **Session recovery** after every reconnect ([`RecoveryCoordinator`])
//! - **Roster reconciliation** of snapshot and delta updates
//!   ([`RosterReconciler`])
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   text message channel; the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use party_room_client::{
//!     ChannelObserver, PartyClient, PartyClientConfig, SessionEvent, SessionStore,
//!     WebSocketConnector,
//! };
//!
//! # async fn run() -> party_room_client::Result<()> {
//! let (observer, mut events) = ChannelObserver::new(64);
//! let client = PartyClient::start(
//!     WebSocketConnector::new("wss://party.example.com/ws"),
//!     SessionStore::in_memory(),
//!     Arc::new(observer),
//!     PartyClientConfig::default(),
//! );
//! client.connect()?;
//! client.join_room("ABC123", "Alice")?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::RosterChanged(participants) = event {
//!         println!("{} in the room", participants.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod event;
pub mod observer;
pub mod protocol;
pub mod recovery;
pub mod roster;
pub mod session;
pub mod storage;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use backoff::ReconnectPolicy;
pub use client::{PartyClient, PartyClientConfig};
pub use connection::{ConnectionManager, ConnectionState, DisconnectReason};
pub use error::{PartyRoomError, Result};
pub use event::{EventKind, InboundEvent, ListenerId};
pub use observer::{ChannelObserver, NoopObserver, SessionEvent, SessionObserver};
pub use protocol::{ClientMessage, Participant, ParticipantPatch, RosterPayload, ServerMessage};
pub use recovery::{RecoveredSession, RecoveryCoordinator};
pub use roster::RosterReconciler;
pub use session::{SessionRecord, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
