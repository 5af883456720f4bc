//! Transport abstraction for the party room protocol.
//!
//! The [`Transport`] trait defines one live bidirectional text message
//! channel between the client and server. Every protocol message is a single
//! JSON text message, so implementations handle framing internally.
//!
//! Because the client reconnects on its own, it does not take a transport
//! directly. It takes a [`Connector`], which opens a fresh transport each
//! time the client connects or retries.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use party_room_client::error::PartyRoomError;
//! use party_room_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), PartyRoomError> {
//!         // Send the JSON text message over your transport
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, PartyRoomError>> {
//!         // Receive the next JSON text message.
//!         // Return None when the server deliberately closed the connection.
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), PartyRoomError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&mut self) -> Result<Box<dyn Transport>, PartyRoomError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::PartyRoomError;

/// A bidirectional text message transport.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`PartyRoomError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), PartyRoomError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(PartyRoomError::TransportClosed))`: the connection dropped
    ///   without a deliberate close
    /// - `Some(Err(e))`: any other transport failure
    /// - `None`: the server deliberately closed the connection
    ///
    /// The client reconnects after `Some(Err(_))` but not after `None`.
    async fn recv(&mut self) -> Option<Result<String, PartyRoomError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), PartyRoomError>;

    /// The server-assigned id of this connection, if the transport learns it
    /// during its handshake.
    fn connection_id(&self) -> Option<String> {
        None
    }
}

/// Opens fresh [`Transport`]s on demand.
#[async_trait]
pub trait Connector: Send + 'static {
    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed connection attempt and feeds the
    /// reconnect backoff.
    async fn connect(&mut self) -> Result<Box<dyn Transport>, PartyRoomError>;
}
