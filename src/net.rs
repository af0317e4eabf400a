//! Networking layer for harness-to-server communication.
//!
//! The server speaks JSON text frames over WebSockets. Every frame is an
//! envelope of the form `{"messageType": ..., "data": {...}}`.

/// Encoding and decoding between wire text and envelopes.
pub mod codec;

/// Error taxonomy for the codec and connection sessions.
pub mod errors;

/// Envelope, inbound event, and outbound command types.
pub mod messages;

/// One logical WebSocket connection to the server.
pub mod session;
