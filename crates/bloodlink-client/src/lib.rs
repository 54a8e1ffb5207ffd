//! Typed client for the Bloodlink REST API and gateway.
//!
//! [`Client`] talks to the public endpoints and opens a [`Session`] on
//! register/login. The session keeps the caller's role, conversations and
//! requests cached, and folds gateway events into that cache.

pub mod client;
pub mod error;
pub mod gateway;
pub mod session;

pub use client::Client;
pub use error::ClientError;
pub use gateway::Gateway;
pub use session::Session;
