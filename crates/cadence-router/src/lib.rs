//! Cadence Router
//!
//! The hub behind cadence's now-playing sync:
//! - Dispatches events to handlers by the shape of their payload
//! - Keeps one active connection per logged-in user, handing off between tabs
//! - Caches each session's playlist and mirrors it to a profile store
//!
//! # Example
//!
//! ```no_run
//! use cadence_router::{Hub, HubConfig, MemoryProfileStore, StaticTokens};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens: StaticTokens = [("secret", "alice")].into_iter().collect();
//!     let hub = Hub::new(HubConfig::default(), Arc::new(MemoryProfileStore::new()))?
//!         .with_authenticator(Arc::new(tokens));
//!
//!     hub.serve_websocket("0.0.0.0:7440").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod identity;
pub mod join;
pub mod profile;
pub mod session;
pub mod signature;
pub mod state;
pub mod writer;

pub use config::HubConfig;
pub use connection::Connection;
pub use directory::{Binding, ConnectOutcome, ConnectionDirectory};
pub use dispatch::{Args, EventRouter, EventTable, Fallback, Handler, Route};
pub use error::{Result, RouterError};
pub use hub::Hub;
pub use identity::{Authenticator, GuestOnly, Identity, StaticTokens};
pub use join::{join_all_with_deadline, JoinError};
pub use profile::{JsonFileProfileStore, MemoryProfileStore, ProfileRecord, ProfileStore};
pub use session::{Session, SessionStore};
pub use signature::{dispatch_key, Param, Signature};
pub use state::{ConnectionSlot, HubContext, HubState};
pub use writer::{PlaylistWriter, RetryPolicy};
