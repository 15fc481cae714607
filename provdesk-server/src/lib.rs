//! Provdesk Server
//!
//! Backend for the internal IT-provisioning workflow: managers submit
//! access requests through dynamic forms, admins triage and fulfill them,
//! and every connected admin dashboard receives live request events over
//! a WebSocket feed.

pub mod config;
pub mod error;
pub mod identity;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::ApiError;
pub use registry::{ConnectionId, EventHub};
pub use state::AppState;
pub use store::{DirectoryStore, InMemoryStore, SqliteStore, WorkflowStore};
