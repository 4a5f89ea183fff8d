//! Reference HTTP server implementing the durable streams protocol.

pub mod config;
pub mod cursor;
pub mod error;
pub mod handlers;
pub mod log;
pub mod producer_table;
pub mod registry;
pub mod server;

pub use config::ServerOptions;
pub use server::{create_router, start_server, AppState};
