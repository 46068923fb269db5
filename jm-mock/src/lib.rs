/// JoinMarket Daemon Mock Library
///
/// This crate provides both a standalone binary and library components
/// for mocking the jmwalletd REST API, its `/jmws` websocket and the Jam
/// features endpoint. Tests drive the mock through `MockState`.

pub mod handlers;
pub mod server;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use server::{create_router, run_server, spawn_local};
pub use state::MockState;
pub use types::*;
