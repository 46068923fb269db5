// jmwalletd integration module
// Provides the HTTP client and wire types

pub mod client;
pub mod types;

pub use client::{JmApiClient, AUTH_HEADER};
pub use types::*;
