//! Service Status Channel
//!
//! Keeps an always-current [`ServiceStatusSnapshot`] of the JoinMarket
//! daemon: websocket push when the backend offers it, REST polling when it
//! does not, with staleness and reachability tracked in the snapshot.

mod channel;
mod core;
mod snapshot;
mod transport;

pub use channel::ServiceStatusChannel;
pub use core::{ChannelEvent, ChannelState, TransportMode};
pub use snapshot::{Availability, Capability, ServiceStatusSnapshot};
pub use transport::{
    FetchOutcome, PushConnector, PushRejection, PushStream, StatusSource, WebsocketConnector,
};
