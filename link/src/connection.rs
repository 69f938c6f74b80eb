//! Process-wide realtime connection health.
//!
//! [`ConnectionStatusAggregator`] folds the socket lifecycle signals of
//! the realtime client into a single [`ConnectionStatus`](crate::ConnectionStatus),
//! drives bounded automatic reconnects and fans changes out to listeners.

mod status;

pub use status::ConnectionStatusAggregator;
