// clustersync-api: Async transport for the cluster aggregator and live alert channel

pub mod aggregator;
pub mod error;
pub mod transport;
pub mod websocket;

pub use aggregator::{AggregatorClient, AggregatorResponse, SnapshotRequest};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
