//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the application core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod cancellation;
mod clock;
mod stream_source;

pub use cancellation::{CancellationReceiver, CancellationToken};
pub use clock::Clock;
pub use stream_source::{ChunkReader, StreamError, StreamFetcher, StreamRequest};
