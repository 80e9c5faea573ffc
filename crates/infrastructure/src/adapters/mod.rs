//! Adapters implementing the application ports.

mod replay_reader;
mod reqwest_client;
mod system_clock;

pub use replay_reader::{ReplayFetcher, ReplayReader};
pub use reqwest_client::{ReqwestChunkReader, ReqwestStreamFetcher};
pub use system_clock::SystemClock;
