//! Application use cases (business logic orchestration).

mod run_request;

pub use run_request::{RequestRun, RunRequest, RunRequestInput, join_url};
