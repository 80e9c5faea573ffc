//! Apixt Application - Use cases and ports
//!
//! This crate defines the application layer with:
//! - Port traits (stream fetching, clock, cancellation)
//! - Assignment resolution for saved requests
//! - Stream consumption into a [`apixt_domain::TreeBuilder`]
//! - The stage processor and the use cases built on it
//! - Application-level error handling

pub mod assignment_resolver;
pub mod error;
pub mod ports;
pub mod processor;
pub mod stream;
pub mod use_cases;
pub mod variable_resolver;

pub use assignment_resolver::{AssignmentResolver, ResolvedAssignments, merge_body};
pub use error::{ApplicationError, ApplicationResult};
pub use ports::{
    CancellationReceiver, CancellationToken, ChunkReader, Clock, StreamError, StreamFetcher,
    StreamRequest,
};
pub use processor::{
    AbortHandle, Processed, Stage, StageContext, StageEvent, StageOperation, StagePhase,
    StageProcessor, StatusCallback,
};
pub use stream::{StreamSummary, process_stream};
pub use use_cases::{RequestRun, RunRequest, RunRequestInput, join_url};
pub use variable_resolver::{ResolutionResult, VariableResolver};
