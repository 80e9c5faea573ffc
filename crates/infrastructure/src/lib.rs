//! Apixt Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, and settings persistence.

pub mod adapters;
pub mod persistence;

pub use adapters::{ReplayFetcher, ReplayReader, ReqwestChunkReader, ReqwestStreamFetcher, SystemClock};
pub use persistence::{SettingsError, SettingsRepository};
