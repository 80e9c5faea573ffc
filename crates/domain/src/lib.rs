//! Apixt Domain - Core types of the API extender
//!
//! This crate defines the two pieces every host UI builds on:
//! - [`entity`]: observable, positional entity collections and their upsert
//!   algebra, with the settings kinds in [`entities`];
//! - [`tree`]: the response stream command protocol and the incremental
//!   tree builder.
//!
//! All types here are pure Rust with no I/O dependencies.

pub mod entities;
pub mod entity;
pub mod error;
pub mod id;
pub mod settings;
pub mod tree;

pub use entities::{
    ApiEnvIndex, AssignmentAction, AssignmentIndex, AssignmentListing, AssignmentTarget,
    AssignmentType, ConstantIndex, ContentTypeChoice, EnvOverrideIndex, ExtractSource,
    KeyBindingIndex, PluginIndex, PluginInfo, PluginRegistry, RequestAssignments, RequestIndex,
    Route, RouteIndex, SavedRequest,
};
pub use entity::{
    ArrayIndex, EntityError, EntityIndex, EntityObject, EntityResult, MappingIndex, Model,
    RecordIndex, SimpleMappingIndex, Update, UpdateKind, View, ViewOptions,
};
pub use error::{DomainError, DomainResult};
pub use id::generate_id;
pub use settings::{Settings, StreamSettings, ThemeMode};
pub use tree::{Cmd, Command, LineFramer, Node, ProtocolError, TreeBuilder, TreeState};
