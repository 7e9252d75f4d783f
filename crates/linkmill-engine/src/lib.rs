#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Symlink materialization engine for the Linkmill pipeline.
//!
//! The engine consumes source records one at a time, resolves a concrete
//! destination from a caller-supplied specification, prepares the destination
//! directory, and creates a symbolic link whose target text is either
//! relative to the link's directory or absolute. Every record is forwarded
//! downstream regardless of outcome; failures travel over the event bus.

pub mod engine;
pub mod error;
pub mod model;
pub mod resolve;
pub mod stage;
pub mod target;

pub use engine::LinkEngine;
pub use error::{LinkError, LinkResult};
pub use model::{
    DestinationOutput, DestinationRecord, DestinationSpec, LinkMode, LinkOptions, LinkRequest,
    RecordKind, SourceRecord,
};
pub use resolve::DestinationResolver;
pub use stage::LinkStage;
