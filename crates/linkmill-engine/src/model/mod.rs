//! Domain models for symlink materialization.
//!
//! # Design
//! - Keep record and request types lightweight; callers supply references
//!   where the engine only inspects.
//! - The destination specification is an explicit tagged union, discriminated
//!   at resolution time rather than by inspecting the caller's value.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content-type hint attached to a source record by the upstream pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// The source is a regular file.
    File,
    /// The source is a directory.
    Directory,
}

/// One file record flowing through the pipeline.
///
/// The record is immutable from the engine's point of view except for
/// [`SourceRecord::link_target`], which the engine fills in with the resolved
/// link text before forwarding the record downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Identifier assigned when the record entered the pipeline.
    pub id: Uuid,
    /// Source path, absolute or relative to the working directory.
    pub path: PathBuf,
    /// Base directory the record was discovered under.
    pub base: PathBuf,
    /// Optional content-type hint from the upstream producer.
    pub kind: Option<RecordKind>,
    /// Opaque payload owned by the pipeline; never inspected or mutated.
    pub payload: serde_json::Value,
    /// Link text written for this record, attached by the engine on success.
    pub link_target: Option<String>,
}

impl SourceRecord {
    /// Build a record for `path` with the base derived from its parent.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let base = parent_or_cur(&path);
        Self {
            id: Uuid::new_v4(),
            path,
            base,
            kind: None,
            payload: serde_json::Value::Null,
            link_target: None,
        }
    }

    /// Override the base directory.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    /// Attach a content-type hint.
    #[must_use]
    pub const fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Attach an opaque payload forwarded untouched.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Final path component of the source, when one exists.
    #[must_use]
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

/// Result of a destination transform: either a bare path, which still goes
/// through directory-vs-file inference, or a full record that carries its own
/// authoritative link path.
pub enum DestinationOutput {
    /// A path string; inference appends the source file name when the path
    /// has no extension.
    Path(PathBuf),
    /// A complete destination record used exactly as returned.
    Record(DestinationRecord),
}

impl From<PathBuf> for DestinationOutput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for DestinationOutput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<DestinationRecord> for DestinationOutput {
    fn from(record: DestinationRecord) -> Self {
        Self::Record(record)
    }
}

/// Caller-supplied transform from a source record to its destination.
pub type DestinationTransform = Box<dyn Fn(&SourceRecord) -> DestinationOutput + Send + Sync>;

/// Caller-supplied description of where each source should be linked.
///
/// List entries are consumed one per incoming record in order; the index
/// advances monotonically and entries are never reused. Exhausting the list
/// early fails the remaining records with a missing-destination error.
pub enum DestinationSpec {
    /// One literal path applied to every record.
    Literal(PathBuf),
    /// A function of the source record.
    Transform(DestinationTransform),
    /// An ordered list paired with records by arrival order.
    OrderedList(Vec<PathBuf>),
}

impl DestinationSpec {
    /// Literal destination path.
    #[must_use]
    pub fn literal(path: impl Into<PathBuf>) -> Self {
        Self::Literal(path.into())
    }

    /// Destination computed per record.
    #[must_use]
    pub fn transform<F>(transform: F) -> Self
    where
        F: Fn(&SourceRecord) -> DestinationOutput + Send + Sync + 'static,
    {
        Self::Transform(Box::new(transform))
    }

    /// Ordered destinations consumed one per record.
    #[must_use]
    pub fn list(paths: Vec<PathBuf>) -> Self {
        Self::OrderedList(paths)
    }
}

impl fmt::Debug for DestinationSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(path) => formatter.debug_tuple("Literal").field(path).finish(),
            Self::Transform(_) => formatter.write_str("Transform(..)"),
            Self::OrderedList(paths) => {
                formatter.debug_tuple("OrderedList").field(paths).finish()
            }
        }
    }
}

/// A concrete destination derived for one source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRecord {
    /// Final path of the link to create.
    pub path: PathBuf,
    /// Parent directory of the link path.
    pub directory: PathBuf,
}

impl DestinationRecord {
    /// Build a record for `path`, deriving the directory from its parent.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let directory = parent_or_cur(&path);
        Self { path, directory }
    }
}

/// How the link target text is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Target text is the relative path from the link's directory to the
    /// source.
    #[default]
    Relative,
    /// Target text is the absolute path of the source, re-anchored through
    /// the working directory when the source was given relative.
    Absolute,
}

/// Engine configuration recognised by the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Resolution mode for the link target text.
    pub mode: LinkMode,
    /// Replace an existing destination entry instead of failing.
    pub overwrite: bool,
    /// Emit one log line per successful link.
    pub log: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            mode: LinkMode::Relative,
            overwrite: false,
            log: true,
        }
    }
}

/// Inputs for one link creation, built fresh per record and never persisted.
#[derive(Debug, Clone, Copy)]
pub struct LinkRequest<'a> {
    /// Path of the source the link will point at.
    pub source_path: &'a Path,
    /// Path of the link to create.
    pub link_path: &'a Path,
    /// Resolution mode for the target text.
    pub mode: LinkMode,
    /// Whether an existing destination was allowed to be replaced.
    pub overwrite: bool,
    /// Whether the success line is logged.
    pub log: bool,
}

fn parent_or_cur(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_record_derives_base_from_parent() {
        let record = SourceRecord::new("fixtures/input/a.txt");
        assert_eq!(record.base, PathBuf::from("fixtures/input"));
        assert_eq!(record.file_name().unwrap(), "a.txt");
        assert!(record.link_target.is_none());
    }

    #[test]
    fn source_record_without_parent_uses_cur_dir() {
        let record = SourceRecord::new("a.txt");
        assert_eq!(record.base, PathBuf::from("."));
    }

    #[test]
    fn destination_record_tracks_parent_directory() {
        let record = DestinationRecord::new("out/links/a.txt");
        assert_eq!(record.directory, PathBuf::from("out/links"));

        let bare = DestinationRecord::new("a.txt");
        assert_eq!(bare.directory, PathBuf::from("."));
    }

    #[test]
    fn options_default_to_relative_without_overwrite() {
        let options = LinkOptions::default();
        assert_eq!(options.mode, LinkMode::Relative);
        assert!(!options.overwrite);
        assert!(options.log);
    }

    #[test]
    fn spec_debug_elides_the_transform() {
        let spec = DestinationSpec::transform(|record| {
            DestinationOutput::Path(record.path.clone())
        });
        assert_eq!(format!("{spec:?}"), "Transform(..)");
    }
}
