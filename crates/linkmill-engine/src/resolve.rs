//! Destination resolution.
//!
//! Turns the caller's destination specification into one concrete
//! [`DestinationRecord`] per incoming source record. The ordered-list form is
//! consumed by a monotonically advancing index that is never reused, so the
//! Nth record always pairs with the Nth destination. Resolution is pure:
//! a missing destination is observable before any filesystem mutation.

use std::path::{Path, PathBuf};

use crate::error::{LinkError, LinkResult};
use crate::model::{DestinationOutput, DestinationRecord, DestinationSpec, SourceRecord};

/// Resolves one destination per source record from a [`DestinationSpec`].
#[derive(Debug)]
pub struct DestinationResolver {
    spec: DestinationSpec,
    consumed: usize,
}

impl DestinationResolver {
    /// Wrap a specification for the lifetime of one pipeline run.
    #[must_use]
    pub const fn new(spec: DestinationSpec) -> Self {
        Self { spec, consumed: 0 }
    }

    /// Number of ordered-list entries consumed so far.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Produce the destination for `record`, advancing the list index when
    /// the specification is an ordered list.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::MissingDestination`] when an ordered list has
    /// been exhausted.
    pub fn resolve(&mut self, record: &SourceRecord) -> LinkResult<DestinationRecord> {
        let output = match &self.spec {
            DestinationSpec::Literal(path) => DestinationOutput::Path(path.clone()),
            DestinationSpec::Transform(transform) => transform(record),
            DestinationSpec::OrderedList(paths) => {
                let index = self.consumed;
                self.consumed += 1;
                match paths.get(index) {
                    Some(path) => DestinationOutput::Path(path.clone()),
                    None => {
                        return Err(LinkError::MissingDestination {
                            source_path: record.path.clone(),
                            consumed: index,
                        });
                    }
                }
            }
        };

        match output {
            DestinationOutput::Path(path) => Ok(infer_destination(&path, record)),
            // A full record carries its own authoritative link path.
            DestinationOutput::Record(destination) => Ok(destination),
        }
    }
}

/// Apply the directory-vs-file ambiguity rule: a path without an extension is
/// a directory and receives the source's file name; a path with an extension
/// is the final link path.
fn infer_destination(path: &Path, record: &SourceRecord) -> DestinationRecord {
    let link_path: PathBuf = if path.extension().is_none() {
        match record.file_name() {
            Some(name) => path.join(name),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    };
    DestinationRecord::new(link_path)
}
