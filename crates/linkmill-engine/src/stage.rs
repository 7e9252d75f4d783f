//! Pipeline-facing adapter around the link engine.
//!
//! The stage accepts source records one at a time, in arrival order, and
//! drives one full engine run to completion before accepting the next (no
//! overlap, no internal parallelism). Every record is forwarded downstream
//! whether or not its link succeeded, so one bad entry never stalls the
//! stream; failures are reported on the event bus.

use std::path::PathBuf;

use linkmill_events::{Event, EventBus};
use linkmill_telemetry::Metrics;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::engine::LinkEngine;
use crate::error::LinkResult;
use crate::model::{DestinationSpec, LinkMode, LinkOptions, SourceRecord};

/// Push-style link stage: one engine run per pushed record.
pub struct LinkStage {
    engine: LinkEngine,
    events: EventBus,
    downstream: UnboundedSender<SourceRecord>,
    linked: u64,
    failed: u64,
}

impl LinkStage {
    /// Build a stage with the caller's options, returning the downstream
    /// receiver the forwarded records arrive on.
    #[must_use]
    pub fn new(
        spec: DestinationSpec,
        options: LinkOptions,
        events: EventBus,
        metrics: Metrics,
    ) -> (Self, UnboundedReceiver<SourceRecord>) {
        let (downstream, records) = unbounded_channel();
        let stage = Self {
            engine: LinkEngine::new(spec, options, events.clone(), metrics),
            events,
            downstream,
            linked: 0,
            failed: 0,
        };
        (stage, records)
    }

    /// Stage writing relative link targets; the default entry point.
    #[must_use]
    pub fn relative(
        spec: DestinationSpec,
        options: LinkOptions,
        events: EventBus,
        metrics: Metrics,
    ) -> (Self, UnboundedReceiver<SourceRecord>) {
        let options = LinkOptions {
            mode: LinkMode::Relative,
            ..options
        };
        Self::new(spec, options, events, metrics)
    }

    /// Stage writing absolute link targets.
    #[must_use]
    pub fn absolute(
        spec: DestinationSpec,
        options: LinkOptions,
        events: EventBus,
        metrics: Metrics,
    ) -> (Self, UnboundedReceiver<SourceRecord>) {
        let options = LinkOptions {
            mode: LinkMode::Absolute,
            ..options
        };
        Self::new(spec, options, events, metrics)
    }

    /// Process one record to a terminal state and forward it downstream.
    ///
    /// The record is forwarded on failure too; the returned result mirrors
    /// what the event channel reported for callers that drive the stage
    /// directly.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`crate::error::LinkError`] for this record.
    pub fn push(&mut self, record: SourceRecord) -> LinkResult<PathBuf> {
        let mut record = record;
        let outcome = self.engine.link(&mut record);
        match &outcome {
            Ok(_) => self.linked += 1,
            Err(_) => self.failed += 1,
        }
        // A dropped receiver means nobody is consuming the pass-through
        // stream; the side effects above already happened.
        let _ = self.downstream.send(record);
        outcome
    }

    /// Number of links created so far.
    #[must_use]
    pub const fn linked(&self) -> u64 {
        self.linked
    }

    /// Number of records that reached a terminal failure so far.
    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.failed
    }

    /// Close the stage, emitting the drained event and dropping the
    /// downstream sender so the receiver observes the end of the stream.
    pub fn finish(self) {
        let _ = self.events.publish(Event::StageDrained {
            linked: self.linked,
            failed: self.failed,
        });
    }
}
