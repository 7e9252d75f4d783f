//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters relevant to the link stage: per-link outcomes and
//!   per-step outcomes of the engine state machine.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the stage and the CLI.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    links_total: IntCounterVec,
    link_steps_total: IntCounterVec,
}

/// Snapshot of selected counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total links created successfully.
    pub links_created: u64,
    /// Total link attempts that reached a terminal failure.
    pub links_failed: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let links_total = IntCounterVec::new(
            Opts::new("links_total", "Link attempts by terminal status"),
            &["status"],
        )?;
        let link_steps_total = IntCounterVec::new(
            Opts::new(
                "link_steps_total",
                "Link engine state machine steps executed by status",
            ),
            &["step", "status"],
        )?;

        registry.register(Box::new(links_total.clone()))?;
        registry.register(Box::new(link_steps_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                links_total,
                link_steps_total,
            }),
        })
    }

    /// Record a terminal link outcome (`created` or `failed`).
    pub fn inc_link(&self, status: &str) {
        self.inner.links_total.with_label_values(&[status]).inc();
    }

    /// Record one engine step outcome.
    pub fn inc_link_step(&self, step: &str, status: &str) {
        self.inner
            .link_steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Snapshot the per-link counters for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            links_created: self
                .inner
                .links_total
                .with_label_values(&["created"])
                .get(),
            links_failed: self.inner.links_total.with_label_values(&["failed"]).get(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding the metric families fails.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics buffer was not valid UTF-8")
    }
}
