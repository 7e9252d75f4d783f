//! The link engine state machine.
//!
//! One record runs through resolve → conflict check → directory preparation →
//! source classification → link creation, with exactly one retry for a
//! parent-directory race and exactly one platform fallback attempt for the
//! Windows privilege failure mode. Terminal outcomes are published on the
//! event bus and counted in the metrics registry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use linkmill_events::{Event, EventBus};
use linkmill_telemetry::Metrics;
use tracing::{info, warn};

use crate::error::{LinkError, LinkResult};
use crate::model::{DestinationSpec, LinkOptions, LinkRequest, RecordKind, SourceRecord};
use crate::resolve::DestinationResolver;
use crate::target::{ensure_dir, link_target};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    ResolveDestination,
    CheckConflict,
    PrepareDirectory,
    StatSource,
    CreateLink,
    PlatformFallback,
}

impl Step {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ResolveDestination => "resolve_destination",
            Self::CheckConflict => "check_conflict",
            Self::PrepareDirectory => "prepare_directory",
            Self::StatSource => "stat_source",
            Self::CreateLink => "create_link",
            Self::PlatformFallback => "platform_fallback",
        }
    }
}

/// Engine that materializes one symbolic link per source record.
pub struct LinkEngine {
    options: LinkOptions,
    resolver: DestinationResolver,
    events: EventBus,
    metrics: Metrics,
}

impl LinkEngine {
    /// Construct an engine for one pipeline run.
    ///
    /// The log toggle lives on [`LinkOptions`], set here at construction;
    /// there is no process-global debug state.
    #[must_use]
    pub const fn new(
        spec: DestinationSpec,
        options: LinkOptions,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            options,
            resolver: DestinationResolver::new(spec),
            events,
            metrics,
        }
    }

    /// Options the engine was constructed with.
    #[must_use]
    pub const fn options(&self) -> LinkOptions {
        self.options
    }

    /// Drive one record through the state machine to a terminal state.
    ///
    /// On success the resolved link text is attached to the record and the
    /// link path is returned. On failure the error is also published as a
    /// [`Event::LinkFailed`]; the caller decides whether to keep forwarding.
    ///
    /// The conflict probe and the link creation are a non-atomic
    /// check-then-act pair; processing is sequential per stage instance, and
    /// an already-exists race during creation is treated as success.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`LinkError`] for this record.
    pub fn link(&mut self, record: &mut SourceRecord) -> LinkResult<PathBuf> {
        let _ = self.events.publish(Event::LinkStarted {
            record_id: record.id,
            source_path: record.path.display().to_string(),
        });

        match self.run(record) {
            Ok(destination) => {
                self.metrics.inc_link("created");
                let _ = self.events.publish(Event::LinkCreated {
                    record_id: record.id,
                    source_path: record.path.display().to_string(),
                    destination_path: destination.display().to_string(),
                    link_target: record.link_target.clone().unwrap_or_default(),
                });
                Ok(destination)
            }
            Err(error) => {
                self.metrics.inc_link("failed");
                warn!(
                    source = %record.path.display(),
                    kind = error.kind(),
                    "link failed: {}",
                    error.detail()
                );
                let _ = self.events.publish(Event::LinkFailed {
                    record_id: record.id,
                    kind: error.kind().to_string(),
                    message: error.detail(),
                    source_path: record.path.display().to_string(),
                    destination_path: error
                        .destination_path()
                        .map(|path| path.display().to_string()),
                });
                Err(error)
            }
        }
    }

    fn run(&mut self, record: &mut SourceRecord) -> LinkResult<PathBuf> {
        let resolved = self.resolver.resolve(record);
        let destination = self.observe(Step::ResolveDestination, resolved)?;

        let conflict = check_conflict(&destination.path, self.options.overwrite);
        self.observe(Step::CheckConflict, conflict)?;

        self.observe(Step::PrepareDirectory, ensure_dir(&destination.directory))?;

        let classified = classify_source(record);
        let kind = self.observe(Step::StatSource, classified)?;

        let target = link_target(&record.path, &destination.directory, self.options.mode)?;
        let request = LinkRequest {
            source_path: &record.path,
            link_path: &destination.path,
            mode: self.options.mode,
            overwrite: self.options.overwrite,
            log: self.options.log,
        };
        let created = self.create_link(&request, &target, kind, &destination.directory);
        self.observe(Step::CreateLink, created)?;

        record.link_target = Some(target.to_string_lossy().into_owned());
        if self.options.log {
            info!(
                "{} symlinked to {}",
                record.path.display(),
                destination.path.display()
            );
        }
        Ok(destination.path)
    }

    fn create_link(
        &self,
        request: &LinkRequest<'_>,
        target: &Path,
        kind: RecordKind,
        directory: &Path,
    ) -> LinkResult<()> {
        match platform::symlink(target, request.link_path, kind) {
            Ok(()) => Ok(()),
            // A concurrent creator beat us to the path; idempotent outcome.
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // Parent vanished between preparation and creation; rebuild
                // the directory and retry exactly once.
                ensure_dir(directory)?;
                match platform::symlink(target, request.link_path, kind) {
                    Ok(()) => Ok(()),
                    Err(retry) if retry.kind() == io::ErrorKind::AlreadyExists => Ok(()),
                    Err(retry) => Err(LinkError::io("create_link.retry", request.link_path, retry)),
                }
            }
            Err(err) if platform::wants_junction_fallback(&err, kind) => {
                self.platform_fallback(request)
            }
            Err(err) => Err(LinkError::io("create_link", request.link_path, err)),
        }
    }

    /// Retry link creation through an NTFS junction pointing at the absolute
    /// source path; junctions do not require elevated privileges.
    #[cfg(windows)]
    fn platform_fallback(&self, request: &LinkRequest<'_>) -> LinkResult<()> {
        let anchored = std::env::current_dir()
            .map_err(|err| LinkError::io("platform_fallback.current_dir", request.source_path, err))
            .map(|cwd| crate::target::absolutize(request.source_path, &cwd));
        let result = anchored.and_then(|source_abs| {
            junction::create(&source_abs, request.link_path).map_err(|err| {
                LinkError::PlatformFallbackFailed {
                    path: request.link_path.to_path_buf(),
                    source: err,
                }
            })
        });
        self.observe(Step::PlatformFallback, result)
    }

    #[cfg(not(windows))]
    fn platform_fallback(&self, request: &LinkRequest<'_>) -> LinkResult<()> {
        let result = Err(LinkError::PlatformFallbackFailed {
            path: request.link_path.to_path_buf(),
            source: io::Error::other("junction fallback is only available on Windows"),
        });
        self.observe(Step::PlatformFallback, result)
    }

    fn observe<T>(&self, step: Step, result: LinkResult<T>) -> LinkResult<T> {
        let status = if result.is_ok() { "completed" } else { "failed" };
        self.metrics.inc_link_step(step.as_str(), status);
        result
    }
}

fn check_conflict(link_path: &Path, overwrite: bool) -> LinkResult<()> {
    match fs::symlink_metadata(link_path) {
        Ok(_) if !overwrite => Err(LinkError::DestinationExists {
            path: link_path.to_path_buf(),
        }),
        // Plain unlink; replacing a directory is out of scope and surfaces
        // through the IO error.
        Ok(_) => fs::remove_file(link_path)
            .map_err(|err| LinkError::io("check_conflict.remove_existing", link_path, err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(LinkError::io("check_conflict.stat", link_path, err)),
    }
}

/// Classify the source as file or directory. The caller's hint wins for the
/// link type, but the source must stat successfully either way so a missing
/// source stays observable.
fn classify_source(record: &SourceRecord) -> LinkResult<RecordKind> {
    let metadata = fs::metadata(&record.path).map_err(|err| LinkError::SourceNotFound {
        path: record.path.clone(),
        source: err,
    })?;
    Ok(match record.kind {
        Some(kind) => kind,
        None if metadata.is_dir() => RecordKind::Directory,
        None => RecordKind::File,
    })
}

mod platform {
    use std::io;
    use std::path::Path;

    use crate::model::RecordKind;

    #[cfg(unix)]
    pub(super) fn symlink(target: &Path, link: &Path, _kind: RecordKind) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    pub(super) fn symlink(target: &Path, link: &Path, kind: RecordKind) -> io::Result<()> {
        match kind {
            RecordKind::Directory => std::os::windows::fs::symlink_dir(target, link),
            RecordKind::File => std::os::windows::fs::symlink_file(target, link),
        }
    }

    #[cfg(unix)]
    pub(super) fn wants_junction_fallback(_err: &io::Error, _kind: RecordKind) -> bool {
        false
    }

    /// True symlinks need `SeCreateSymbolicLinkPrivilege`; junctions are the
    /// unprivileged alternative for directory links.
    #[cfg(windows)]
    pub(super) fn wants_junction_fallback(err: &io::Error, kind: RecordKind) -> bool {
        kind == RecordKind::Directory && err.kind() == io::ErrorKind::PermissionDenied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use linkmill_events::EventStream;
    use std::path::PathBuf;
    use tempfile::TempDir;

    use crate::model::{DestinationOutput, LinkMode};

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        source: PathBuf,
    }

    fn fixture() -> Result<Fixture> {
        let temp = TempDir::new()?;
        let root = temp.path().to_path_buf();
        let source_dir = root.join("src");
        fs::create_dir_all(&source_dir)?;
        let source = source_dir.join("a.txt");
        fs::write(&source, b"payload")?;
        Ok(Fixture {
            _temp: temp,
            root,
            source,
        })
    }

    fn engine(spec: DestinationSpec, options: LinkOptions) -> Result<LinkEngine> {
        Ok(LinkEngine::new(
            spec,
            options,
            EventBus::with_capacity(32),
            Metrics::new()?,
        ))
    }

    async fn next_events(stream: &mut EventStream, count: usize) -> Vec<Event> {
        let mut events = Vec::new();
        for _ in 0..count {
            match stream.next().await {
                Some(envelope) => events.push(envelope.event),
                None => break,
            }
        }
        events
    }

    #[test]
    fn relative_link_round_trips_through_readlink() -> Result<()> {
        let fx = fixture()?;
        let out = fx.root.join("out");
        let mut engine = engine(DestinationSpec::literal(&out), LinkOptions::default())?;

        let mut record = SourceRecord::new(&fx.source);
        let link = engine.link(&mut record)?;
        assert_eq!(link, out.join("a.txt"));

        let text = fs::read_link(&link)?;
        assert_eq!(text, PathBuf::from("../src/a.txt"));
        assert_eq!(record.link_target.as_deref(), Some("../src/a.txt"));
        assert_eq!(
            fs::canonicalize(out.join(&text))?,
            fs::canonicalize(&fx.source)?
        );
        assert_eq!(fs::read(&link)?, b"payload");
        Ok(())
    }

    #[test]
    fn absolute_link_stores_the_source_path_exactly() -> Result<()> {
        let fx = fixture()?;
        let out = fx.root.join("out");
        let options = LinkOptions {
            mode: LinkMode::Absolute,
            ..LinkOptions::default()
        };
        let mut engine = engine(DestinationSpec::literal(&out), options)?;

        let mut record = SourceRecord::new(&fx.source);
        let link = engine.link(&mut record)?;
        assert_eq!(fs::read_link(&link)?, fx.source);
        Ok(())
    }

    #[test]
    fn overwrite_is_idempotent() -> Result<()> {
        let fx = fixture()?;
        let out = fx.root.join("out");
        let options = LinkOptions {
            overwrite: true,
            ..LinkOptions::default()
        };
        let mut engine = engine(DestinationSpec::literal(&out), options)?;

        let first = engine.link(&mut SourceRecord::new(&fx.source))?;
        let second = engine.link(&mut SourceRecord::new(&fx.source))?;
        assert_eq!(first, second);
        assert!(fs::symlink_metadata(&first)?.file_type().is_symlink());
        assert_eq!(
            fs::canonicalize(&first)?,
            fs::canonicalize(&fx.source)?
        );
        Ok(())
    }

    #[test]
    fn conflict_without_overwrite_preserves_the_existing_entry() -> Result<()> {
        let fx = fixture()?;
        let out = fx.root.join("out");
        fs::create_dir_all(&out)?;
        let occupied = out.join("a.txt");
        fs::write(&occupied, b"keep me")?;

        let mut engine = engine(DestinationSpec::literal(&out), LinkOptions::default())?;
        let err = engine
            .link(&mut SourceRecord::new(&fx.source))
            .unwrap_err();
        assert_eq!(err.kind(), "destination_exists");
        assert_eq!(fs::read(&occupied)?, b"keep me");
        Ok(())
    }

    #[test]
    fn missing_ancestors_are_created() -> Result<()> {
        let fx = fixture()?;
        let nested = fx.root.join("deep/a/b");
        let mut engine = engine(DestinationSpec::literal(&nested), LinkOptions::default())?;

        let link = engine.link(&mut SourceRecord::new(&fx.source))?;
        assert_eq!(link, nested.join("a.txt"));
        assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
        Ok(())
    }

    #[test]
    fn create_link_recovers_when_the_parent_vanishes_late() -> Result<()> {
        let fx = fixture()?;
        let engine = engine(
            DestinationSpec::literal(fx.root.join("out")),
            LinkOptions::default(),
        )?;

        // Simulate the parent disappearing between preparation and creation:
        // the first symlink attempt sees NotFound and the single retry
        // rebuilds the directory.
        let directory = fx.root.join("late");
        let link_path = directory.join("a.txt");
        let request = LinkRequest {
            source_path: &fx.source,
            link_path: &link_path,
            mode: LinkMode::Relative,
            overwrite: false,
            log: true,
        };
        engine.create_link(&request, Path::new("../src/a.txt"), RecordKind::File, &directory)?;
        assert!(fs::symlink_metadata(&link_path)?.file_type().is_symlink());
        assert_eq!(fs::read_link(&link_path)?, PathBuf::from("../src/a.txt"));
        Ok(())
    }

    #[test]
    fn directory_sources_link_as_directories() -> Result<()> {
        let fx = fixture()?;
        let source_dir = fx.root.join("tree");
        fs::create_dir_all(source_dir.join("inner"))?;
        let out = fx.root.join("out");

        let mut engine = engine(DestinationSpec::literal(&out), LinkOptions::default())?;
        let link = engine.link(&mut SourceRecord::new(&source_dir))?;
        assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
        assert!(fs::metadata(&link)?.is_dir());
        assert!(link.join("inner").is_dir());
        Ok(())
    }

    #[test]
    fn missing_source_reports_source_not_found() -> Result<()> {
        let fx = fixture()?;
        let out = fx.root.join("out");
        let mut engine = engine(DestinationSpec::literal(&out), LinkOptions::default())?;

        let mut record = SourceRecord::new(fx.root.join("src/absent.txt"));
        let err = engine.link(&mut record).unwrap_err();
        assert_eq!(err.kind(), "source_not_found");
        assert!(!out.join("absent.txt").exists());
        Ok(())
    }

    #[test]
    fn ordered_destinations_pair_by_arrival_and_then_run_dry() -> Result<()> {
        let fx = fixture()?;
        let other = fx.root.join("src/b.txt");
        fs::write(&other, b"second")?;
        let dest_a = fx.root.join("out/first.link");
        let dest_b = fx.root.join("out/second.link");

        let mut engine = engine(
            DestinationSpec::list(vec![dest_a.clone(), dest_b.clone()]),
            LinkOptions::default(),
        )?;

        engine.link(&mut SourceRecord::new(&fx.source))?;
        engine.link(&mut SourceRecord::new(&other))?;
        assert_eq!(
            fs::canonicalize(&dest_a)?,
            fs::canonicalize(&fx.source)?
        );
        assert_eq!(fs::canonicalize(&dest_b)?, fs::canonicalize(&other)?);

        let err = engine
            .link(&mut SourceRecord::new(&fx.source))
            .unwrap_err();
        assert_eq!(err.kind(), "missing_destination");
        // Earlier links stay untouched.
        assert!(fs::symlink_metadata(&dest_a)?.file_type().is_symlink());
        assert!(fs::symlink_metadata(&dest_b)?.file_type().is_symlink());
        Ok(())
    }

    #[test]
    fn transform_destinations_rename_links() -> Result<()> {
        let fx = fixture()?;
        let renamed = fx.root.join("out/renamed-link.txt");
        let target = renamed.clone();
        let mut engine = engine(
            DestinationSpec::transform(move |_record| DestinationOutput::Path(target.clone())),
            LinkOptions::default(),
        )?;

        let link = engine.link(&mut SourceRecord::new(&fx.source))?;
        assert_eq!(link, renamed);
        assert!(fs::symlink_metadata(&renamed)?.file_type().is_symlink());
        Ok(())
    }

    #[tokio::test]
    async fn outcomes_are_published_on_the_bus() -> Result<()> {
        let fx = fixture()?;
        let out = fx.root.join("out");
        let bus = EventBus::with_capacity(32);
        let metrics = Metrics::new()?;
        let mut stream = bus.subscribe(None);
        let mut engine = LinkEngine::new(
            DestinationSpec::list(vec![out.join("a.link")]),
            LinkOptions::default(),
            bus.clone(),
            metrics.clone(),
        );

        let mut record = SourceRecord::new(&fx.source);
        engine.link(&mut record)?;
        let mut failed = SourceRecord::new(&fx.source);
        let _ = engine.link(&mut failed).unwrap_err();

        let events = next_events(&mut stream, 4).await;
        assert!(matches!(
            &events[0],
            Event::LinkStarted { record_id, .. } if *record_id == record.id
        ));
        match &events[1] {
            Event::LinkCreated {
                destination_path,
                link_target,
                ..
            } => {
                assert_eq!(destination_path, &out.join("a.link").display().to_string());
                assert_eq!(link_target, record.link_target.as_deref().unwrap());
            }
            other => panic!("expected LinkCreated, got {other:?}"),
        }
        match &events[3] {
            Event::LinkFailed {
                kind,
                destination_path,
                ..
            } => {
                assert_eq!(kind, "missing_destination");
                assert!(destination_path.is_none());
            }
            other => panic!("expected LinkFailed, got {other:?}"),
        }

        let rendered = metrics.render()?;
        assert!(rendered.contains(r#"links_total{status="created"} 1"#));
        assert!(rendered.contains(r#"links_total{status="failed"} 1"#));
        Ok(())
    }
}
