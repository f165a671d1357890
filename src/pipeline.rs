//! Pipeline facade
//!
//! [`Pipeline`] wires the registered event types, the histogram registry
//! and the attach state machine together, and owns the monitor channel the
//! producer uses to report to the foreground.
//!
//! # Execution contexts
//!
//! Exactly one producer thread runs at a time, created fresh per attach;
//! any number of foreground calls (snapshot, regate, create/delete,
//! attach/unattach) may run concurrently against it. Starting a new attach
//! implicitly detaches the previous producer first, and
//! [`Pipeline::unattach`] only returns after the producer thread has fully
//! exited.
//!
//! # Example
//!
//! ```ignore
//! use livesort_rs::{Axis, EngineConfig, EventSet, FieldKind, Pipeline, Schema};
//!
//! let mut schema = Schema::new();
//! let e = schema.register("e", FieldKind::F64)?;
//!
//! let mut events = EventSet::new();
//! let physics = events.register_event(1, "physics", schema, Box::new(
//!     move |payload: &[u8], row: &mut livesort_rs::RowWriter<'_>| {
//!         row.set(e, f64::from(payload[0]))
//!     },
//! ))?;
//! physics.manager().create_1d("h_e", "Energy", "e", "", Axis::new(100, 0.0, 100.0)?)?;
//!
//! let (pipeline, monitor) = Pipeline::new(EngineConfig::default(), events);
//! pipeline.attach_file("run_0001.dat", true)?;
//! // ... foreground reads snapshots while the producer fills ...
//! let snapshot = pipeline.registry().find("h_e").unwrap().snapshot();
//! pipeline.unattach();
//! ```

use crate::config::EngineConfig;
use crate::error::{Result, SortError};
use crate::event::{Event, EventSet};
use crate::hist::HistRegistry;
use crate::source::attach::{LoopCtx, Producer};
use crate::source::{FileSource, OnlineConnector};
use crate::sync::Locked;
use crate::types::SourceKind;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Notification sent from the producer to the foreground
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A producer loop started
    Attached { kind: SourceKind },
    /// A file was read to its end under `stop_at_end`
    Completed { path: PathBuf },
    /// The producer was stopped by an explicit unattach
    Detached,
    /// An unpacker rejected one event
    BadEvent { tag: u16 },
    /// A buffer carried a tag with no registered event type
    UnknownTag { tag: u16 },
    /// A read failed (transient for files, fatal for online sources)
    ReadError { detail: String },
    /// A list manifest entry could not be opened
    SkippedFile { path: PathBuf },
}

/// Foreground receiver for producer notifications
pub struct Monitor {
    receiver: Receiver<SourceEvent>,
    dropped: Arc<AtomicU64>,
}

impl Monitor {
    /// Receive one pending notification without blocking
    pub fn try_recv(&self) -> Option<SourceEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending notifications
    pub fn drain(&self) -> Vec<SourceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Number of notifications dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer-side sender; never blocks, drops and counts when full
#[derive(Clone)]
pub(crate) struct MonitorHandle {
    sender: Sender<SourceEvent>,
    dropped: Arc<AtomicU64>,
}

impl MonitorHandle {
    pub(crate) fn emit(&self, event: SourceEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The online histogramming pipeline
pub struct Pipeline {
    config: EngineConfig,
    events: Arc<EventSet>,
    producer: Locked<Option<Producer>>,
    connector: Option<Arc<dyn OnlineConnector>>,
    monitor: MonitorHandle,
}

impl Pipeline {
    /// Build a pipeline over a set of registered event types
    pub fn new(config: EngineConfig, events: EventSet) -> (Self, Monitor) {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, rx) = bounded(config.monitor_capacity.max(1));
        let pipeline = Self {
            config,
            events: Arc::new(events),
            producer: Locked::new(None),
            connector: None,
            monitor: MonitorHandle {
                sender: tx,
                dropped: dropped.clone(),
            },
        };
        let monitor = Monitor {
            receiver: rx,
            dropped,
        };
        (pipeline, monitor)
    }

    /// Install the connector used by [`Pipeline::attach_online`]
    pub fn with_connector(mut self, connector: Arc<dyn OnlineConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// The histogram registry shared by all event types
    pub fn registry(&self) -> &Arc<HistRegistry> {
        self.events.registry()
    }

    /// Look up a registered event type by tag
    pub fn event(&self, tag: u16) -> Option<&Arc<Event>> {
        self.events.get(tag)
    }

    /// Attach to a frame file and start the producer loop
    ///
    /// With `stop_at_end` the run completes when the file is exhausted;
    /// without it the producer keeps polling for appended data until
    /// detached. Fails with [`SortError::Open`] before any producer context
    /// is started.
    pub fn attach_file(&self, path: impl AsRef<Path>, stop_at_end: bool) -> Result<()> {
        let mut slot = self.producer.lock();
        Self::detach_slot(&mut slot, &self.monitor);
        let source = FileSource::open(path)?;
        *slot = Some(Producer::spawn_file(source, stop_at_end, self.loop_ctx()));
        Ok(())
    }

    /// Negotiate a connection to a live source and start the producer loop
    ///
    /// Fails with [`SortError::Connect`] (leaving the pipeline idle) if no
    /// connector is installed or negotiation fails.
    pub fn attach_online(&self, source_id: &str) -> Result<()> {
        let mut slot = self.producer.lock();
        Self::detach_slot(&mut slot, &self.monitor);
        let connector = self.connector.as_ref().ok_or_else(|| SortError::Connect {
            source_id: source_id.to_string(),
            message: "no online connector installed".to_string(),
        })?;
        let source = connector.connect(source_id)?;
        *slot = Some(Producer::spawn_online(source, self.loop_ctx()));
        Ok(())
    }

    /// Attach to a manifest of frame files, reading each in turn
    ///
    /// Blank lines and `#` comments are ignored; entries that cannot be
    /// opened are skipped with a warning, not fatal. Fails with
    /// [`SortError::Open`] if the manifest itself is unreadable.
    pub fn attach_list(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut slot = self.producer.lock();
        Self::detach_slot(&mut slot, &self.monitor);
        let paths = read_manifest(path.as_ref())?;
        *slot = Some(Producer::spawn_list(paths, self.loop_ctx()));
        Ok(())
    }

    /// Detach the current producer, if any
    ///
    /// Idempotent. Blocks until the producer thread has fully exited:
    /// after this returns, no unpack or fill activity is in flight.
    pub fn unattach(&self) {
        let mut slot = self.producer.lock();
        Self::detach_slot(&mut slot, &self.monitor);
    }

    /// Returns true while a producer loop is running
    pub fn is_attached(&self) -> bool {
        self.producer
            .lock()
            .as_ref()
            .map(|p| !p.is_finished())
            .unwrap_or(false)
    }

    /// The kind of the running producer, if any
    pub fn source_kind(&self) -> Option<SourceKind> {
        self.producer
            .lock()
            .as_ref()
            .filter(|p| !p.is_finished())
            .map(|p| p.kind())
    }

    /// Detach and tear down all histograms
    pub fn shutdown(&self) {
        self.unattach();
        self.registry().delete_all();
    }

    fn loop_ctx(&self) -> LoopCtx {
        LoopCtx {
            events: self.events.clone(),
            monitor: self.monitor.clone(),
            config: self.config.clone(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn detach_slot(slot: &mut Option<Producer>, monitor: &MonitorHandle) {
        if let Some(producer) = slot.take() {
            let was_running = !producer.is_finished();
            producer.stop_and_join();
            if was_running {
                monitor.emit(SourceEvent::Detached);
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // The producer thread must not outlive the pipeline.
        self.unattach();
    }
}

fn read_manifest(path: &Path) -> Result<Vec<PathBuf>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| SortError::open(path.display(), e))?;
    Ok(content
        .lines()
        .filter_map(|line| {
            let entry = line.split('#').next().unwrap_or_default().trim();
            if entry.is_empty() {
                None
            } else {
                Some(PathBuf::from(entry))
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_read_manifest_filters_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header comment").unwrap();
        writeln!(file, "run_0001.dat").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  run_0002.dat  # trailing note").unwrap();
        file.flush().unwrap();

        let paths = read_manifest(file.path()).unwrap();
        assert_eq!(
            paths,
            vec![PathBuf::from("run_0001.dat"), PathBuf::from("run_0002.dat")]
        );
    }

    #[test]
    fn test_missing_manifest_is_open_error() {
        let err = read_manifest(Path::new("/no/such/list.txt")).unwrap_err();
        assert!(matches!(err, SortError::Open { .. }));
    }
}
