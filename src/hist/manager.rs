//! Per-event-type histogram manager
//!
//! Each event record store has exactly one manager owning the subset of the
//! global registry bound to that store. After every committed event the
//! store drives [`HistManager::fill_all`] over the owned set; a single slow
//! or failing histogram evaluation never prevents the others from being
//! attempted.

use crate::error::Result;
use crate::hist::axis::Axis;
use crate::hist::histogram::{HistKind, HistSpec, Histogram, Orientation, Snapshot};
use crate::hist::registry::HistRegistry;
use crate::record::EventStore;
use crate::sync::Locked;
use rhai::Scope;
use std::io::Write;
use std::sync::Arc;

/// Owns the histograms bound to one event record store
pub struct HistManager {
    store: Arc<EventStore>,
    registry: Arc<HistRegistry>,
    hists: Locked<Vec<Arc<Histogram>>>,
}

impl HistManager {
    pub(crate) fn new(store: Arc<EventStore>, registry: Arc<HistRegistry>) -> Arc<Self> {
        let manager = Arc::new(Self {
            store,
            registry,
            hists: Locked::new(Vec::new()),
        });
        manager.registry.register_manager(&manager);
        manager
    }

    /// The event record store this manager's histograms evaluate against
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Create a histogram from a full spec and register it
    ///
    /// Fails on a name collision (unless `spec.overwrite`), on any
    /// expression that does not compile, or on inconsistent bin arguments;
    /// in every failure case nothing is created.
    pub fn create(self: &Arc<Self>, spec: HistSpec) -> Result<Arc<Histogram>> {
        let overwrite = spec.overwrite;
        let hist = Arc::new(Histogram::build(&spec, &self.store, Arc::downgrade(self))?);
        self.registry.insert(hist.clone(), overwrite)?;
        self.hists.lock().push(hist.clone());
        tracing::info!("Created histogram `{}` ({:?})", hist.name(), hist.kind());
        Ok(hist)
    }

    /// One-dimensional standard histogram
    pub fn create_1d(
        self: &Arc<Self>,
        name: &str,
        title: &str,
        param: &str,
        gate: &str,
        axis: Axis,
    ) -> Result<Arc<Histogram>> {
        self.create(HistSpec::new(name, title, param).with_gate(gate).with_axis(axis))
    }

    /// Two-dimensional standard histogram (`params` = `"x;y"`)
    pub fn create_2d(
        self: &Arc<Self>,
        name: &str,
        title: &str,
        params: &str,
        gate: &str,
        x: Axis,
        y: Axis,
    ) -> Result<Arc<Histogram>> {
        self.create(
            HistSpec::new(name, title, params)
                .with_gate(gate)
                .with_axis(x)
                .with_axis(y),
        )
    }

    /// Three-dimensional standard histogram (`params` = `"x;y;z"`)
    pub fn create_3d(
        self: &Arc<Self>,
        name: &str,
        title: &str,
        params: &str,
        gate: &str,
        x: Axis,
        y: Axis,
        z: Axis,
    ) -> Result<Arc<Histogram>> {
        self.create(
            HistSpec::new(name, title, params)
                .with_gate(gate)
                .with_axis(x)
                .with_axis(y)
                .with_axis(z),
        )
    }

    /// Gamma histogram: every parameter shares the one axis
    pub fn create_gamma(
        self: &Arc<Self>,
        name: &str,
        title: &str,
        params: &str,
        gate: &str,
        axis: Axis,
    ) -> Result<Arc<Histogram>> {
        self.create(
            HistSpec::new(name, title, params)
                .with_gate(gate)
                .with_kind(HistKind::Gamma)
                .with_axis(axis),
        )
    }

    /// Summary histogram over a semicolon-separated parameter list
    pub fn create_summary(
        self: &Arc<Self>,
        name: &str,
        title: &str,
        params: &str,
        gate: &str,
        value_axis: Axis,
        orientation: Orientation,
    ) -> Result<Arc<Histogram>> {
        self.create(
            HistSpec::new(name, title, params)
                .with_gate(gate)
                .with_kind(HistKind::Summary { orientation })
                .with_axis(value_axis),
        )
    }

    /// Bit-mask histogram over an integer parameter
    pub fn create_bit(
        self: &Arc<Self>,
        name: &str,
        title: &str,
        bits: u32,
        param: &str,
        gate: &str,
    ) -> Result<Arc<Histogram>> {
        self.create(
            HistSpec::new(name, title, param)
                .with_gate(gate)
                .with_kind(HistKind::BitMask { bits }),
        )
    }

    /// Evaluate every owned histogram against an event scope
    ///
    /// Returns the total number of increments applied across histograms.
    pub(crate) fn fill_all(&self, scope: &mut Scope) -> usize {
        let hists: Vec<Arc<Histogram>> = self.hists.lock().clone();
        let engine = self.store.engine();
        hists
            .iter()
            .map(|hist| hist.fill_into(engine, scope))
            .sum()
    }

    /// Evaluate every owned histogram against the latest committed row
    pub fn fill_current(&self) -> usize {
        let mut scope = self.store.current_scope();
        self.fill_all(&mut scope)
    }

    /// Recompile every owned histogram against the store's current schema
    ///
    /// Histograms whose expressions no longer bind are deleted from the
    /// registry with a warning; keeping them half-bound is not an option.
    pub fn rebind_all(&self) {
        let hists: Vec<Arc<Histogram>> = self.hists.lock().clone();
        for hist in hists {
            if let Err(e) = hist.rebind(&self.store) {
                tracing::warn!(
                    "Histogram `{}` no longer binds after re-registration, deleting: {}",
                    hist.name(),
                    e
                );
                let _ = self.registry.delete(hist.name());
            }
        }
    }

    /// Number of owned histograms
    pub fn len(&self) -> usize {
        self.hists.lock().len()
    }

    /// Returns true if this manager owns no histograms
    pub fn is_empty(&self) -> bool {
        self.hists.lock().is_empty()
    }

    /// Enumerable access to the owned set
    pub fn histograms(&self) -> Vec<Arc<Histogram>> {
        self.hists.lock().clone()
    }

    /// Snapshot every owned histogram
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.histograms().iter().map(|h| h.snapshot()).collect()
    }

    /// Serialize all owned histograms as JSON lines to a sink
    pub fn write_all(&self, sink: &mut dyn Write) -> Result<usize> {
        let mut written = 0;
        for snapshot in self.snapshots() {
            serde_json::to_writer(&mut *sink, &snapshot)
                .map_err(|e| crate::error::SortError::Serialization(e.to_string()))?;
            sink.write_all(b"\n")?;
            written += 1;
        }
        Ok(written)
    }

    pub(crate) fn remove(&self, hist: &Arc<Histogram>) {
        self.hists.lock().retain(|h| !Arc::ptr_eq(h, hist));
    }
}
