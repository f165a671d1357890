//! Process-wide histogram registry
//!
//! The registry owns the name → histogram mapping for every live histogram
//! across all managers. Its lock is held only for insert, remove and lookup
//! — never across a fill evaluation — so foreground lookups do not contend
//! with the producer. Lifecycle is explicit: created with the event set at
//! startup, torn down by [`HistRegistry::delete_all`] (or
//! [`crate::pipeline::Pipeline::shutdown`]).

use crate::error::{Result, SortError};
use crate::hist::histogram::{Histogram, Snapshot};
use crate::hist::manager::HistManager;
use crate::sync::Locked;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Weak};

/// Registry of all live histograms
pub struct HistRegistry {
    by_name: Locked<HashMap<String, Arc<Histogram>>>,
    managers: Locked<Vec<Weak<HistManager>>>,
}

impl HistRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            by_name: Locked::new(HashMap::new()),
            managers: Locked::new(Vec::new()),
        })
    }

    pub(crate) fn register_manager(&self, manager: &Arc<HistManager>) {
        self.managers.lock().push(Arc::downgrade(manager));
    }

    /// Insert a fully built histogram under its name
    ///
    /// Without `overwrite`, a name collision fails with
    /// [`SortError::DuplicateName`] and the existing histogram is untouched.
    pub(crate) fn insert(&self, hist: Arc<Histogram>, overwrite: bool) -> Result<()> {
        let displaced = {
            let mut map = self.by_name.lock();
            if map.contains_key(hist.name()) && !overwrite {
                return Err(SortError::DuplicateName(hist.name().to_string()));
            }
            map.insert(hist.name().to_string(), hist)
        };
        // Tear the old histogram down outside the map lock.
        if let Some(old) = displaced {
            tracing::info!("Overwriting histogram `{}`", old.name());
            old.destroy();
            if let Some(manager) = old.manager_ref().upgrade() {
                manager.remove(&old);
            }
        }
        Ok(())
    }

    /// Look up a histogram by name
    pub fn find(&self, name: &str) -> Option<Arc<Histogram>> {
        self.by_name.lock().get(name).cloned()
    }

    /// Delete one histogram by name
    pub fn delete(&self, name: &str) -> Result<()> {
        let hist = self
            .by_name
            .lock()
            .remove(name)
            .ok_or_else(|| SortError::Histogram(format!("histogram `{}` not found", name)))?;
        hist.destroy();
        if let Some(manager) = hist.manager_ref().upgrade() {
            manager.remove(&hist);
        }
        tracing::info!("Deleted histogram `{}`", name);
        Ok(())
    }

    /// Delete every histogram in the registry
    pub fn delete_all(&self) {
        let drained: Vec<Arc<Histogram>> = {
            let mut map = self.by_name.lock();
            map.drain().map(|(_, hist)| hist).collect()
        };
        for hist in drained {
            hist.destroy();
            if let Some(manager) = hist.manager_ref().upgrade() {
                manager.remove(&hist);
            }
        }
    }

    /// Number of live histograms
    pub fn len(&self) -> usize {
        self.by_name.lock().len()
    }

    /// Returns true if no histograms exist
    pub fn is_empty(&self) -> bool {
        self.by_name.lock().is_empty()
    }

    /// Names of all live histograms
    pub fn names(&self) -> Vec<String> {
        self.by_name.lock().keys().cloned().collect()
    }

    /// Evaluate every histogram known to every manager against its store's
    /// latest committed row
    ///
    /// The per-event hot path is the owning manager's own fill pass; this
    /// registry-wide variant serves foreground-driven re-evaluation.
    pub fn fill_all(&self) -> usize {
        self.live_managers()
            .iter()
            .map(|manager| manager.fill_current())
            .sum()
    }

    /// Snapshot every live histogram
    pub fn snapshots(&self) -> Vec<Snapshot> {
        let hists: Vec<Arc<Histogram>> = self.by_name.lock().values().cloned().collect();
        hists.iter().map(|h| h.snapshot()).collect()
    }

    /// Serialize every live histogram as JSON lines to a sink
    pub fn write_all(&self, sink: &mut dyn Write) -> Result<usize> {
        let mut written = 0;
        for snapshot in self.snapshots() {
            serde_json::to_writer(&mut *sink, &snapshot)
                .map_err(|e| SortError::Serialization(e.to_string()))?;
            sink.write_all(b"\n")?;
            written += 1;
        }
        Ok(written)
    }

    fn live_managers(&self) -> Vec<Arc<HistManager>> {
        self.managers.lock().iter().filter_map(Weak::upgrade).collect()
    }
}
