//! Event types and buffer dispatch
//!
//! An [`Event`] bundles one event record store, its histogram manager and
//! the experiment-specific unpacker for one event type. The [`EventSet`]
//! maps frame tags to events and is what the producer loop hands each raw
//! buffer to. Deployments with a single event type register exactly one
//! event; multi-event-type deployments get one independent store and
//! manager per tag.

use crate::error::{Result, SortError};
use crate::hist::{HistManager, HistRegistry};
use crate::pipeline::{MonitorHandle, SourceEvent};
use crate::record::{EventStore, Schema, Unpacker};
use crate::sync::Locked;
use crate::types::RawBuffer;
use std::collections::HashMap;
use std::sync::Arc;

/// One registered event type
pub struct Event {
    tag: u16,
    name: String,
    store: Arc<EventStore>,
    manager: Arc<HistManager>,
    unpacker: Locked<Box<dyn Unpacker>>,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Event {
    fn new(
        tag: u16,
        name: String,
        schema: Schema,
        unpacker: Box<dyn Unpacker>,
        registry: Arc<HistRegistry>,
    ) -> Arc<Self> {
        let store = Arc::new(EventStore::new(schema));
        let manager = HistManager::new(store.clone(), registry);
        Arc::new(Self {
            tag,
            name,
            store,
            manager,
            unpacker: Locked::new(unpacker),
        })
    }

    /// Frame tag this event type answers to
    pub fn tag(&self) -> u16 {
        self.tag
    }

    /// Human-readable event type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event record store
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// The histogram manager owning this event type's histograms
    pub fn manager(&self) -> &Arc<HistManager> {
        &self.manager
    }

    /// Unpack one payload and, on success, run the evaluation pass
    ///
    /// Returns true when the event was committed. Normally driven by the
    /// attach loop; public for embedders that feed buffers from their own
    /// acquisition driver.
    pub fn process(&self, payload: &[u8]) -> bool {
        let mut unpacker = self.unpacker.lock();
        self.store
            .fill_with(unpacker.as_mut(), payload, |scope| {
                self.manager.fill_all(scope);
            })
    }

    /// Replace the schema and rebuild all dependent expressions
    ///
    /// The explicit re-registration step: the row is reset, and histograms
    /// whose expressions no longer compile are deleted with a warning.
    /// Intended to be called while no source is attached.
    pub fn reregister(&self, schema: Schema) {
        tracing::info!("Re-registering schema for event `{}`", self.name);
        self.store.replace_schema(schema);
        self.manager.rebind_all();
    }
}

/// The set of registered event types, keyed by frame tag
pub struct EventSet {
    events: HashMap<u16, Arc<Event>>,
    registry: Arc<HistRegistry>,
}

impl EventSet {
    /// Create an empty set with a fresh histogram registry
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
            registry: HistRegistry::new(),
        }
    }

    /// Register an event type; fails if the tag is taken
    pub fn register_event(
        &mut self,
        tag: u16,
        name: impl Into<String>,
        schema: Schema,
        unpacker: Box<dyn Unpacker>,
    ) -> Result<Arc<Event>> {
        use std::collections::hash_map::Entry;
        match self.events.entry(tag) {
            Entry::Occupied(existing) => Err(SortError::Schema(format!(
                "event tag {} is already registered as `{}`",
                tag,
                existing.get().name()
            ))),
            Entry::Vacant(slot) => {
                let event = Event::new(tag, name.into(), schema, unpacker, self.registry.clone());
                slot.insert(event.clone());
                Ok(event)
            }
        }
    }

    /// The histogram registry shared by all event types
    pub fn registry(&self) -> &Arc<HistRegistry> {
        &self.registry
    }

    /// Look up an event type by tag
    pub fn get(&self, tag: u16) -> Option<&Arc<Event>> {
        self.events.get(&tag)
    }

    /// Registered tags
    pub fn tags(&self) -> Vec<u16> {
        self.events.keys().copied().collect()
    }

    /// Route one raw buffer to its event type
    ///
    /// Unknown tags and rejected events are reported through the monitor
    /// and skipped; neither stops the producer.
    pub(crate) fn dispatch(&self, buffer: &RawBuffer, monitor: &MonitorHandle) {
        match self.events.get(&buffer.tag) {
            Some(event) => {
                if !event.process(&buffer.payload) {
                    monitor.emit(SourceEvent::BadEvent { tag: buffer.tag });
                }
            }
            None => monitor.emit(SourceEvent::UnknownTag { tag: buffer.tag }),
        }
    }
}

impl Default for EventSet {
    fn default() -> Self {
        Self::new()
    }
}
