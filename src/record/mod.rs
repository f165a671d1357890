//! Event record store
//!
//! One shared mutable row with a fixed schema, holding exactly the latest
//! unpacked event. The store is filled by the producer's unpack step and
//! read by every histogram expression bound to it.
//!
//! # Fill protocol
//!
//! [`EventStore::fill_with`] runs one critical section over the row:
//! the unpacker writes into a working copy, and only if it reports success
//! is the row committed, the expression scope built, and the histogram
//! evaluation pass run — all before the row lock is released. A failed
//! unpack leaves the previously committed row intact.
//!
//! # Locking
//!
//! Lock order throughout the crate is row → schema → manager list →
//! histogram. Consumers compiling expressions take only the schema read
//! lock; the producer holds the row lock for the duration of one event.

pub mod expr;
pub mod schema;

pub use expr::Expr;
pub use schema::{FieldId, Schema};

pub(crate) use expr::ExprEngine;

use crate::error::{Result, SortError};
use crate::sync::Locked;
use rhai::Scope;
use std::io::Write;
use std::sync::{RwLock, RwLockReadGuard};

/// The single mutable row of an event record store
#[derive(Debug)]
pub(crate) struct Row {
    committed: Vec<f64>,
    work: Vec<f64>,
    events: u64,
}

impl Row {
    fn new(slots: usize) -> Self {
        Self {
            committed: vec![0.0; slots],
            work: vec![0.0; slots],
            events: 0,
        }
    }

    fn begin(&mut self) {
        self.work.copy_from_slice(&self.committed);
    }

    fn commit(&mut self) {
        self.committed.copy_from_slice(&self.work);
        self.events += 1;
    }
}

/// Write handle passed to the unpack step
///
/// Writes land in the working copy of the row; nothing becomes visible to
/// expressions until the store commits the fill.
pub struct RowWriter<'a> {
    work: &'a mut [f64],
}

impl RowWriter<'_> {
    /// Set a scalar field (or element 0 of an array field)
    pub fn set(&mut self, field: FieldId, value: f64) -> Result<()> {
        self.set_index(field, 0, value)
    }

    /// Set one element of an array field
    pub fn set_index(&mut self, field: FieldId, index: usize, value: f64) -> Result<()> {
        if index >= field.len || field.slot + field.len > self.work.len() {
            return Err(SortError::Schema(format!(
                "field write out of range (slot {}, len {}, index {})",
                field.slot, field.len, index
            )));
        }
        self.work[field.slot + index] = value;
        Ok(())
    }
}

/// The pluggable unpack step
///
/// Given one raw event payload, writes into the registered fields of the
/// store and returns `Ok(())` to commit the event. Any error discards the
/// event: the row keeps its previous contents, no histogram evaluation
/// runs, and a bad-event notification is emitted instead.
pub trait Unpacker: Send {
    fn unpack(&mut self, payload: &[u8], row: &mut RowWriter<'_>) -> Result<()>;
}

impl<F> Unpacker for F
where
    F: FnMut(&[u8], &mut RowWriter<'_>) -> Result<()> + Send,
{
    fn unpack(&mut self, payload: &[u8], row: &mut RowWriter<'_>) -> Result<()> {
        self(payload, row)
    }
}

/// One shared event record store
pub struct EventStore {
    row: Locked<Row>,
    schema: RwLock<Schema>,
    engine: ExprEngine,
}

impl EventStore {
    pub(crate) fn new(schema: Schema) -> Self {
        let slots = schema.slots();
        Self {
            row: Locked::new(Row::new(slots)),
            schema: RwLock::new(schema),
            engine: ExprEngine::new(),
        }
    }

    /// Number of committed events since startup (or the last re-registration)
    pub fn events(&self) -> u64 {
        self.row.lock().events
    }

    /// Compile an expression against the store's schema
    pub fn compile(&self, text: &str) -> Result<Expr> {
        self.engine.compile(&self.schema_read(), text)
    }

    /// Compile a gate text; empty text means "no gate" (every event passes)
    pub fn compile_gate(&self, text: &str) -> Result<Option<Expr>> {
        if text.trim().is_empty() {
            Ok(None)
        } else {
            self.compile(text).map(Some)
        }
    }

    /// Run the fill critical section for one raw event
    ///
    /// Returns `Ok(true)` when the event was committed and the evaluation
    /// pass ran, `Ok(false)` when the unpacker rejected the event.
    pub(crate) fn fill_with(
        &self,
        unpacker: &mut dyn Unpacker,
        payload: &[u8],
        after_commit: impl FnOnce(&mut Scope),
    ) -> bool {
        let mut row = self.row.lock();
        row.begin();
        let mut writer = RowWriter {
            work: &mut row.work,
        };
        if let Err(e) = unpacker.unpack(payload, &mut writer) {
            tracing::trace!("Event rejected by unpacker: {}", e);
            return false;
        }
        row.commit();
        let mut scope = self.schema_read().build_scope(&row.committed);
        after_commit(&mut scope);
        true
    }

    /// Build an expression scope from the latest committed row
    pub(crate) fn current_scope(&self) -> Scope<'static> {
        let row = self.row.lock();
        self.schema_read().build_scope(&row.committed)
    }

    /// Replace the schema and reset the row
    ///
    /// Part of the explicit re-registration step; the owning manager must
    /// rebuild all dependent expressions afterwards.
    pub(crate) fn replace_schema(&self, schema: Schema) {
        let mut row = self.row.lock();
        let mut guard = match self.schema.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *row = Row::new(schema.slots());
        *guard = schema;
    }

    /// Serialize the latest committed row as one JSON object to a sink
    ///
    /// Archival hook for an external writer; the engine itself never
    /// persists rows.
    pub fn write_row(&self, sink: &mut dyn Write) -> Result<()> {
        let json = {
            let row = self.row.lock();
            self.schema_read().row_json(&row.committed)
        };
        serde_json::to_writer(&mut *sink, &json)
            .map_err(|e| SortError::Serialization(e.to_string()))?;
        sink.write_all(b"\n")?;
        Ok(())
    }

    /// Run a closure with read access to the schema
    pub fn with_schema<T>(&self, f: impl FnOnce(&Schema) -> T) -> T {
        f(&self.schema_read())
    }

    pub(crate) fn engine(&self) -> &ExprEngine {
        &self.engine
    }

    fn schema_read(&self) -> RwLockReadGuard<'_, Schema> {
        match self.schema.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldKind;

    fn store_with_e() -> (EventStore, FieldId) {
        let mut schema = Schema::new();
        let e = schema.register("e", FieldKind::F64).unwrap();
        (EventStore::new(schema), e)
    }

    #[test]
    fn test_fill_commits_on_success() {
        let (store, e) = store_with_e();
        let mut unpacker = move |payload: &[u8], row: &mut RowWriter<'_>| {
            row.set(e, payload[0] as f64)
        };

        let mut seen = Vec::new();
        let committed = store.fill_with(&mut unpacker, &[42], |scope| {
            let expr = rhai::Engine::new()
                .eval_expression_with_scope::<f64>(scope, "e")
                .unwrap();
            seen.push(expr);
        });
        assert!(committed);
        assert_eq!(seen, vec![42.0]);
        assert_eq!(store.events(), 1);
    }

    #[test]
    fn test_failed_unpack_keeps_previous_row() {
        let (store, e) = store_with_e();
        let mut good = move |payload: &[u8], row: &mut RowWriter<'_>| row.set(e, payload[0] as f64);
        assert!(store.fill_with(&mut good, &[7], |_| {}));

        // Rejecting unpacker writes before failing; the write must not stick.
        let mut bad = move |_: &[u8], row: &mut RowWriter<'_>| -> Result<()> {
            row.set(e, 99.0)?;
            Err(SortError::Read("truncated event".to_string()))
        };
        let mut evaluated = false;
        assert!(!store.fill_with(&mut bad, &[], |_| evaluated = true));
        assert!(!evaluated);
        assert_eq!(store.events(), 1);

        let mut sink = Vec::new();
        store.write_row(&mut sink).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&sink).unwrap();
        assert_eq!(json["e"], 7.0);
    }

    #[test]
    fn test_row_writer_bounds_checked() {
        let mut schema = Schema::new();
        let adc = schema.register_array("adc", FieldKind::F64, 2).unwrap();
        let store = EventStore::new(schema);
        let mut unpacker = move |_: &[u8], row: &mut RowWriter<'_>| row.set_index(adc, 5, 1.0);
        assert!(!store.fill_with(&mut unpacker, &[], |_| {}));
    }

    #[test]
    fn test_replace_schema_resets_row() {
        let (store, e) = store_with_e();
        let mut unpacker = move |_: &[u8], row: &mut RowWriter<'_>| row.set(e, 5.0);
        assert!(store.fill_with(&mut unpacker, &[], |_| {}));

        let mut schema = Schema::new();
        schema.register("other", FieldKind::F64).unwrap();
        store.replace_schema(schema);
        assert_eq!(store.events(), 0);
        assert!(store.compile("e").is_err());
        assert!(store.compile("other").is_ok());
    }

    #[test]
    fn test_compile_gate_empty_is_none() {
        let (store, _) = store_with_e();
        assert!(store.compile_gate("").unwrap().is_none());
        assert!(store.compile_gate("  ").unwrap().is_none());
        assert!(store.compile_gate("e > 1.0").unwrap().is_some());
    }
}
