//! # livesort-rs: Online DAQ Histogramming Engine
//!
//! A data-acquisition histogramming engine for physics experiments: a
//! producer thread continuously ingests binary event buffers (from a live
//! source or a file), unpacks them into a typed event record, and evaluates
//! gated histogram expressions against each committed event — while the
//! foreground concurrently reads snapshots, changes gates, and creates or
//! deletes histograms.
//!
//! ## Architecture
//!
//! - **Source**: pluggable [`source::DataSource`] implementations staged by
//!   an attach state machine running on a dedicated producer thread
//! - **Record**: one shared mutable row per event type with a fixed,
//!   pre-registered schema ([`record::EventStore`])
//! - **Expressions**: Rhai-compiled gate and parameter formulas, resolved
//!   against the schema once at creation and evaluated per committed event
//! - **Histograms**: standard, gamma, summary and bit-mask variants behind
//!   a process-wide registry with per-histogram locking
//! - **Communication**: a bounded crossbeam channel carries producer
//!   notifications (bad events, completions, read errors) to the foreground
//!   without ever blocking the producer
//!
//! ## Concurrency model
//!
//! Exactly two roles run concurrently: one producer loop (read → unpack →
//! fill → evaluate, all under the row lock so no consumer ever observes a
//! torn event) and any number of foreground calls. Per-histogram locks keep
//! foreground snapshot/regate/clear atomic with respect to the evaluation
//! pass without global contention; the registry lock covers only
//! insert/remove/lookup. [`pipeline::Pipeline::unattach`] joins the
//! producer thread, guaranteeing no unpack call is in flight on return.

pub mod config;
pub mod error;
pub mod event;
pub mod hist;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{Result, SortError};
pub use event::{Event, EventSet};
pub use hist::{Axis, HistKind, HistManager, HistRegistry, HistSpec, HistState, Histogram, Orientation, Snapshot};
pub use pipeline::{Monitor, Pipeline, SourceEvent};
pub use record::{EventStore, Expr, FieldId, RowWriter, Schema, Unpacker};
pub use source::{DataSource, FileSource, OnlineConnector, SimConnector, SimSource};
pub use sync::Locked;
pub use types::{FieldKind, RawBuffer, SourceKind};
