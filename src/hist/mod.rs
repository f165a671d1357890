//! Histogram entities, registry and per-event-type managers
//!
//! # Components
//!
//! - [`Histogram`] — the polymorphic histogram entity (standard, gamma,
//!   summary and bit-mask variants behind one closed [`HistKind`])
//! - [`HistRegistry`] — process-wide name → histogram mapping
//! - [`HistManager`] — the per-event-record-store owner that evaluates its
//!   histograms after every committed event
//!
//! # Locking
//!
//! Lock granularity is per histogram: a producer fill and a foreground
//! `regate`/`clear`/`snapshot` on the same histogram serialize, while
//! operations on different histograms do not contend. The registry map
//! lock is held only for insert/remove/lookup.

pub mod axis;
pub mod histogram;
pub mod manager;
pub mod registry;

pub use axis::Axis;
pub use histogram::{HistKind, HistSpec, HistState, Histogram, Orientation, Snapshot};
pub use manager::HistManager;
pub use registry::HistRegistry;
