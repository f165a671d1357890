//! The histogram entity
//!
//! A histogram owns a gate expression, one or more parameter expressions
//! bound to its manager's event record store, a bin configuration, and the
//! accumulated counts. The variant set is closed:
//!
//! - [`HistKind::Standard`] — 1 to 3 axes, one scalar result per axis per
//!   event.
//! - [`HistKind::Gamma`] — many parameters share one axis; every in-range
//!   value of every parameter increments.
//! - [`HistKind::Summary`] — one axis is "parameter index", the other is
//!   parameter value; each configured parameter occupies one index.
//! - [`HistKind::BitMask`] — one integer parameter decomposed into bits,
//!   one increment per set bit.
//!
//! All mutable state (compiled expressions, bins, lifecycle state) lives
//! behind one per-histogram [`Locked`] core, so a producer fill and a
//! foreground regate/clear/snapshot serialize against each other without
//! contending on any other histogram.

use crate::error::{Result, SortError};
use crate::hist::axis::Axis;
use crate::hist::manager::HistManager;
use crate::record::expr::{parse_param_list, ExprEngine};
use crate::record::{EventStore, Expr};
use crate::sync::Locked;
use rhai::Scope;
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// Summary histogram orientation
///
/// Vertical puts the parameter index on the x axis (parameter values extend
/// vertically); horizontal puts it on the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

/// The closed set of histogram variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistKind {
    Standard,
    Gamma,
    Summary { orientation: Orientation },
    BitMask { bits: u32 },
}

/// Lifecycle state of a histogram
///
/// Construction in progress is not observable: a histogram only becomes
/// reachable once fully bound and registered. There is no transition back
/// from `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistState {
    Active,
    Destroyed,
}

/// Creation arguments for a histogram
///
/// `params` is the parameter specification: a single expression for
/// standard 1d and bit-mask histograms, a semicolon-separated list for
/// multi-axis standard, gamma and summary histograms (with `name[a-b]`
/// range expansion). `axes` carries one entry per standard axis, exactly
/// one (the value axis) for gamma and summary, and none for bit-mask.
#[derive(Debug, Clone)]
pub struct HistSpec {
    pub name: String,
    pub title: String,
    pub params: String,
    pub gate: String,
    pub kind: HistKind,
    pub axes: Vec<Axis>,
    pub overwrite: bool,
}

impl HistSpec {
    /// Start a standard histogram spec
    pub fn new(name: impl Into<String>, title: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            params: params.into(),
            gate: String::new(),
            kind: HistKind::Standard,
            axes: Vec::new(),
            overwrite: false,
        }
    }

    /// Set the gate expression text
    pub fn with_gate(mut self, gate: impl Into<String>) -> Self {
        self.gate = gate.into();
        self
    }

    /// Append an axis
    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    /// Select the variant
    pub fn with_kind(mut self, kind: HistKind) -> Self {
        self.kind = kind;
        self
    }

    /// Allow replacing an existing histogram of the same name
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

struct HistCore {
    gate: Option<Expr>,
    gate_text: String,
    params: Vec<Expr>,
    bins: Vec<f64>,
    state: HistState,
    increments: u64,
    eval_errors: u64,
}

/// A live histogram
///
/// Created through [`HistManager::create`] (or a convenience wrapper),
/// never directly; owned by the registry. The weak back-reference to the
/// owning manager exists for regate/cleanup bookkeeping only.
pub struct Histogram {
    name: String,
    title: String,
    kind: HistKind,
    axes: Vec<Axis>,
    params_text: Vec<String>,
    core: Locked<HistCore>,
    manager: Weak<HistManager>,
}

impl Histogram {
    /// Validate a spec, compile its expressions, and build the entity
    ///
    /// Either everything binds and the histogram exists, or an error is
    /// returned and nothing was created.
    pub(crate) fn build(
        spec: &HistSpec,
        store: &EventStore,
        manager: Weak<HistManager>,
    ) -> Result<Self> {
        if spec.name.trim().is_empty() {
            return Err(SortError::Histogram("histogram name may not be empty".to_string()));
        }
        for axis in &spec.axes {
            Axis::new(axis.bins, axis.low, axis.high)?;
        }

        let params_text = match spec.kind {
            HistKind::Standard => {
                if spec.axes.is_empty() || spec.axes.len() > 3 {
                    return Err(SortError::Histogram(format!(
                        "standard histogram `{}` needs 1 to 3 axes, got {}",
                        spec.name,
                        spec.axes.len()
                    )));
                }
                let list = parse_param_list(&spec.params)?;
                if list.len() != spec.axes.len() {
                    return Err(SortError::Histogram(format!(
                        "histogram `{}` has {} axes but {} parameters",
                        spec.name,
                        spec.axes.len(),
                        list.len()
                    )));
                }
                list
            }
            HistKind::Gamma | HistKind::Summary { .. } => {
                if spec.axes.len() != 1 {
                    return Err(SortError::Histogram(format!(
                        "histogram `{}` needs exactly one value axis",
                        spec.name
                    )));
                }
                parse_param_list(&spec.params)?
            }
            HistKind::BitMask { bits } => {
                if !(1..=64).contains(&bits) {
                    return Err(SortError::Histogram(format!(
                        "bit-mask histogram `{}` needs 1 to 64 bits, got {}",
                        spec.name, bits
                    )));
                }
                if !spec.axes.is_empty() {
                    return Err(SortError::Histogram(format!(
                        "bit-mask histogram `{}` derives its axis from the bit count",
                        spec.name
                    )));
                }
                if spec.params.trim().is_empty() {
                    return Err(SortError::compile(&spec.params, "empty expression"));
                }
                vec![spec.params.trim().to_string()]
            }
        };

        let axes = match spec.kind {
            HistKind::Standard | HistKind::Gamma => spec.axes.clone(),
            HistKind::Summary { orientation } => {
                let param_axis = Axis::new(params_text.len() as u32, 0.0, params_text.len() as f64)?;
                match orientation {
                    Orientation::Vertical => vec![param_axis, spec.axes[0]],
                    Orientation::Horizontal => vec![spec.axes[0], param_axis],
                }
            }
            HistKind::BitMask { bits } => vec![Axis::new(bits, 0.0, bits as f64)?],
        };

        let gate = store.compile_gate(&spec.gate)?;
        let params = params_text
            .iter()
            .map(|text| store.compile(text))
            .collect::<Result<Vec<_>>>()?;

        let nbins: usize = axes.iter().map(|a| a.bins as usize).product();
        Ok(Self {
            name: spec.name.clone(),
            title: spec.title.clone(),
            kind: spec.kind,
            axes,
            params_text,
            core: Locked::new(HistCore {
                gate,
                gate_text: spec.gate.trim().to_string(),
                params,
                bins: vec![0.0; nbins],
                state: HistState::Active,
                increments: 0,
                eval_errors: 0,
            }),
            manager,
        })
    }

    /// Unique name within the registry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The variant of this histogram
    pub fn kind(&self) -> HistKind {
        self.kind
    }

    /// Bin layout axes (derived axes included for summary and bit-mask)
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Expanded parameter expression texts
    pub fn params(&self) -> &[String] {
        &self.params_text
    }

    /// Current gate expression text (empty = no gate)
    pub fn gate_text(&self) -> String {
        self.core.lock().gate_text.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> HistState {
        self.core.lock().state
    }

    /// Evaluate gate and parameters against an event scope and increment
    ///
    /// Returns the number of increments applied. Out-of-range parameter
    /// results are silently dropped; expression evaluation failures are
    /// counted and skip this event for this histogram only.
    pub(crate) fn fill_into(&self, engine: &ExprEngine, scope: &mut Scope) -> usize {
        let mut core = self.core.lock();
        let HistCore {
            gate,
            params,
            bins,
            state,
            increments,
            eval_errors,
            ..
        } = &mut *core;
        if *state != HistState::Active {
            return 0;
        }

        match gate {
            None => {}
            Some(expr) => match engine.eval_gate(expr, scope) {
                Ok(true) => {}
                Ok(false) => return 0,
                Err(e) => {
                    *eval_errors += 1;
                    tracing::trace!("Gate of `{}` failed: {}", self.name, e);
                    return 0;
                }
            },
        }

        let mut applied = 0usize;
        match self.kind {
            HistKind::Standard => {
                let mut coords = [0usize; 3];
                for (i, expr) in params.iter().enumerate() {
                    let values = match engine.eval_values(expr, scope) {
                        Ok(values) => values,
                        Err(e) => {
                            *eval_errors += 1;
                            tracing::trace!("Parameter of `{}` failed: {}", self.name, e);
                            return 0;
                        }
                    };
                    let Some(&value) = values.first() else {
                        *eval_errors += 1;
                        return 0;
                    };
                    match self.axes[i].index(value) {
                        Some(bin) => coords[i] = bin,
                        None => return 0,
                    }
                }
                bins[flat_index(&self.axes, &coords[..params.len()])] += 1.0;
                applied = 1;
            }
            HistKind::Gamma => {
                let axis = self.axes[0];
                for expr in params.iter() {
                    match engine.eval_values(expr, scope) {
                        Ok(values) => {
                            for value in values {
                                if let Some(bin) = axis.index(value) {
                                    bins[bin] += 1.0;
                                    applied += 1;
                                }
                            }
                        }
                        Err(e) => {
                            *eval_errors += 1;
                            tracing::trace!("Parameter of `{}` failed: {}", self.name, e);
                        }
                    }
                }
            }
            HistKind::Summary { orientation } => {
                let value_axis = match orientation {
                    Orientation::Vertical => self.axes[1],
                    Orientation::Horizontal => self.axes[0],
                };
                for (index, expr) in params.iter().enumerate() {
                    match engine.eval_values(expr, scope) {
                        Ok(values) => {
                            for value in values {
                                if let Some(bin) = value_axis.index(value) {
                                    let coords = match orientation {
                                        Orientation::Vertical => [index, bin],
                                        Orientation::Horizontal => [bin, index],
                                    };
                                    bins[flat_index(&self.axes, &coords)] += 1.0;
                                    applied += 1;
                                }
                            }
                        }
                        Err(e) => {
                            *eval_errors += 1;
                            tracing::trace!("Parameter of `{}` failed: {}", self.name, e);
                        }
                    }
                }
            }
            HistKind::BitMask { bits } => {
                let values = match engine.eval_values(&params[0], scope) {
                    Ok(values) => values,
                    Err(e) => {
                        *eval_errors += 1;
                        tracing::trace!("Parameter of `{}` failed: {}", self.name, e);
                        return 0;
                    }
                };
                let Some(&value) = values.first() else {
                    *eval_errors += 1;
                    return 0;
                };
                let word = value as i64;
                for bit in 0..bits as usize {
                    if (word >> bit) & 1 == 1 {
                        bins[bit] += 1.0;
                        applied += 1;
                    }
                }
            }
        }
        *increments += applied as u64;
        applied
    }

    /// Replace the gate expression
    ///
    /// On compile failure the existing gate is left untouched and the error
    /// is returned; the histogram is never left half-updated.
    pub fn regate(&self, gate: &str) -> Result<()> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| SortError::Histogram(format!("histogram `{}` has no manager", self.name)))?;
        let compiled = manager.store().compile_gate(gate)?;
        let mut core = self.core.lock();
        if core.state != HistState::Active {
            return Err(SortError::Histogram(format!(
                "histogram `{}` is destroyed",
                self.name
            )));
        }
        core.gate = compiled;
        core.gate_text = gate.trim().to_string();
        Ok(())
    }

    /// Zero all bins in place; bin configuration and expressions are kept
    pub fn clear(&self) {
        let mut core = self.core.lock();
        core.bins.iter_mut().for_each(|b| *b = 0.0);
        core.increments = 0;
    }

    /// Deep, point-in-time copy of bin contents and metadata
    pub fn snapshot(&self) -> Snapshot {
        let core = self.core.lock();
        Snapshot {
            name: self.name.clone(),
            title: self.title.clone(),
            kind: self.kind,
            axes: self.axes.clone(),
            params: self.params_text.clone(),
            gate: core.gate_text.clone(),
            bins: core.bins.clone(),
            increments: core.increments,
            eval_errors: core.eval_errors,
        }
    }

    /// Recompile gate and parameters against the store's current schema
    ///
    /// All expressions must bind for the call to succeed; on failure the
    /// histogram is unchanged and should be removed by the caller.
    pub(crate) fn rebind(&self, store: &EventStore) -> Result<()> {
        let gate_text = self.gate_text();
        let gate = store.compile_gate(&gate_text)?;
        let params = self
            .params_text
            .iter()
            .map(|text| store.compile(text))
            .collect::<Result<Vec<_>>>()?;
        let mut core = self.core.lock();
        core.gate = gate;
        core.params = params;
        Ok(())
    }

    pub(crate) fn destroy(&self) {
        self.core.lock().state = HistState::Destroyed;
    }

    pub(crate) fn manager_ref(&self) -> &Weak<HistManager> {
        &self.manager
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("axes", &self.axes)
            .finish()
    }
}

/// Independent point-in-time copy of a histogram's state
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub title: String,
    pub kind: HistKind,
    pub axes: Vec<Axis>,
    pub params: Vec<String>,
    pub gate: String,
    pub bins: Vec<f64>,
    pub increments: u64,
    pub eval_errors: u64,
}

impl Snapshot {
    /// Sum over all bins
    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Read one bin by per-axis coordinates
    pub fn bin(&self, coords: &[usize]) -> Option<f64> {
        if coords.len() != self.axes.len() {
            return None;
        }
        for (axis, &c) in self.axes.iter().zip(coords) {
            if c >= axis.bins as usize {
                return None;
            }
        }
        Some(self.bins[flat_index(&self.axes, coords)])
    }
}

/// Row-major flat index over the axis layout
fn flat_index(axes: &[Axis], coords: &[usize]) -> usize {
    let mut index = 0;
    for (axis, &c) in axes.iter().zip(coords) {
        index = index * axis.bins as usize + c;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_index_layout() {
        let axes = [Axis::new(4, 0.0, 4.0).unwrap(), Axis::new(3, 0.0, 3.0).unwrap()];
        assert_eq!(flat_index(&axes, &[0, 0]), 0);
        assert_eq!(flat_index(&axes, &[0, 2]), 2);
        assert_eq!(flat_index(&axes, &[1, 0]), 3);
        assert_eq!(flat_index(&axes, &[3, 2]), 11);
    }

    #[test]
    fn test_spec_builder() {
        let spec = HistSpec::new("h", "title", "e")
            .with_gate("1")
            .with_axis(Axis::new(10, 0.0, 10.0).unwrap())
            .overwrite();
        assert_eq!(spec.name, "h");
        assert_eq!(spec.gate, "1");
        assert_eq!(spec.axes.len(), 1);
        assert!(spec.overwrite);
        assert_eq!(spec.kind, HistKind::Standard);
    }
}
