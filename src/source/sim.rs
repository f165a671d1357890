//! Simulated in-memory data source
//!
//! `SimSource` plays back a scripted sequence of buffers, no-data gaps and
//! injected read errors, and can then repeat a cycle of buffers forever.
//! It exists so the full attach/unpack/fill path can be exercised without
//! hardware or fixture files, and doubles as the reference implementation
//! of the [`DataSource`] read contract.

use crate::error::{Result, SortError};
use crate::source::{DataSource, OnlineConnector};
use crate::sync::Locked;
use crate::types::RawBuffer;
use std::collections::VecDeque;

/// One scripted step of a [`SimSource`]
#[derive(Debug, Clone)]
pub enum SimStep {
    /// Stage this buffer
    Buffer(RawBuffer),
    /// Report no data available
    NoData,
    /// Fail the read
    Error(String),
}

/// Scripted in-memory source
#[derive(Debug, Default)]
pub struct SimSource {
    steps: VecDeque<SimStep>,
    cycle: Vec<RawBuffer>,
    cycle_pos: usize,
}

impl SimSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer step
    pub fn with_buffer(mut self, tag: u16, payload: impl Into<Vec<u8>>) -> Self {
        self.steps.push_back(SimStep::Buffer(RawBuffer::new(tag, payload)));
        self
    }

    /// Append a no-data step
    pub fn with_no_data(mut self) -> Self {
        self.steps.push_back(SimStep::NoData);
        self
    }

    /// Append a read-error step
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(SimStep::Error(message.into()));
        self
    }

    /// Append an arbitrary step
    pub fn with_step(mut self, step: SimStep) -> Self {
        self.steps.push_back(step);
        self
    }

    /// After the scripted steps drain, repeat these buffers forever
    ///
    /// Used by concurrency tests that need a producer that never runs dry.
    pub fn with_cycle(mut self, buffers: Vec<RawBuffer>) -> Self {
        self.cycle = buffers;
        self
    }
}

impl DataSource for SimSource {
    fn describe(&self) -> String {
        "sim".to_string()
    }

    fn read_next(&mut self) -> Result<Option<RawBuffer>> {
        if let Some(step) = self.steps.pop_front() {
            return match step {
                SimStep::Buffer(buffer) => Ok(Some(buffer)),
                SimStep::NoData => Ok(None),
                SimStep::Error(message) => Err(SortError::Read(message)),
            };
        }
        if self.cycle.is_empty() {
            return Ok(None);
        }
        let buffer = self.cycle[self.cycle_pos % self.cycle.len()].clone();
        self.cycle_pos = self.cycle_pos.wrapping_add(1);
        Ok(Some(buffer))
    }
}

/// Online connector handing out queued [`SimSource`]s
///
/// Each `connect` consumes one queued source; connecting with the queue
/// empty fails negotiation, which is how tests exercise the connect-error
/// path.
#[derive(Default)]
pub struct SimConnector {
    sources: Locked<VecDeque<SimSource>>,
}

impl SimConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a source for the next `connect`
    pub fn with_source(mut self, source: SimSource) -> Self {
        // Builder still owns the connector exclusively; no lock needed.
        self.sources.get_mut().push_back(source);
        self
    }
}

impl OnlineConnector for SimConnector {
    fn connect(&self, source_id: &str) -> Result<Box<dyn DataSource>> {
        self.sources
            .lock()
            .pop_front()
            .map(|source| Box::new(source) as Box<dyn DataSource>)
            .ok_or_else(|| SortError::Connect {
                source_id: source_id.to_string(),
                message: "no simulated source available".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_steps_in_order() {
        let mut source = SimSource::new()
            .with_buffer(1, vec![1])
            .with_no_data()
            .with_error("boom");

        assert_eq!(source.read_next().unwrap().unwrap().tag, 1);
        assert!(source.read_next().unwrap().is_none());
        assert!(matches!(source.read_next(), Err(SortError::Read(_))));
        // Drained with no cycle: permanently dry.
        assert!(source.read_next().unwrap().is_none());
    }

    #[test]
    fn test_cycle_repeats() {
        let mut source = SimSource::new()
            .with_cycle(vec![RawBuffer::new(1, vec![1]), RawBuffer::new(2, vec![2])]);
        let tags: Vec<u16> = (0..5)
            .map(|_| source.read_next().unwrap().unwrap().tag)
            .collect();
        assert_eq!(tags, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_connector_hands_out_then_fails() {
        let connector = SimConnector::new().with_source(SimSource::new().with_buffer(1, vec![]));
        assert!(connector.connect("daq01").is_ok());
        assert!(matches!(
            connector.connect("daq01"),
            Err(SortError::Connect { .. })
        ));
    }
}
