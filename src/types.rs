//! Core data types for the livesort engine
//!
//! This module contains the fundamental data structures shared across the
//! pipeline: the leaf types storable in an event record, the raw buffer
//! unit handed from a data source to the unpack step, and the kinds of
//! source connection the attach state machine distinguishes.

use serde::{Deserialize, Serialize};

/// Represents the type of a registered event record field
///
/// Every field is stored internally as an `f64` row slot; the kind controls
/// how the committed value is surfaced to gate and parameter expressions
/// (float, integer or boolean).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldKind {
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    #[default]
    F64,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// Boolean value
    Bool,
}

impl FieldKind {
    /// Returns true if expressions should see this field as an integer
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldKind::I8
                | FieldKind::I16
                | FieldKind::I32
                | FieldKind::I64
                | FieldKind::U8
                | FieldKind::U16
                | FieldKind::U32
        )
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::F32 => write!(f, "f32"),
            FieldKind::F64 => write!(f, "f64"),
            FieldKind::I8 => write!(f, "i8"),
            FieldKind::I16 => write!(f, "i16"),
            FieldKind::I32 => write!(f, "i32"),
            FieldKind::I64 => write!(f, "i64"),
            FieldKind::U8 => write!(f, "u8"),
            FieldKind::U16 => write!(f, "u16"),
            FieldKind::U32 => write!(f, "u32"),
            FieldKind::Bool => write!(f, "bool"),
        }
    }
}

/// One raw chunk of acquisition data, tagged with the event type it carries
///
/// Buffers are produced by a [`crate::source::DataSource`] and consumed by
/// the unpack step of the matching event type. The payload layout is opaque
/// to the engine; only the registered unpacker interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    /// Event type tag from the frame header
    pub tag: u16,
    /// Undecoded event bytes
    pub payload: Vec<u8>,
}

impl RawBuffer {
    /// Create a buffer from a tag and payload bytes
    pub fn new(tag: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }
}

/// The kind of connection a producer loop is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Reading buffers from a single file
    File,
    /// Polling a live online source
    Online,
    /// Working through a manifest of files
    List,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Online => write!(f, "online"),
            SourceKind::List => write!(f, "list"),
        }
    }
}
