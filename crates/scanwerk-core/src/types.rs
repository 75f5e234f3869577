// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk scanner abstraction engine.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::error::{Result, ScanError};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque identifier of a device or source handle.
///
/// Stable for the lifetime of the handle. Sources derive their id from the
/// owning device so that asking the same device twice for a child yields
/// the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Id of the child named `name` below `self`.
    pub fn child(&self, name: &str) -> Self {
        Self(Uuid::new_v5(&self.0, name.as_bytes()))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Option values
// ---------------------------------------------------------------------------

/// Declared type of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Double,
    String,
}

/// A dynamically typed option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::Str(_) => ValueType::String,
        }
    }

    /// Numeric view of integer and real values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Equality that treats `Int(3)` and `Double(3.0)` as the same value.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Physical unit of a numeric option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Unit {
    #[default]
    None,
    Pixel,
    Bit,
    Millimeter,
    Dpi,
    Percent,
    Microsecond,
}

/// Validity rule for an option value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Constraint {
    #[default]
    None,
    /// Inclusive numeric range. An `interval` of zero means any value.
    Range { min: f64, max: f64, interval: f64 },
    /// Enumerated set of allowed values, in presentation order.
    List(Vec<Value>),
}

impl Constraint {
    pub fn check(&self, value: &Value) -> bool {
        match self {
            Self::None => true,
            Self::Range { min, max, interval } => {
                let Some(v) = value.as_f64() else {
                    return false;
                };
                if v < *min || v > *max {
                    return false;
                }
                if *interval <= 0.0 {
                    return true;
                }
                let steps = (v - min) / interval;
                (steps - steps.round()).abs() < 1e-6
            }
            Self::List(values) => values.iter().any(|allowed| allowed.same_as(value)),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Range { min, max, interval } => {
                write!(f, "[{min}..{max}")?;
                if *interval > 0.0 {
                    write!(f, " step {interval}")?;
                }
                write!(f, "]")
            }
            Self::List(values) => {
                write!(f, "{{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bitmasks
// ---------------------------------------------------------------------------

bitflags! {
    /// What a client may do with an option.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Capabilities: u32 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        /// The device can pick a value itself.
        const AUTO = 1 << 2;
        /// Currently meaningless given other settings; rejects writes.
        const INACTIVE = 1 << 3;
        /// Provided by the pipeline rather than the backend.
        const EMULATED = 1 << 4;
    }
}

bitflags! {
    /// Side effects reported by a successful option write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SetFlags: u32 {
        /// The device stored a different value than the one requested.
        const VALUE_CHANGED = 1 << 0;
        /// Other options may have changed; re-fetch the option list.
        const OPTIONS_CHANGED = 1 << 1;
        /// Scan parameters must be re-read.
        const RELOAD_PARAMS = 1 << 2;
    }
}

// ---------------------------------------------------------------------------
// Option metadata
// ---------------------------------------------------------------------------

/// Everything about an option except its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub name: String,
    pub title: String,
    pub desc: String,
    pub capabilities: Capabilities,
    pub value_type: ValueType,
    pub unit: Unit,
    pub constraint: Constraint,
}

impl OptionDescriptor {
    /// Readable, writable, unconstrained option of the given type.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            desc: String::new(),
            name,
            capabilities: Capabilities::READABLE | Capabilities::WRITABLE,
            value_type,
            unit: Unit::None,
            constraint: Constraint::None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn is_active(&self) -> bool {
        !self.capabilities.contains(Capabilities::INACTIVE)
    }

    pub fn is_readable(&self) -> bool {
        self.is_active() && self.capabilities.contains(Capabilities::READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.is_active() && self.capabilities.contains(Capabilities::WRITABLE)
    }

    /// Check a candidate value and coerce it to the declared type.
    ///
    /// Integers are accepted for real-valued options. Every other type
    /// mismatch, and every value outside the constraint, is a
    /// `ConstraintViolation`.
    pub fn validate(&self, value: Value) -> Result<Value> {
        let value = match (self.value_type, value) {
            (ValueType::Double, Value::Int(v)) => Value::Double(f64::from(v)),
            (_, v) => v,
        };
        if value.value_type() != self.value_type || !self.constraint.check(&value) {
            return Err(ScanError::ConstraintViolation {
                option: self.name.clone(),
                value: value.to_string(),
                constraint: format!("{:?} {}", self.value_type, self.constraint),
            });
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Scan parameters
// ---------------------------------------------------------------------------

/// Pixel encoding of the bytes delivered by a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Row-major, 3 bytes per pixel, no padding.
    RawRgb24,
    /// One byte per pixel.
    Grayscale8,
    /// One bit per pixel, MSB first, bit set means black, rows padded to a byte.
    Bw1,
}

impl ImageFormat {
    pub fn bytes_per_line(self, width: u32) -> u64 {
        let width = u64::from(width);
        match self {
            Self::RawRgb24 => width * 3,
            Self::Grayscale8 => width,
            Self::Bw1 => width.div_ceil(8),
        }
    }
}

/// Geometry and size of the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParameters {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Expected byte count of the whole page.
    pub image_size: u64,
}

impl ScanParameters {
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            image_size: format.bytes_per_line(width) * u64::from(height),
        }
    }

    pub fn bytes_per_line(&self) -> u64 {
        self.format.bytes_per_line(self.width)
    }
}

// ---------------------------------------------------------------------------
// Nodes and devices
// ---------------------------------------------------------------------------

/// What a capability node physically is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Device,
    Flatbed,
    Adf,
    Unidentified,
}

/// Scope of a device enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceLocations {
    #[default]
    Any,
    LocalOnly,
}

/// Summary of a device as reported by enumeration, without opening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Id to pass to `get_device`.
    pub dev_id: String,
    pub vendor: String,
    pub model: String,
    /// Free-form device type ("flatbed scanner", "all-in-one", ...).
    pub kind: String,
    /// Name of the backend that reported the device.
    pub backend: String,
    pub local: bool,
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({}:{})", self.vendor, self.model, self.backend, self.dev_id)
    }
}

// ---------------------------------------------------------------------------
// Cancellation and error classes
// ---------------------------------------------------------------------------

/// Shared cancellation flag between a session and whoever may cancel it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Whether an error may succeed when the call is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_constraint_rejects_unlisted_value() {
        let c = Constraint::List(vec![150.into(), 200.into(), 300.into()]);
        assert!(!c.check(&Value::Int(175)));
        assert!(c.check(&Value::Int(300)));
        assert!(c.check(&Value::Double(200.0)));
    }

    #[test]
    fn range_constraint_honours_interval() {
        let c = Constraint::Range {
            min: 75.0,
            max: 1200.0,
            interval: 25.0,
        };
        assert!(c.check(&Value::Int(100)));
        assert!(!c.check(&Value::Int(110)));
        assert!(!c.check(&Value::Int(1225)));
        assert!(!c.check(&Value::Str("100".into())));
    }

    #[test]
    fn validate_coerces_int_to_double() {
        let desc = OptionDescriptor::new("tl-x", ValueType::Double).with_constraint(
            Constraint::Range {
                min: 0.0,
                max: 215.9,
                interval: 0.0,
            },
        );
        assert_eq!(desc.validate(Value::Int(10)).unwrap(), Value::Double(10.0));
        assert!(matches!(
            desc.validate(Value::Str("10".into())),
            Err(ScanError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn inactive_option_is_neither_readable_nor_writable() {
        let desc = OptionDescriptor::new("lamp-switch", ValueType::Bool).with_capabilities(
            Capabilities::READABLE | Capabilities::WRITABLE | Capabilities::INACTIVE,
        );
        assert!(!desc.is_readable());
        assert!(!desc.is_writable());
    }

    #[test]
    fn bitmask_ops() {
        let mut flags = SetFlags::empty();
        assert!(flags.is_empty());
        flags |= SetFlags::OPTIONS_CHANGED;
        assert!(flags.contains(SetFlags::OPTIONS_CHANGED));
        assert!(!flags.contains(SetFlags::OPTIONS_CHANGED | SetFlags::RELOAD_PARAMS));
        flags.remove(SetFlags::OPTIONS_CHANGED);
        assert!(flags.is_empty());
        let caps = Capabilities::READABLE | Capabilities::WRITABLE;
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, "\"READABLE | WRITABLE\"");
        assert_eq!(serde_json::from_str::<Capabilities>(&json).unwrap(), caps);
    }

    #[test]
    fn a4_at_300dpi_page_size() {
        let params = ScanParameters::new(ImageFormat::RawRgb24, 2550, 3509);
        assert_eq!(params.image_size, 26_843_850);
        let bw = ScanParameters::new(ImageFormat::Bw1, 10, 2);
        assert_eq!(bw.image_size, 4);
    }

    #[test]
    fn child_ids_are_stable() {
        let dev = NodeId::new();
        assert_eq!(dev.child("flatbed"), dev.child("flatbed"));
        assert_ne!(dev.child("flatbed"), dev.child("feeder"));
    }

    #[test]
    fn descriptor_display() {
        let d = DeviceDescriptor {
            dev_id: "dev0".into(),
            vendor: "Acme".into(),
            model: "Scan 3000".into(),
            kind: "flatbed scanner".into(),
            backend: "dumb".into(),
            local: true,
        };
        assert_eq!(d.to_string(), "Acme Scan 3000 (dumb:dev0)");
    }

    #[test]
    fn cancel_token_is_shared() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }
}
