// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client-side handle on one option of a device or source.

use scanwerk_backend::traits::ScanOption;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::{OptionDescriptor, SetFlags, Value};

use crate::StackOption;

/// One named, typed, constrained setting.
///
/// The handle is a snapshot of the option list it came from. After a write
/// reporting `OPTIONS_CHANGED`, fetch the list again before trusting the
/// constraints of the other handles.
#[derive(Clone)]
pub struct OptionHandle {
    inner: StackOption,
    name: String,
}

impl std::fmt::Debug for OptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionHandle")
            .field("name", &self.name)
            .finish()
    }
}

impl OptionHandle {
    pub(crate) fn new(inner: StackOption) -> Result<Self> {
        let name = inner.descriptor()?.name;
        Ok(Self { inner, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> Result<OptionDescriptor> {
        self.inner.descriptor()
    }

    pub fn value(&self) -> Result<Value> {
        self.inner.value()
    }

    /// Validate `value` against the current descriptor, then write it.
    ///
    /// Fails with `Inactive` when the option cannot be written and with
    /// `ConstraintViolation` when the value is outside the constraint or of
    /// the wrong type. Integers are accepted for real-valued options.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<SetFlags> {
        let desc = self.inner.descriptor()?;
        if !desc.is_writable() {
            return Err(ScanError::Inactive { option: desc.name });
        }
        let value = desc.validate(value.into())?;
        self.inner.set_value(value)
    }
}
