// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.check_capabilities: some drivers crash or hang when an
// unreadable option is read or a read-only one is written. Refuse those
// calls before they reach the backend.

use scanwerk_backend::traits::ScanOption;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::{Constraint, SetFlags, Value};

use crate::layer::{Layer, LayerOption};

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckCapabilities;

impl Layer for CheckCapabilities {
    const NAME: &'static str = "workaround.check_capabilities";
    type DeviceState = ();
    type SessionState = ();

    fn value<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<Value> {
        let desc = opt.inner().descriptor()?;
        if !desc.is_readable() {
            opt.ctx().log_warning(&format!(
                "get_value({}): capabilities prevent reading the value",
                desc.name
            ));
            return Err(ScanError::AccessDenied { option: desc.name });
        }
        opt.inner().value()
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        let desc = opt.inner().descriptor()?;

        // Drivers reject writes to options with a single possible value.
        let only = match &desc.constraint {
            Constraint::List(values) if values.len() == 1 => Some(&values[0]),
            _ => None,
        };
        if let Some(only) = only {
            if only.same_as(&value) {
                opt.ctx().log_info(&format!(
                    "set_value({}): only one value possible, option not written",
                    desc.name
                ));
                return Ok(SetFlags::empty());
            }
            return Err(ScanError::ConstraintViolation {
                option: desc.name.clone(),
                value: value.to_string(),
                constraint: desc.constraint.to_string(),
            });
        }

        self.write_checked(opt, desc.is_writable(), &desc.name, value)
    }
}

impl CheckCapabilities {
    fn write_checked<O: ScanOption>(
        &self,
        opt: &LayerOption<Self, O>,
        writable: bool,
        name: &str,
        value: Value,
    ) -> Result<SetFlags> {
        if !writable {
            opt.ctx().log_warning(&format!(
                "set_value({name}): capabilities prevent writing the value"
            ));
            return Err(ScanError::Inactive {
                option: name.to_string(),
            });
        }
        opt.inner().set_value(value)
    }
}
