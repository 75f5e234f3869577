// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.opt_values: vendor-specific or translated values of `mode` and
// `source` to the canonical ones, in both directions.
//
// Clients only ever see and write canonical values. On write, the value is
// translated back to whatever the driver listed in its constraint.

use scanwerk_backend::traits::ScanOption;
use scanwerk_core::error::Result;
use scanwerk_core::names::{
    MODE_COLOR, MODE_GRAY, MODE_LINEART, OPT_MODE, OPT_SOURCE, SOURCE_FEEDER, SOURCE_FLATBED,
};
use scanwerk_core::types::{Constraint, OptionDescriptor, SetFlags, Value};

use crate::layer::{Layer, LayerOption};

/// (option, driver value, canonical value)
const MAPPINGS: &[(&str, &str, &str)] = &[
    // Brother
    (OPT_MODE, "Black & White", MODE_LINEART),
    (OPT_MODE, "True Gray", MODE_GRAY),
    (OPT_MODE, "24bit Color", MODE_COLOR),
    // OKI, French translations
    (OPT_MODE, "Couleur", MODE_COLOR),
    (OPT_MODE, "Gris", MODE_GRAY),
    (OPT_MODE, "Noir et blanc", MODE_LINEART),
    (OPT_SOURCE, "Scanneur à plat", SOURCE_FLATBED),
    (
        OPT_SOURCE,
        "Chargeur automatique de documents (ADF)",
        SOURCE_FEEDER,
    ),
];

fn same_text(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn is_mapped(option: &str) -> bool {
    MAPPINGS.iter().any(|(opt, _, _)| opt.eq_ignore_ascii_case(option))
}

/// Canonical form of a driver value, if it has one.
pub fn canonical_value(option: &str, value: &str) -> Option<&'static str> {
    MAPPINGS
        .iter()
        .find(|(opt, driver, _)| opt.eq_ignore_ascii_case(option) && same_text(driver, value))
        .map(|(_, _, canonical)| *canonical)
}

fn to_canonical(option: &str, value: Value) -> Value {
    match &value {
        Value::Str(s) => canonical_value(option, s).map(Value::from).unwrap_or(value),
        _ => value,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OptValues;

impl Layer for OptValues {
    const NAME: &'static str = "workaround.opt_values";
    type DeviceState = ();
    type SessionState = ();

    fn descriptor<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<OptionDescriptor> {
        let mut desc = opt.inner().descriptor()?;
        if !is_mapped(&desc.name) {
            return Ok(desc);
        }
        if let Constraint::List(values) = &mut desc.constraint {
            for value in values.iter_mut() {
                *value = to_canonical(&desc.name, value.clone());
            }
        }
        Ok(desc)
    }

    fn value<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<Value> {
        let value = opt.inner().value()?;
        let desc = opt.inner().descriptor()?;
        if !is_mapped(&desc.name) {
            return Ok(value);
        }
        Ok(to_canonical(&desc.name, value))
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        let Value::Str(requested) = &value else {
            return opt.inner().set_value(value);
        };
        let desc = opt.inner().descriptor()?;
        if !is_mapped(&desc.name) {
            return opt.inner().set_value(value);
        }
        let Constraint::List(values) = &desc.constraint else {
            return opt.inner().set_value(value);
        };

        let driver_value = values.iter().find_map(|v| match v {
            Value::Str(s) if canonical_value(&desc.name, s).is_some_and(|c| same_text(c, requested)) => {
                Some(s.clone())
            }
            _ => None,
        });
        match driver_value {
            Some(driver) => {
                opt.ctx().log_debug(&format!(
                    "{}: '{requested}' written as '{driver}'",
                    desc.name
                ));
                opt.inner().set_value(Value::Str(driver))
            }
            None => opt.inner().set_value(value),
        }
    }
}
