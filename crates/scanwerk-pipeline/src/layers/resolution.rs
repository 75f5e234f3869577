// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.resolution: `resolution` is always an integer option with a
// list constraint.

use scanwerk_backend::traits::ScanOption;
use scanwerk_core::error::Result;
use scanwerk_core::names::OPT_RESOLUTION;
use scanwerk_core::types::{Constraint, OptionDescriptor, SetFlags, Value, ValueType};

use crate::layer::{Layer, LayerOption};

/// Smallest step of a generated list. A step of 1 dpi would produce lists
/// hundreds of entries long.
pub const MIN_RESOLUTION_INTERVAL: i32 = 25;

/// Used when the driver gives no constraint at all.
const DEFAULT_RESOLUTIONS: &[i32] = &[
    75, 100, 125, 150, 175, 200, 225, 250, 275, 300, 325, 350, 375, 400, 425, 450, 475, 500, 525,
    550, 575, 600,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Resolution;

fn is_resolution(desc: &OptionDescriptor) -> bool {
    desc.name.eq_ignore_ascii_case(OPT_RESOLUTION)
}

/// Expand a range into a list.
///
/// Ranges with a usable step are expanded as-is. Ranges with no step (or a
/// step of 1) use [`MIN_RESOLUTION_INTERVAL`], realigned on multiples of it,
/// and keep their exact minimum and maximum.
pub fn range_to_list(min: i32, max: i32, interval: i32) -> Vec<i32> {
    let coarse = interval <= 1;
    let step = if coarse { MIN_RESOLUTION_INTERVAL } else { interval };
    let mut out = Vec::new();
    let mut val = min;
    if coarse && val % step != 0 {
        out.push(val);
        val += step;
        val -= val % step;
    }
    while val <= max {
        out.push(val);
        val += step;
    }
    if coarse && out.last() != Some(&max) {
        out.push(max);
    }
    out
}

fn ints(values: impl IntoIterator<Item = i32>) -> Constraint {
    Constraint::List(values.into_iter().map(Value::Int).collect())
}

fn truncate(value: &Value) -> Value {
    match value {
        Value::Double(v) => Value::Int(*v as i32),
        other => other.clone(),
    }
}

impl Layer for Resolution {
    const NAME: &'static str = "normalizer.resolution";
    type DeviceState = ();
    type SessionState = ();

    fn descriptor<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<OptionDescriptor> {
        let mut desc = opt.inner().descriptor()?;
        if !is_resolution(&desc) {
            return Ok(desc);
        }
        if !matches!(desc.value_type, ValueType::Int | ValueType::Double) {
            opt.ctx().log_warning(&format!(
                "unexpected value type for option '{}': {:?}",
                desc.name, desc.value_type
            ));
            return Ok(desc);
        }

        desc.constraint = match &desc.constraint {
            Constraint::List(values) => ints(values.iter().filter_map(|v| truncate(v).as_int())),
            Constraint::Range { min, max, interval } => {
                let list = range_to_list(*min as i32, *max as i32, *interval as i32);
                opt.ctx().log_debug(&format!(
                    "resolution range {min}-{max}-{interval} exposed as {} values",
                    list.len()
                ));
                ints(list)
            }
            Constraint::None => {
                opt.ctx()
                    .log_warning("resolution has no constraint, using the default list");
                ints(DEFAULT_RESOLUTIONS.iter().copied())
            }
        };
        desc.value_type = ValueType::Int;
        Ok(desc)
    }

    fn value<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<Value> {
        let value = opt.inner().value()?;
        if !is_resolution(&opt.inner().descriptor()?) {
            return Ok(value);
        }
        Ok(truncate(&value))
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        let desc = opt.inner().descriptor()?;
        let value = match (&value, desc.value_type) {
            (Value::Int(v), ValueType::Double) if is_resolution(&desc) => {
                opt.ctx()
                    .log_debug(&format!("set_value(resolution): {v} written as a real"));
                Value::Double(f64::from(*v))
            }
            _ => value,
        };
        opt.inner().set_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::wrap;
    use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbOption};
    use scanwerk_backend::traits::{Api, Item};

    fn device_with(desc: OptionDescriptor, value: impl Into<Value>) -> DumbBackend {
        let backend = DumbBackend::new("dumb");
        backend.add_device(
            DumbDevice::new("dev0", "Acme", "Scan").with_option(DumbOption::new(desc, value)),
        );
        backend
    }

    fn resolution_opt<A: Api>(api: &A) -> <A::Item as Item>::Opt {
        api.get_device("dev0").unwrap().options().unwrap().remove(0)
    }

    #[test]
    fn stepless_range_is_realigned() {
        let list = range_to_list(60, 140, 1);
        assert_eq!(list, vec![60, 75, 100, 125, 140]);
    }

    #[test]
    fn stepped_range_is_kept() {
        assert_eq!(range_to_list(100, 400, 100), vec![100, 200, 300, 400]);
    }

    #[test]
    fn aligned_range_has_no_duplicate_ends() {
        let list = range_to_list(75, 1200, 1);
        assert_eq!(list.first(), Some(&75));
        assert_eq!(list.last(), Some(&1200));
        assert_eq!(list.len(), 46);
    }

    #[test]
    fn real_range_becomes_integer_list() {
        let backend = device_with(
            OptionDescriptor::new(OPT_RESOLUTION, ValueType::Double).with_constraint(
                Constraint::Range {
                    min: 50.0,
                    max: 100.0,
                    interval: 0.0,
                },
            ),
            75.5,
        );
        let api = wrap(Resolution, true, backend.clone());
        let opt = resolution_opt(&api);
        let desc = opt.descriptor().unwrap();
        assert_eq!(desc.value_type, ValueType::Int);
        assert_eq!(desc.constraint, ints([50, 75, 100]));
        assert_eq!(opt.value().unwrap(), Value::Int(75));

        opt.set_value(Value::Int(100)).unwrap();
        assert_eq!(
            backend.peek_value("dev0", "dev0", OPT_RESOLUTION),
            Some(Value::Double(100.0))
        );
    }

    #[test]
    fn missing_constraint_gets_default_list() {
        let api = wrap(
            Resolution,
            true,
            device_with(OptionDescriptor::new(OPT_RESOLUTION, ValueType::Int), 300),
        );
        let desc = resolution_opt(&api).descriptor().unwrap();
        assert_eq!(desc.constraint, ints(DEFAULT_RESOLUTIONS.iter().copied()));
    }

    #[test]
    fn disabled_layer_keeps_range() {
        let range = Constraint::Range {
            min: 75.0,
            max: 1200.0,
            interval: 1.0,
        };
        let api = wrap(
            Resolution,
            false,
            device_with(
                OptionDescriptor::new(OPT_RESOLUTION, ValueType::Int).with_constraint(range.clone()),
                300,
            ),
        );
        assert_eq!(resolution_opt(&api).descriptor().unwrap().constraint, range);
    }
}
