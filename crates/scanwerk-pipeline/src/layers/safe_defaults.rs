// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.safe_defaults: put every node in a sane state as soon as it is
// opened: color, no preview, 300 dpi, scan area to the maximum.
//
// Drivers differ wildly in their initial values (a scan area of a few
// millimetres, preview mode on, lineart). Scan-area limits are applied again
// right before scanning since they may depend on other options. Options the
// client wrote explicitly are never touched again. Failures are only logged.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use scanwerk_backend::traits::{Item, ScanOption};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::Logger;
use scanwerk_core::names::{
    MODE_COLOR, OPT_BR_X, OPT_BR_Y, OPT_MODE, OPT_PREVIEW, OPT_RESOLUTION, OPT_TL_X, OPT_TL_Y,
};
use scanwerk_core::types::{Constraint, OptionDescriptor, SetFlags, Value, ValueType};

use crate::layer::{Layer, LayerItem, LayerOption, LayerSession, Node, passthrough};

#[derive(Debug, Clone, Copy)]
enum Target {
    Str(&'static str),
    Bool(bool),
    /// Closest allowed value.
    Int(i32),
    Min,
    Max,
}

struct SafeSetter {
    option: &'static str,
    target: Target,
    /// Applied again on every `scan_start`.
    before_scan: bool,
}

const SETTERS: &[SafeSetter] = &[
    SafeSetter {
        option: OPT_MODE,
        target: Target::Str(MODE_COLOR),
        before_scan: false,
    },
    SafeSetter {
        option: OPT_PREVIEW,
        target: Target::Bool(false),
        before_scan: false,
    },
    SafeSetter {
        option: OPT_RESOLUTION,
        target: Target::Int(300),
        before_scan: false,
    },
    SafeSetter {
        option: OPT_TL_X,
        target: Target::Min,
        before_scan: true,
    },
    SafeSetter {
        option: OPT_TL_Y,
        target: Target::Min,
        before_scan: true,
    },
    SafeSetter {
        option: OPT_BR_X,
        target: Target::Max,
        before_scan: true,
    },
    SafeSetter {
        option: OPT_BR_Y,
        target: Target::Max,
        before_scan: true,
    },
    // Fujitsu: media size used for automatic centering of sheet-fed scans.
    // The defaults are wrong more often than not.
    SafeSetter {
        option: "page-width",
        target: Target::Max,
        before_scan: true,
    },
    SafeSetter {
        option: "page-height",
        target: Target::Max,
        before_scan: true,
    },
];

/// Per device: which nodes got their defaults, which options the client set.
#[derive(Debug, Default)]
pub struct SafeDefaultsState {
    inner: Mutex<Tracked>,
}

#[derive(Debug, Default)]
struct Tracked {
    defaulted: HashSet<String>,
    user_set: HashSet<(String, String)>,
}

impl SafeDefaultsState {
    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True the first time a node name is seen.
    fn first_visit(&self, node: &str) -> bool {
        self.lock().defaulted.insert(node.to_string())
    }

    fn mark_user_set(&self, node: &str, option: &str) {
        self.lock()
            .user_set
            .insert((node.to_string(), option.to_ascii_lowercase()));
    }

    pub fn is_user_set(&self, node: &str, option: &str) -> bool {
        self.lock()
            .user_set
            .contains(&(node.to_string(), option.to_ascii_lowercase()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafeDefaults;

fn closest(values: &[Value], target: f64) -> Option<Value> {
    values
        .iter()
        .filter(|v| v.as_f64().is_some())
        .min_by(|a, b| {
            let da = (a.as_f64().unwrap_or(f64::MAX) - target).abs();
            let db = (b.as_f64().unwrap_or(f64::MAX) - target).abs();
            da.total_cmp(&db)
        })
        .cloned()
}

fn numeric(value_type: ValueType, v: f64) -> Value {
    match value_type {
        ValueType::Int => Value::Int(v as i32),
        _ => Value::Double(v),
    }
}

/// Value to write for `target`, or why there is none.
fn resolve<O: ScanOption>(
    opt: &O,
    desc: &OptionDescriptor,
    target: Target,
) -> std::result::Result<Value, String> {
    let is_numeric = matches!(desc.value_type, ValueType::Int | ValueType::Double);
    match target {
        Target::Str(s) if desc.value_type == ValueType::String => Ok(Value::from(s)),
        Target::Bool(b) if desc.value_type == ValueType::Bool => Ok(Value::Bool(b)),
        Target::Int(n) if is_numeric => match &desc.constraint {
            Constraint::List(values) => {
                closest(values, f64::from(n)).ok_or_else(|| "empty value list".to_string())
            }
            Constraint::Range { min, max, .. } => {
                Ok(numeric(desc.value_type, f64::from(n).clamp(*min, *max)))
            }
            Constraint::None => Ok(numeric(desc.value_type, f64::from(n))),
        },
        Target::Min | Target::Max if is_numeric => {
            let (min, max) = match &desc.constraint {
                Constraint::Range { min, max, .. } => (*min, *max),
                other => return Err(format!("unexpected constraint {other}")),
            };
            // Keep a current value that is already beyond the limit.
            let current = opt.value().ok().and_then(|v| v.as_f64());
            let v = match (target, current) {
                (Target::Max, Some(c)) => c.max(max),
                (Target::Max, None) => max,
                (_, Some(c)) => c.min(min),
                (_, None) => min,
            };
            Ok(numeric(desc.value_type, v))
        }
        _ => Err(format!("value type {:?} does not fit", desc.value_type)),
    }
}

/// Apply the matching defaults to the options of one node.
fn apply_defaults<I: Item>(
    item: &I,
    node: &str,
    state: &SafeDefaultsState,
    logger: &Logger,
    before_scan_only: bool,
) -> Result<()> {
    let log = |message: String| logger.info(SafeDefaults::NAME, &message);
    let warn = |message: String| logger.warning(SafeDefaults::NAME, &message);

    for opt in item.options()? {
        let desc = match opt.descriptor() {
            Ok(desc) => desc,
            Err(e @ ScanError::DeviceDisconnected { .. }) => return Err(e),
            Err(e) => {
                warn(format!("{node}: cannot describe option: {e}"));
                continue;
            }
        };
        let Some(setter) = SETTERS
            .iter()
            .find(|s| s.option.eq_ignore_ascii_case(&desc.name))
        else {
            continue;
        };
        if (before_scan_only && !setter.before_scan) || state.is_user_set(node, &desc.name) {
            continue;
        }
        if !desc.is_writable() {
            continue;
        }
        let value = match resolve(&opt, &desc, setter.target) {
            Ok(value) => value,
            Err(why) => {
                warn(format!("{node}: cannot default '{}': {why}", desc.name));
                continue;
            }
        };
        match opt.set_value(value.clone()) {
            Ok(flags) => log(format!("{node}: {} = {value} ({flags:?})", desc.name)),
            Err(e) => warn(format!("{node}: {} = {value} failed: {e}", desc.name)),
        }
    }
    Ok(())
}

impl Layer for SafeDefaults {
    const NAME: &'static str = "normalizer.safe_defaults";
    type DeviceState = SafeDefaultsState;
    type SessionState = ();

    fn filter_node<I: Item>(
        &self,
        node: &mut Node<I>,
        device: &SafeDefaultsState,
        logger: &Logger,
    ) -> Result<()> {
        if node.synthetic || !device.first_visit(&node.name) {
            return Ok(());
        }
        if let Err(e) = apply_defaults(&node.inner, &node.name, device, logger, false) {
            logger.warning(Self::NAME, &format!("{}: defaults not applied: {e}", node.name));
        }
        Ok(())
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        let flags = opt.inner().set_value(value)?;
        if let Ok(desc) = opt.inner().descriptor() {
            opt.device_state().mark_user_set(opt.node_name(), &desc.name);
        }
        Ok(flags)
    }

    fn scan_start<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<LayerSession<Self, I>> {
        let node = item.node();
        let logger = &item.ctx().logger;
        if let Err(e) = apply_defaults(&node.inner, &node.name, item.device_state(), logger, true) {
            item.ctx()
                .log_warning(&format!("{}: scan area not reset: {e}", node.name));
        }
        passthrough::scan_start(item)
    }
}
