// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.cache: memoize option descriptors and values.
//
// Some drivers take hundreds of milliseconds per option access. Entries are
// shared by every handle of one opened device and dropped wholesale when a
// write reports OPTIONS_CHANGED.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scanwerk_backend::traits::ScanOption;
use scanwerk_core::error::Result;
use scanwerk_core::types::{OptionDescriptor, SetFlags, Value};

use crate::layer::{Layer, LayerOption};

#[derive(Debug, Clone, Copy, Default)]
pub struct Cache;

#[derive(Debug, Default, Clone)]
struct Entry {
    desc: Option<OptionDescriptor>,
    value: Option<Value>,
}

/// Cache entries keyed by (node name, option index).
#[derive(Debug, Default)]
pub struct CacheState {
    entries: Mutex<HashMap<(Arc<str>, usize), Entry>>,
}

impl CacheState {
    fn lock(&self) -> MutexGuard<'_, HashMap<(Arc<str>, usize), Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn key<O: ScanOption>(opt: &LayerOption<Cache, O>) -> (Arc<str>, usize) {
    (opt.node.clone(), opt.index)
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(a), Value::Str(b)) => a.eq_ignore_ascii_case(b),
        _ => a.same_as(b),
    }
}

impl Layer for Cache {
    const NAME: &'static str = "workaround.cache";
    type DeviceState = CacheState;
    type SessionState = ();

    fn descriptor<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<OptionDescriptor> {
        let state = opt.device_state();
        if let Some(desc) = state.lock().get(&key(opt)).and_then(|e| e.desc.clone()) {
            return Ok(desc);
        }
        let desc = opt.inner().descriptor()?;
        state.lock().entry(key(opt)).or_default().desc = Some(desc.clone());
        Ok(desc)
    }

    fn value<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<Value> {
        let state = opt.device_state();
        if let Some(value) = state.lock().get(&key(opt)).and_then(|e| e.value.clone()) {
            return Ok(value);
        }
        let value = opt.inner().value()?;
        state.lock().entry(key(opt)).or_default().value = Some(value.clone());
        Ok(value)
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        if let Ok(current) = self.value(opt) {
            if same_value(&current, &value) {
                opt.ctx().log_info(&format!(
                    "{}[{}]: value {value} already set, write skipped",
                    opt.node_name(),
                    opt.index()
                ));
                // The device keeps its own spelling of the string.
                return Ok(if current.same_as(&value) {
                    SetFlags::empty()
                } else {
                    SetFlags::VALUE_CHANGED
                });
            }
        }

        let state = opt.device_state();
        let result = opt.inner().set_value(value.clone());
        let mut entries = state.lock();
        match &result {
            Ok(flags) if flags.contains(SetFlags::OPTIONS_CHANGED) => {
                opt.ctx().log_debug("options changed, cache cleared");
                entries.clear();
            }
            Ok(flags) if flags.contains(SetFlags::VALUE_CHANGED) => {
                entries.entry(key(opt)).or_default().value = None;
            }
            Ok(_) => {
                entries.entry(key(opt)).or_default().value = Some(value);
            }
            Err(_) => {
                entries.entry(key(opt)).or_default().value = None;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::wrap;
    use rstest::rstest;
    use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbOption};
    use scanwerk_backend::traits::{Api, Item};
    use scanwerk_core::types::ValueType;

    fn int_opt(name: &str, value: i32) -> DumbOption {
        DumbOption::new(OptionDescriptor::new(name, ValueType::Int), value)
    }

    fn backend() -> DumbBackend {
        let backend = DumbBackend::new("dumb");
        backend.add_device(
            DumbDevice::new("dev0", "Acme", "Scan")
                .with_option(int_opt("depth", 8).with_side_effect("gamma", 5))
                .with_option(int_opt("gamma", 1))
                .with_option(int_opt("contrast", 0)),
        );
        backend
    }

    #[rstest]
    #[case(true, 1)]
    #[case(false, 3)]
    fn repeated_reads_hit_the_backend_once(#[case] enabled: bool, #[case] reads: usize) {
        let backend = backend();
        let api = wrap(Cache, enabled, backend.clone());
        let opt = api.get_device("dev0").unwrap().options().unwrap().remove(2);
        for _ in 0..3 {
            assert_eq!(opt.value().unwrap(), Value::Int(0));
        }
        assert_eq!(backend.counters().value_reads, reads);
    }

    #[test]
    fn entries_are_shared_between_handles() {
        let backend = backend();
        let api = wrap(Cache, true, backend.clone());
        let dev = api.get_device("dev0").unwrap();
        dev.options().unwrap()[2].descriptor().unwrap();
        dev.options().unwrap()[2].descriptor().unwrap();
        assert_eq!(backend.counters().descriptor_reads, 1);
    }

    #[test]
    fn writing_the_current_value_is_skipped() {
        let backend = backend();
        let api = wrap(Cache, true, backend.clone());
        let opt = api.get_device("dev0").unwrap().options().unwrap().remove(2);
        assert_eq!(opt.set_value(Value::Int(0)).unwrap(), SetFlags::empty());
        assert_eq!(backend.counters().value_writes, 0);

        opt.set_value(Value::Int(4)).unwrap();
        assert_eq!(backend.counters().value_writes, 1);
        assert_eq!(opt.value().unwrap(), Value::Int(4));
    }

    #[test]
    fn case_only_difference_reports_the_kept_spelling() {
        let backend = DumbBackend::new("dumb");
        backend.add_device(DumbDevice::new("dev0", "Acme", "Scan").with_option(DumbOption::new(
            OptionDescriptor::new("mode", ValueType::String),
            "Color",
        )));
        let api = wrap(Cache, true, backend.clone());
        let opt = api.get_device("dev0").unwrap().options().unwrap().remove(0);

        let flags = opt.set_value(Value::from("color")).unwrap();
        assert_eq!(flags, SetFlags::VALUE_CHANGED);
        assert_eq!(opt.value().unwrap(), Value::from("Color"));
        assert_eq!(backend.counters().value_writes, 0);
    }

    #[test]
    fn options_changed_drops_every_entry() {
        let backend = backend();
        let api = wrap(Cache, true, backend.clone());
        let options = api.get_device("dev0").unwrap().options().unwrap();
        assert_eq!(options[1].value().unwrap(), Value::Int(1));

        let flags = options[0].set_value(Value::Int(16)).unwrap();
        assert!(flags.contains(SetFlags::OPTIONS_CHANGED));
        assert_eq!(options[1].value().unwrap(), Value::Int(5));
    }
}
