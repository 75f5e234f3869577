// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.lamp: some scanners only scan with the lamp explicitly switched
// on, and leave it burning afterwards unless told otherwise.

use scanwerk_backend::traits::{Item, ScanOption, ScanSession};
use scanwerk_core::error::Result;
use scanwerk_core::names::OPT_LAMP_SWITCH;
use scanwerk_core::types::Value;

use crate::layer::{Layer, LayerCtx, LayerItem, LayerSession, Node};
use crate::layers::find_option;

#[derive(Debug, Clone, Copy, Default)]
pub struct Lamp;

#[derive(Debug, Default)]
pub struct LampSession {
    lit: bool,
}

/// Writable `lamp-switch` of the node or, failing that, of its device.
fn lamp_switch<I: Item>(ctx: &LayerCtx<Lamp>, node: &Node<I>) -> Option<I::Opt> {
    let mut candidates = vec![&node.inner];
    if let Some(root) = &node.root {
        candidates.push(root);
    }
    for item in candidates {
        match find_option(item, OPT_LAMP_SWITCH) {
            Ok(Some((opt, desc))) if desc.is_writable() => return Some(opt),
            Ok(_) => {}
            Err(e) => {
                ctx.log_warning(&format!("cannot list options of '{}': {e}", node.name));
                return None;
            }
        }
    }
    None
}

/// Returns whether the write went through.
fn write<I: Item>(ctx: &LayerCtx<Lamp>, node: &Node<I>, opt: &I::Opt, on: bool) -> bool {
    match opt.set_value(Value::Bool(on)) {
        Ok(_) => {
            ctx.log_info(&format!("lamp on '{}' switched to {on}", node.name));
            true
        }
        Err(e) => {
            ctx.log_warning(&format!("failed to switch lamp on '{}': {e}", node.name));
            false
        }
    }
}

fn switch_off<I: Item>(ctx: &LayerCtx<Lamp>, node: &Node<I>) {
    if let Some(opt) = lamp_switch(ctx, node) {
        write(ctx, node, &opt, false);
    }
}

impl Layer for Lamp {
    const NAME: &'static str = "workaround.lamp";
    type DeviceState = ();
    type SessionState = LampSession;

    fn scan_start<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<LayerSession<Self, I>> {
        let (ctx, node) = (item.ctx(), item.node());
        let lamp = lamp_switch(ctx, node);
        let was_on = lamp
            .as_ref()
            .is_some_and(|opt| matches!(opt.value(), Ok(Value::Bool(true))));
        // Only a lamp this call switched on may be switched back off when
        // the start fails: it may belong to a scan already running.
        let switched_on = match &lamp {
            Some(opt) if !was_on => write(ctx, node, opt, true),
            _ => false,
        };
        match node.inner.scan_start() {
            Ok(inner) => {
                let mut session = item.wrap_session(inner);
                session.state.lit = was_on || switched_on;
                Ok(session)
            }
            Err(e) => {
                if let (Some(opt), true) = (&lamp, switched_on) {
                    write(ctx, node, opt, false);
                }
                Err(e)
            }
        }
    }

    fn end_of_feed<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        let ended = session.inner.end_of_feed()?;
        if ended && session.state.lit {
            session.state.lit = false;
            switch_off(&session.ctx, &session.node);
        }
        Ok(ended)
    }

    fn cancel<I: Item>(&self, session: &mut LayerSession<Self, I>) {
        session.inner.cancel();
        if session.state.lit {
            session.state.lit = false;
            switch_off(&session.ctx, &session.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain_page, wrap};
    use rstest::rstest;
    use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbOption, DumbPage};
    use scanwerk_backend::traits::Api;
    use scanwerk_core::error::ScanError;
    use scanwerk_core::types::{ImageFormat, OptionDescriptor, ScanParameters, ValueType};

    fn backend(with_lamp: bool) -> DumbBackend {
        let backend = DumbBackend::new("dumb");
        let mut device = DumbDevice::new("dev0", "Acme", "Scan").with_page(DumbPage::new(
            ScanParameters::new(ImageFormat::RawRgb24, 4, 2),
        ));
        if with_lamp {
            device = device.with_option(DumbOption::new(
                OptionDescriptor::new(OPT_LAMP_SWITCH, ValueType::Bool),
                false,
            ));
        }
        backend.add_device(device);
        backend
    }

    fn lamp(backend: &DumbBackend) -> Option<Value> {
        backend.peek_value("dev0", "dev0", OPT_LAMP_SWITCH)
    }

    #[test]
    fn lamp_burns_for_the_whole_feed() {
        let backend = backend(true);
        let api = wrap(Lamp, true, backend.clone());
        let mut session = api.get_device("dev0").unwrap().scan_start().unwrap();
        assert_eq!(lamp(&backend), Some(Value::Bool(true)));

        assert_eq!(drain_page(&mut session, 64).len(), 24);
        assert!(session.end_of_feed().unwrap());
        assert_eq!(lamp(&backend), Some(Value::Bool(false)));
    }

    #[test]
    fn cancel_switches_the_lamp_off() {
        let backend = backend(true);
        let api = wrap(Lamp, true, backend.clone());
        let mut session = api.get_device("dev0").unwrap().scan_start().unwrap();
        session.cancel();
        assert_eq!(lamp(&backend), Some(Value::Bool(false)));
        assert!(!backend.is_busy("dev0"));
    }

    #[rstest]
    #[case(true, false)]
    #[case(false, true)]
    fn lamp_is_left_alone(#[case] with_lamp: bool, #[case] enabled: bool) {
        let backend = backend(with_lamp);
        let api = wrap(Lamp, enabled, backend.clone());
        let mut session = api.get_device("dev0").unwrap().scan_start().unwrap();
        assert_eq!(drain_page(&mut session, 64).len(), 24);
        assert_eq!(lamp(&backend), with_lamp.then_some(Value::Bool(false)));
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn busy_device_keeps_its_lamp_burning(#[case] writes_while_busy: bool) {
        let backend = backend(true);
        if writes_while_busy {
            backend.allow_writes_while_busy();
        }
        let api = wrap(Lamp, true, backend.clone());
        let dev = api.get_device("dev0").unwrap();
        let mut running = dev.scan_start().unwrap();
        assert_eq!(lamp(&backend), Some(Value::Bool(true)));

        assert!(matches!(dev.scan_start(), Err(ScanError::DeviceBusy { .. })));
        assert_eq!(lamp(&backend), Some(Value::Bool(true)));

        assert_eq!(drain_page(&mut running, 64).len(), 24);
        assert!(running.end_of_feed().unwrap());
        assert_eq!(lamp(&backend), Some(Value::Bool(false)));
    }

    #[test]
    fn rejected_start_restores_the_lamp() {
        let backend = backend(true);
        backend.allow_writes_while_busy();
        let api = wrap(Lamp, true, backend.clone());
        let dev = api.get_device("dev0").unwrap();
        // Scan started below the layer, with the lamp left off.
        let _running = backend.get_device("dev0").unwrap().scan_start().unwrap();

        assert!(matches!(dev.scan_start(), Err(ScanError::DeviceBusy { .. })));
        assert_eq!(lamp(&backend), Some(Value::Bool(false)));
        assert_eq!(backend.counters().value_writes, 2);
    }
}
