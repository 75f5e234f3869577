// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.source_nodes: devices that select their source through a
// `source` option instead of child nodes get one synthetic child per
// possible value.
//
// A synthetic source writes its value into the device's `source` option when
// its options are listed (some drivers insist on source being the first
// option set) and again right before scanning.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use scanwerk_backend::traits::{Item, ScanOption, ScanSession};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::names::OPT_SOURCE;
use scanwerk_core::types::{Constraint, ItemType, Value};

use crate::layer::{Layer, LayerCtx, LayerItem, LayerOption, LayerSession, Node, passthrough};
use crate::layers::find_option;

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceNodes;

/// Tracks whether a scan started through this device handle is running.
#[derive(Debug, Default)]
pub struct SourceNodesDevice {
    scanning: Mutex<Weak<()>>,
}

impl SourceNodesDevice {
    fn is_scanning(&self) -> bool {
        self.scanning
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }

    /// The returned token marks the device as scanning until it is dropped.
    fn start_scanning(&self) -> Arc<()> {
        let token = Arc::new(());
        *self.scanning.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&token);
        token
    }
}

#[derive(Debug, Default)]
pub struct SourceNodesSession {
    scanning: Option<Arc<()>>,
}

fn source_name(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write the value a synthetic node stands for into its device.
///
/// Returns the previous value when it had to be changed.
fn select_source<I: Item>(ctx: &LayerCtx<SourceNodes>, node: &Node<I>) -> Result<Option<Value>> {
    let Some(value) = &node.tag else {
        return Ok(None);
    };
    let Some((opt, _)) = find_option(node.root_item(), OPT_SOURCE)? else {
        return Err(ScanError::not_found(format!("option '{OPT_SOURCE}'")));
    };
    let previous = opt.value().ok();
    if previous.as_ref().is_some_and(|p| p.same_as(value)) {
        return Ok(None);
    }
    opt.set_value(value.clone())?;
    ctx.log_info(&format!("source set to '{}'", node.name));
    Ok(previous)
}

fn restore_source<I: Item>(ctx: &LayerCtx<SourceNodes>, node: &Node<I>, previous: Value) {
    let restored = find_option(node.root_item(), OPT_SOURCE)
        .and_then(|found| match found {
            Some((opt, _)) => opt.set_value(previous).map(|_| ()),
            None => Ok(()),
        });
    if let Err(e) = restored {
        ctx.log_warning(&format!("{}: failed to restore source: {e}", node.name));
    }
}

impl Layer for SourceNodes {
    const NAME: &'static str = "normalizer.source_nodes";
    type DeviceState = SourceNodesDevice;
    type SessionState = SourceNodesSession;

    fn children<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<Vec<LayerItem<Self, I>>> {
        let children = passthrough::children(item)?;
        let node = item.node();
        if !node.is_root() || !children.is_empty() {
            return Ok(children);
        }

        let Some((_, desc)) = find_option(&node.inner, OPT_SOURCE)? else {
            item.ctx()
                .log_debug(&format!("{}: no child nodes and no source option", node.name));
            return Ok(children);
        };
        let values = match desc.constraint {
            Constraint::List(values) if !values.is_empty() => values,
            other => {
                item.ctx().log_warning(&format!(
                    "{}: cannot build sources from constraint {other}",
                    node.name
                ));
                return Ok(children);
            }
        };

        item.ctx().log_info(&format!(
            "{}: generating {} sources from option '{}'",
            node.name,
            values.len(),
            desc.name
        ));
        values
            .into_iter()
            .map(|value| {
                item.derive(Node::synthetic(
                    node.inner.clone(),
                    source_name(&value),
                    ItemType::Unidentified,
                    Some(value),
                ))
            })
            .collect()
    }

    fn options<I: Item>(
        &self,
        item: &LayerItem<Self, I>,
    ) -> Result<Vec<LayerOption<Self, I::Opt>>> {
        // The source of a running scan is left alone.
        if item.node().synthetic && !item.device_state().is_scanning() {
            if let Err(e) = select_source(item.ctx(), item.node()) {
                item.ctx().log_warning(&format!(
                    "{}: failed to select source: {e}",
                    item.node().name
                ));
            }
        }
        passthrough::options(item)
    }

    fn scan_start<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<LayerSession<Self, I>> {
        let node = item.node();
        if item.device_state().is_scanning() {
            return Err(ScanError::DeviceBusy {
                node: node.name.clone(),
            });
        }
        let previous = if node.synthetic {
            select_source(item.ctx(), node)?
        } else {
            None
        };
        match passthrough::scan_start(item) {
            Ok(mut session) => {
                session.state.scanning = Some(item.device_state().start_scanning());
                Ok(session)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    restore_source(item.ctx(), node, previous);
                }
                Err(e)
            }
        }
    }

    fn end_of_feed<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        let ended = session.inner.end_of_feed()?;
        if ended {
            session.state.scanning = None;
        }
        Ok(ended)
    }

    fn cancel<I: Item>(&self, session: &mut LayerSession<Self, I>) {
        session.inner.cancel();
        session.state.scanning = None;
    }
}
