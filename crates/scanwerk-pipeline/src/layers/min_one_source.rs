// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.min_one_source: a device always has at least one source. When
// it has none, a `flatbed` source scanning through the device is added.

use scanwerk_backend::traits::Item;
use scanwerk_core::error::Result;
use scanwerk_core::names::SOURCE_FLATBED;
use scanwerk_core::types::ItemType;

use crate::layer::{Layer, LayerItem, Node, passthrough};

#[derive(Debug, Clone, Copy, Default)]
pub struct MinOneSource;

impl Layer for MinOneSource {
    const NAME: &'static str = "normalizer.min_one_source";
    type DeviceState = ();
    type SessionState = ();

    fn children<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<Vec<LayerItem<Self, I>>> {
        let children = passthrough::children(item)?;
        let node = item.node();
        if !node.is_root() || !children.is_empty() {
            return Ok(children);
        }
        item.ctx().log_info(&format!(
            "{}: no source reported, adding '{SOURCE_FLATBED}'",
            node.name
        ));
        Ok(vec![item.derive(Node::synthetic(
            node.inner.clone(),
            SOURCE_FLATBED,
            ItemType::Flatbed,
            None,
        ))?])
    }
}
