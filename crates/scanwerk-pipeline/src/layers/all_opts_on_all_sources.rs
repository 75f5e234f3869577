// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.all_opts_on_all_sources: a source also lists the device options
// it does not have itself, so clients can configure everything from the
// source they scan with.

use std::collections::HashSet;

use scanwerk_backend::traits::{Item, ScanOption};
use scanwerk_core::error::Result;

use crate::layer::{Layer, LayerItem, LayerOption, passthrough};

#[derive(Debug, Clone, Copy, Default)]
pub struct AllOptsOnAllSources;

impl Layer for AllOptsOnAllSources {
    const NAME: &'static str = "normalizer.all_opts_on_all_sources";
    type DeviceState = ();
    type SessionState = ();

    fn options<I: Item>(
        &self,
        item: &LayerItem<Self, I>,
    ) -> Result<Vec<LayerOption<Self, I::Opt>>> {
        let mut options = passthrough::options(item)?;
        let node = item.node();
        let Some(root) = &node.root else {
            return Ok(options);
        };

        let mut names = HashSet::new();
        for opt in &options {
            names.insert(opt.inner().descriptor()?.name.to_ascii_lowercase());
        }

        let offset = options.len();
        let mut added = 0;
        for (index, opt) in root.options()?.into_iter().enumerate() {
            let name = opt.descriptor()?.name.to_ascii_lowercase();
            if names.insert(name) {
                options.push(item.wrap_option(opt, offset + index));
                added += 1;
            }
        }
        if added > 0 {
            item.ctx().log_debug(&format!(
                "{}: {added} device options added to the source",
                node.name
            ));
        }
        Ok(options)
    }
}
