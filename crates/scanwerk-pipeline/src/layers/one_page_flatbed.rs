// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.one_page_flatbed: many drivers never report the end of the feed
// on a flatbed and would happily scan the same page forever. A flatbed feed
// ends with its first page.

use scanwerk_backend::traits::{Item, ScanSession};
use scanwerk_core::error::Result;
use scanwerk_core::types::ItemType;

use crate::layer::{Layer, LayerSession};

#[derive(Debug, Clone, Copy, Default)]
pub struct OnePageFlatbed;

#[derive(Debug, Default)]
pub struct OnePageSession {
    warned: bool,
}

impl Layer for OnePageFlatbed {
    const NAME: &'static str = "workaround.one_page_flatbed";
    type DeviceState = ();
    type SessionState = OnePageSession;

    fn end_of_feed<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        match session.node.kind {
            ItemType::Flatbed => {
                if session.inner.end_of_page()? {
                    return Ok(true);
                }
            }
            ItemType::Adf => {}
            ItemType::Device | ItemType::Unidentified => {
                if !session.state.warned {
                    session.state.warned = true;
                    session.ctx.log_warning(&format!(
                        "unexpected source type {:?} ({}), trusting the driver for the end of feed",
                        session.node.kind, session.node.name
                    ));
                }
            }
        }
        session.inner.end_of_feed()
    }
}
