// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.clean_dev_descs: make vendor and model names presentable.

use scanwerk_backend::traits::Api;
use scanwerk_core::error::Result;
use scanwerk_core::types::{DeviceDescriptor, DeviceLocations};

use crate::layer::{Layer, LayerApi};

const SHORT_VENDORS: &[(&str, &str)] = &[("hewlett-packard", "HP"), ("hewlett packard", "HP")];

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanDevDescs;

/// Model without a leading copy of the vendor name.
fn strip_vendor<'a>(vendor: &str, model: &'a str) -> &'a str {
    let rest = match model.get(..vendor.len()) {
        Some(prefix) if !vendor.is_empty() && prefix.eq_ignore_ascii_case(vendor) => {
            &model[vendor.len()..]
        }
        _ => return model,
    };
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    if rest.is_empty() { model } else { rest }
}

/// Cleaned-up (vendor, model).
pub fn clean_names(vendor: &str, model: &str) -> (String, String) {
    let vendor = vendor.replace('_', " ");
    let model = model.replace('_', " ");
    let model = strip_vendor(&vendor, &model).to_string();
    let vendor = SHORT_VENDORS
        .iter()
        .find(|(long, _)| long.eq_ignore_ascii_case(&vendor))
        .map(|(_, short)| short.to_string())
        .unwrap_or(vendor);
    let model = strip_vendor(&vendor, &model).to_string();
    (vendor, model)
}

impl Layer for CleanDevDescs {
    const NAME: &'static str = "normalizer.clean_dev_descs";
    type DeviceState = ();
    type SessionState = ();

    fn list_devices<A: Api>(
        &self,
        api: &LayerApi<Self, A>,
        locations: DeviceLocations,
    ) -> Result<Vec<DeviceDescriptor>> {
        let mut devices = api.inner().list_devices(locations)?;
        for dev in &mut devices {
            let (vendor, model) = clean_names(&dev.vendor, &dev.model);
            if vendor != dev.vendor || model != dev.model {
                api.ctx().log_debug(&format!(
                    "{}: '{} / {}' -> '{vendor} / {model}'",
                    dev.dev_id, dev.vendor, dev.model
                ));
            }
            dev.vendor = vendor;
            dev.model = model;
        }
        Ok(devices)
    }
}
