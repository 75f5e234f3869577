// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.opt_names: vendor-specific option names to the usual ones.

use scanwerk_backend::traits::ScanOption;
use scanwerk_core::error::Result;
use scanwerk_core::names::{OPT_RESOLUTION, OPT_SOURCE};
use scanwerk_core::types::OptionDescriptor;

use crate::layer::{Layer, LayerOption};

/// (vendor name, canonical name)
const RENAMES: &[(&str, &str)] = &[
    // Lexmark
    ("scan-resolution", OPT_RESOLUTION),
    // Samsung
    ("doc-source", OPT_SOURCE),
];

pub fn canonical_name(name: &str) -> Option<&'static str> {
    RENAMES
        .iter()
        .find(|(vendor, _)| vendor.eq_ignore_ascii_case(name))
        .map(|(_, canonical)| *canonical)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OptNames;

impl Layer for OptNames {
    const NAME: &'static str = "workaround.opt_names";
    type DeviceState = ();
    type SessionState = ();

    fn descriptor<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<OptionDescriptor> {
        let mut desc = opt.inner().descriptor()?;
        if let Some(canonical) = canonical_name(&desc.name) {
            opt.ctx()
                .log_debug(&format!("renaming option '{}' to '{canonical}'", desc.name));
            desc.name = canonical.to_string();
        }
        Ok(desc)
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

    #[rstest]
    #[case("scan-resolution", Some(OPT_RESOLUTION))]
    #[case("Doc-Source", Some(OPT_SOURCE))]
    #[case("resolution", None)]
    #[case("mode", None)]
    fn vendor_names(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(canonical_name(name), expected);
    }

    #[rstest]
    #[case(true, OPT_SOURCE)]
    #[case(false, "doc-source")]
    fn descriptor_is_renamed(#[case] enabled: bool, #[case] expected: &str) {
        let backend = DumbBackend::new("dumb");
        backend.add_device(DumbDevice::new("dev0", "Acme", "Scan").with_option(DumbOption::new(
            OptionDescriptor::new("doc-source", ValueType::String),
            "Flatbed",
        )));
        let api = wrap(OptNames, enabled, backend);
        let opt = api.get_device("dev0").unwrap().options().unwrap().remove(0);
        assert_eq!(opt.descriptor().unwrap().name, expected);
    }
}
