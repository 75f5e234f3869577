// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Demonstration device set, with the quirks real drivers tend to have.

use scanwerk_core::names::{OPT_BR_X, OPT_BR_Y, OPT_LAMP_SWITCH, OPT_PREVIEW, OPT_TL_X, OPT_TL_Y};
use scanwerk_core::types::{
    Capabilities, Constraint, ImageFormat, ItemType, OptionDescriptor, ScanParameters, Unit,
    Value, ValueType,
};

use super::{DumbBackend, DumbDevice, DumbOption, DumbPage, DumbSource};

fn list(values: &[&str]) -> Constraint {
    Constraint::List(values.iter().map(|v| Value::from(*v)).collect())
}

fn area(name: &str, max: f64, value: f64) -> DumbOption {
    DumbOption::new(
        OptionDescriptor::new(name, ValueType::Double)
            .with_unit(Unit::Millimeter)
            .with_constraint(Constraint::Range {
                min: 0.0,
                max,
                interval: 0.0,
            }),
        value,
    )
}

fn bool_opt(name: &str, value: bool) -> DumbOption {
    DumbOption::new(OptionDescriptor::new(name, ValueType::Bool), value)
}

fn scan_area(device: DumbDevice) -> DumbDevice {
    device
        .with_option(area(OPT_TL_X, 215.9, 10.0))
        .with_option(area(OPT_TL_Y, 297.0, 10.0))
        .with_option(area(OPT_BR_X, 215.9, 100.0))
        .with_option(area(OPT_BR_Y, 297.0, 100.0))
}

impl DumbBackend {
    /// Backend named `dumb` populated with three devices:
    ///
    /// - `flatbed0`: flatbed-only, no source nodes, vendor-specific option
    ///   names and values, grayscale output, never reports end of feed.
    /// - `mfp0`: flatbed plus feeder exposed as WIA-style child paths.
    /// - `net0`: network device whose sources are only a `doc-source` option.
    pub fn demo() -> Self {
        let backend = Self::new("dumb");

        backend.add_device(scan_area(
            DumbDevice::new("flatbed0", "Hewlett-Packard", "Hewlett-Packard_ScanJet_4850")
                .with_option(
                    DumbOption::new(
                        OptionDescriptor::new("scan-resolution", ValueType::Int)
                            .with_unit(Unit::Dpi)
                            .with_constraint(Constraint::Range {
                                min: 75.0,
                                max: 1200.0,
                                interval: 1.0,
                            }),
                        300,
                    )
                    .reloading_params(),
                )
                .with_option(DumbOption::new(
                    OptionDescriptor::new("mode", ValueType::String)
                        .with_constraint(list(&["24bit Color", "True Gray", "Black & White"])),
                    "True Gray",
                ))
                .with_option(bool_opt(OPT_PREVIEW, true))
                .with_option(bool_opt(OPT_LAMP_SWITCH, false))
                .with_page(DumbPage::new(ScanParameters::new(
                    ImageFormat::Grayscale8,
                    850,
                    1169,
                )))
                .endless_feed(),
        ));

        let resolution = || {
            DumbOption::new(
                OptionDescriptor::new("resolution", ValueType::Int)
                    .with_unit(Unit::Dpi)
                    .with_constraint(Constraint::List(vec![
                        150.into(),
                        200.into(),
                        300.into(),
                    ])),
                150,
            )
        };
        let mode = || {
            DumbOption::new(
                OptionDescriptor::new("mode", ValueType::String)
                    .with_constraint(list(&["Color", "Gray", "LineArt"])),
                "Color",
            )
        };
        backend.add_device(
            DumbDevice::new("mfp0", "Brother", "Brother MFC-L2710DW")
                .kind("all-in-one")
                .with_option(DumbOption::new(
                    OptionDescriptor::new("firmware", ValueType::String)
                        .with_capabilities(Capabilities::READABLE),
                    "1.12",
                ))
                .with_source(
                    DumbSource::new("0000\\Root\\Flatbed", ItemType::Unidentified)
                        .with_option(resolution())
                        .with_option(mode())
                        .with_page(DumbPage::new(ScanParameters::new(
                            ImageFormat::RawRgb24,
                            2550,
                            3509,
                        )))
                        .endless_feed(),
                )
                .with_source(
                    DumbSource::new("0000\\Root\\Feeder", ItemType::Unidentified)
                        .with_option(resolution())
                        .with_option(mode())
                        .with_page(DumbPage::new(ScanParameters::new(ImageFormat::Bw1, 1700, 2338)))
                        .with_page(DumbPage::new(ScanParameters::new(ImageFormat::Bw1, 1700, 2338)))
                        .with_page(DumbPage::new(ScanParameters::new(ImageFormat::Bw1, 1700, 2338))),
                ),
        );

        backend.add_device(scan_area(
            DumbDevice::new("net0", "Canon", "PIXMA G3010")
                .kind("all-in-one")
                .remote()
                .with_option(DumbOption::new(
                    OptionDescriptor::new("doc-source", ValueType::String)
                        .with_constraint(list(&["Flatbed", "ADF"])),
                    "Flatbed",
                ))
                .with_option(DumbOption::new(
                    OptionDescriptor::new("mode", ValueType::String)
                        .with_constraint(list(&["Couleur", "Gris", "Noir et blanc"])),
                    "Couleur",
                ))
                .with_page(DumbPage::new(ScanParameters::new(ImageFormat::RawRgb24, 1275, 1754)))
                .with_page(DumbPage::new(ScanParameters::new(ImageFormat::RawRgb24, 1275, 1754))),
        ));

        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Api, Item};
    use scanwerk_core::types::DeviceLocations;

    #[test]
    fn demo_devices_are_listed() {
        let backend = DumbBackend::demo();
        assert_eq!(backend.list_devices(DeviceLocations::Any).unwrap().len(), 3);
        assert_eq!(backend.list_devices(DeviceLocations::LocalOnly).unwrap().len(), 2);
    }

    #[test]
    fn flatbed_only_device_has_no_children() {
        let backend = DumbBackend::demo();
        let dev = backend.get_device("flatbed0").unwrap();
        assert!(dev.children().unwrap().is_empty());
        assert!(!dev.options().unwrap().is_empty());
    }
}
