// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared test fixtures.

use std::sync::Once;

use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbOption, DumbPage, DumbSource};
use scanwerk_core::names::{OPT_MODE, OPT_RESOLUTION};
use scanwerk_core::types::{
    Constraint, ImageFormat, ItemType, OptionDescriptor, ScanParameters, Value, ValueType,
};

use crate::registry::Registry;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. `RUST_LOG` filters it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// `dev0` with a single `Flatbed` source carrying `resolution` {150, 200,
/// 300} and `mode`, scanning `page`.
pub fn flatbed_with_page(page: DumbPage) -> DumbDevice {
    DumbDevice::new("dev0", "Acme", "Acme Scan 3000").with_source(
        DumbSource::new("Flatbed", ItemType::Flatbed)
            .with_option(DumbOption::new(
                OptionDescriptor::new(OPT_RESOLUTION, ValueType::Int).with_constraint(
                    Constraint::List(vec![Value::Int(150), Value::Int(200), Value::Int(300)]),
                ),
                150,
            ))
            .with_option(DumbOption::new(
                OptionDescriptor::new(OPT_MODE, ValueType::String).with_constraint(
                    Constraint::List(vec![Value::from("Color"), Value::from("Gray")]),
                ),
                "Gray",
            ))
            .with_page(page),
    )
}

pub fn flatbed_device() -> DumbDevice {
    flatbed_with_page(DumbPage::new(ScanParameters::new(ImageFormat::RawRgb24, 8, 4)))
}

/// Safebet registry over a `dumb` backend holding only `device`.
pub fn registry_with(device: DumbDevice) -> (Registry, DumbBackend) {
    init_tracing();
    let backend = DumbBackend::new("dumb");
    backend.add_device(device);
    let registry = Registry::builder()
        .backend(backend.clone())
        .build()
        .unwrap();
    (registry, backend)
}
