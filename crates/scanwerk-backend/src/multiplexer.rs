// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend multiplexer.
//
// Presents several adapters as one. Device ids are prefixed with the name
// of the backend that reported them (`sane:epson2:libusb:001:004`) so that
// `get_device` can route the call back to the right adapter.

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::Logger;
use scanwerk_core::types::{DeviceDescriptor, DeviceLocations};

use crate::erased::{AnyBackend, AnyItem};
use crate::traits::Api;

const COMPONENT: &str = "multiplexer";

pub struct Multiplexer {
    backends: Vec<AnyBackend>,
    logger: Logger,
}

impl Multiplexer {
    pub fn new(backends: Vec<AnyBackend>, logger: Logger) -> Self {
        Self { backends, logger }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("backends", &self.backend_names())
            .finish()
    }
}

impl Api for Multiplexer {
    type Item = AnyItem;

    fn name(&self) -> &str {
        COMPONENT
    }

    /// Merge the listings of every backend.
    ///
    /// A failing backend is logged and skipped so that one broken driver
    /// does not hide the devices of the others. The call only fails when
    /// every backend failed.
    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        let mut devices = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;

        for backend in &self.backends {
            match backend.list_devices(locations) {
                Ok(found) => {
                    any_ok = true;
                    devices.extend(found.into_iter().map(|mut desc| {
                        desc.dev_id = format!("{}:{}", backend.name(), desc.dev_id);
                        desc.backend = backend.name().to_string();
                        desc
                    }));
                }
                Err(e) => {
                    self.logger.warning(
                        COMPONENT,
                        &format!("backend '{}' failed to list devices: {e}", backend.name()),
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(devices),
        }
    }

    fn get_device(&self, dev_id: &str) -> Result<AnyItem> {
        let Some((prefix, inner_id)) = dev_id.split_once(':') else {
            return Err(ScanError::not_found(format!("device '{dev_id}'")));
        };
        let backend = self
            .backends
            .iter()
            .find(|b| b.name() == prefix)
            .ok_or_else(|| ScanError::not_found(format!("backend '{prefix}' for device '{dev_id}'")))?;
        self.logger
            .debug(COMPONENT, &format!("opening '{inner_id}' on backend '{prefix}'"));
        backend.get_device(inner_id)
    }
}
