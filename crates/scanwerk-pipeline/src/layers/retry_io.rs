// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.retry_io: bounded retry of transient backend I/O failures on
// enumeration, device opening and option access.

use scanwerk_backend::traits::{Api, Item, ScanOption};
use scanwerk_core::error::Result;
use scanwerk_core::types::{DeviceDescriptor, DeviceLocations, OptionDescriptor, SetFlags, Value};

use crate::layer::{Layer, LayerApi, LayerItem, LayerOption, passthrough};
use crate::retry::{RetryConfig, with_retry};

#[derive(Debug, Clone, Default)]
pub struct RetryIo {
    config: RetryConfig,
}

impl RetryIo {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Layer for RetryIo {
    const NAME: &'static str = "workaround.retry_io";
    type DeviceState = ();
    type SessionState = ();

    fn list_devices<A: Api>(
        &self,
        api: &LayerApi<Self, A>,
        locations: DeviceLocations,
    ) -> Result<Vec<DeviceDescriptor>> {
        with_retry(&self.config, &api.ctx().logger, "list_devices", || {
            api.inner().list_devices(locations)
        })
    }

    fn get_device<A: Api>(
        &self,
        api: &LayerApi<Self, A>,
        dev_id: &str,
    ) -> Result<LayerItem<Self, A::Item>> {
        let inner = with_retry(&self.config, &api.ctx().logger, "get_device", || {
            api.inner().get_device(dev_id)
        })?;
        api.open(inner)
    }

    fn children<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<Vec<LayerItem<Self, I>>> {
        with_retry(&self.config, &item.ctx().logger, "children", || {
            passthrough::children(item)
        })
    }

    fn options<I: Item>(
        &self,
        item: &LayerItem<Self, I>,
    ) -> Result<Vec<LayerOption<Self, I::Opt>>> {
        with_retry(&self.config, &item.ctx().logger, "options", || {
            passthrough::options(item)
        })
    }

    fn descriptor<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<OptionDescriptor> {
        with_retry(&self.config, &opt.ctx().logger, "descriptor", || {
            opt.inner().descriptor()
        })
    }

    fn value<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<Value> {
        with_retry(&self.config, &opt.ctx().logger, "get_value", || opt.inner().value())
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        with_retry(&self.config, &opt.ctx().logger, "set_value", || {
            opt.inner().set_value(value.clone())
        })
    }
}
