// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Type-erased adapter handles.
//
// Backends differ in their concrete item/option/session types. The registry
// holds a list of them, so this is the one place where dynamic dispatch is
// used. Everything stacked on top works on `AnyItem`/`AnyOption`/`AnySession`
// and is fully static.

use std::sync::Arc;

use scanwerk_core::error::Result;
use scanwerk_core::types::{
    CancelToken, DeviceDescriptor, DeviceLocations, ItemType, OptionDescriptor, ScanParameters,
    SetFlags, Value,
};

use crate::traits::{Api, Item, ScanOption, ScanSession};

// ---------------------------------------------------------------------------
// Object-safe mirrors of the adapter traits
// ---------------------------------------------------------------------------

trait DynApi: Send + Sync {
    fn name(&self) -> &str;
    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>>;
    fn get_device(&self, dev_id: &str) -> Result<AnyItem>;
}

trait DynItem: Send + Sync {
    fn name(&self) -> String;
    fn kind(&self) -> ItemType;
    fn children(&self) -> Result<Vec<AnyItem>>;
    fn options(&self) -> Result<Vec<AnyOption>>;
    fn scan_start(&self) -> Result<AnySession>;
    fn close(&self);
}

trait DynOption: Send + Sync {
    fn descriptor(&self) -> Result<OptionDescriptor>;
    fn value(&self) -> Result<Value>;
    fn set_value(&self, value: Value) -> Result<SetFlags>;
}

impl<A: Api> DynApi for A {
    fn name(&self) -> &str {
        Api::name(self)
    }

    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        Api::list_devices(self, locations)
    }

    fn get_device(&self, dev_id: &str) -> Result<AnyItem> {
        Api::get_device(self, dev_id).map(AnyItem::new)
    }
}

impl<I: Item> DynItem for I {
    fn name(&self) -> String {
        Item::name(self)
    }

    fn kind(&self) -> ItemType {
        Item::kind(self)
    }

    fn children(&self) -> Result<Vec<AnyItem>> {
        Ok(Item::children(self)?.into_iter().map(AnyItem::new).collect())
    }

    fn options(&self) -> Result<Vec<AnyOption>> {
        Ok(Item::options(self)?.into_iter().map(AnyOption::new).collect())
    }

    fn scan_start(&self) -> Result<AnySession> {
        Item::scan_start(self).map(AnySession::new)
    }

    fn close(&self) {
        Item::close(self)
    }
}

impl<O: ScanOption> DynOption for O {
    fn descriptor(&self) -> Result<OptionDescriptor> {
        ScanOption::descriptor(self)
    }

    fn value(&self) -> Result<Value> {
        ScanOption::value(self)
    }

    fn set_value(&self, value: Value) -> Result<SetFlags> {
        ScanOption::set_value(self, value)
    }
}

// ---------------------------------------------------------------------------
// Erased handles
// ---------------------------------------------------------------------------

/// Any backend adapter.
pub struct AnyBackend(Box<dyn DynApi>);

impl AnyBackend {
    pub fn new<A: Api>(api: A) -> Self {
        Self(Box::new(api))
    }
}

impl std::fmt::Debug for AnyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyBackend").field(&self.0.name()).finish()
    }
}

impl Api for AnyBackend {
    type Item = AnyItem;

    fn name(&self) -> &str {
        self.0.name()
    }

    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        self.0.list_devices(locations)
    }

    fn get_device(&self, dev_id: &str) -> Result<AnyItem> {
        self.0.get_device(dev_id)
    }
}

/// Any backend item.
#[derive(Clone)]
pub struct AnyItem(Arc<dyn DynItem>);

impl AnyItem {
    pub fn new<I: Item>(item: I) -> Self {
        Self(Arc::new(item))
    }
}

impl std::fmt::Debug for AnyItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyItem").field(&self.0.name()).finish()
    }
}

impl Item for AnyItem {
    type Opt = AnyOption;
    type Session = AnySession;

    fn name(&self) -> String {
        self.0.name()
    }

    fn kind(&self) -> ItemType {
        self.0.kind()
    }

    fn children(&self) -> Result<Vec<Self>> {
        self.0.children()
    }

    fn options(&self) -> Result<Vec<AnyOption>> {
        self.0.options()
    }

    fn scan_start(&self) -> Result<AnySession> {
        self.0.scan_start()
    }

    fn close(&self) {
        self.0.close()
    }
}

/// Any backend option.
#[derive(Clone)]
pub struct AnyOption(Arc<dyn DynOption>);

impl AnyOption {
    pub fn new<O: ScanOption>(opt: O) -> Self {
        Self(Arc::new(opt))
    }
}

impl ScanOption for AnyOption {
    fn descriptor(&self) -> Result<OptionDescriptor> {
        self.0.descriptor()
    }

    fn value(&self) -> Result<Value> {
        self.0.value()
    }

    fn set_value(&self, value: Value) -> Result<SetFlags> {
        self.0.set_value(value)
    }
}

/// Any backend scan session.
pub struct AnySession(Box<dyn ScanSession>);

impl AnySession {
    pub fn new<S: ScanSession>(session: S) -> Self {
        Self(Box::new(session))
    }
}

impl ScanSession for AnySession {
    fn scan_parameters(&mut self) -> Result<ScanParameters> {
        self.0.scan_parameters()
    }

    fn end_of_feed(&mut self) -> Result<bool> {
        self.0.end_of_feed()
    }

    fn end_of_page(&mut self) -> Result<bool> {
        self.0.end_of_page()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0.read(buf)
    }

    fn cancel(&mut self) {
        self.0.cancel()
    }

    fn cancel_token(&self) -> CancelToken {
        self.0.cancel_token()
    }
}
