// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability set every backend adapter implements.
//
// The same four traits are implemented by native adapters, by every
// pipeline layer and by the dedicated-thread wrapper, so layers compose
// statically: each one is generic over the traits of the layer below it.
//
// Adapters translate native failures into `ScanError` before returning.
// Nothing above this boundary ever sees a transport error.

use scanwerk_core::error::Result;
use scanwerk_core::types::{
    CancelToken, DeviceDescriptor, DeviceLocations, ItemType, OptionDescriptor, ScanParameters,
    SetFlags, Value,
};

/// Entry point of a backend: enumeration and device opening.
pub trait Api: Send + Sync + 'static {
    type Item: Item;

    /// Short backend name, used to prefix device ids.
    fn name(&self) -> &str;

    /// Enumerate devices without opening them.
    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>>;

    /// Open a device by the id reported from `list_devices`.
    fn get_device(&self, dev_id: &str) -> Result<Self::Item>;
}

/// A device or one of its sources.
///
/// Items are shared handles: cloning yields another handle on the same
/// backend node, not a new node.
pub trait Item: Clone + Send + Sync + 'static {
    type Opt: ScanOption;
    type Session: ScanSession;

    fn name(&self) -> String;

    fn kind(&self) -> ItemType;

    /// Child sources in backend order. Empty for sources.
    fn children(&self) -> Result<Vec<Self>>;

    /// Options in presentation order.
    fn options(&self) -> Result<Vec<Self::Opt>>;

    fn scan_start(&self) -> Result<Self::Session>;

    /// Release backend resources. Idempotent. Closing a device invalidates
    /// its children.
    fn close(&self);
}

/// One option of an item.
pub trait ScanOption: Clone + Send + Sync + 'static {
    fn descriptor(&self) -> Result<OptionDescriptor>;

    fn value(&self) -> Result<Value>;

    fn set_value(&self, value: Value) -> Result<SetFlags>;
}

/// Page-oriented byte stream of one scan.
pub trait ScanSession: Send + 'static {
    /// Parameters of the page the next `read` belongs to.
    fn scan_parameters(&mut self) -> Result<ScanParameters>;

    fn end_of_feed(&mut self) -> Result<bool>;

    fn end_of_page(&mut self) -> Result<bool>;

    /// Read up to `buf.len()` bytes. Blocks until at least one byte is
    /// available. Returns 0 only at a page boundary.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Abort the scan. Idempotent. Must make a concurrent `read` return.
    fn cancel(&mut self);

    /// Token that cancels this session from another thread.
    fn cancel_token(&self) -> CancelToken;
}
