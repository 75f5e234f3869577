// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory backend.
//
// Devices, sources, options and pages are described up front with the
// builder types below. The backend then behaves like a native driver would:
// one session per device, option writes refused while scanning, chunked
// reads with optional latency. Faults can be injected at runtime
// (transient I/O failures, disconnects, short reads) and every backend call
// is counted, which is what the pipeline tests rely on.

mod demo;
mod session;

pub use session::DumbSession;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::{
    Capabilities, DeviceDescriptor, DeviceLocations, ItemType, OptionDescriptor, ScanParameters,
    SetFlags, Value,
};

use crate::traits::{Api, Item, ScanOption};

/// Largest chunk a single `read` returns unless configured otherwise.
pub const DEFAULT_CHUNK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Builder types
// ---------------------------------------------------------------------------

/// An option and its initial value.
#[derive(Debug, Clone)]
pub struct DumbOption {
    desc: OptionDescriptor,
    value: Value,
    side_effects: Vec<(String, Value)>,
    reload_params: bool,
}

impl DumbOption {
    pub fn new(desc: OptionDescriptor, value: impl Into<Value>) -> Self {
        Self {
            desc,
            value: value.into(),
            side_effects: Vec::new(),
            reload_params: false,
        }
    }

    /// Writing this option also changes `other` on the same node and
    /// reports `OPTIONS_CHANGED`.
    pub fn with_side_effect(mut self, other: impl Into<String>, value: impl Into<Value>) -> Self {
        self.side_effects.push((other.into(), value.into()));
        self
    }

    /// Writing this option reports `RELOAD_PARAMS`.
    pub fn reloading_params(mut self) -> Self {
        self.reload_params = true;
        self
    }
}

#[derive(Debug, Clone)]
enum PageData {
    Pattern,
    Bytes(Arc<Vec<u8>>),
}

/// One page of image data.
#[derive(Debug, Clone)]
pub struct DumbPage {
    params: ScanParameters,
    data: PageData,
    deliver: u64,
}

impl DumbPage {
    /// Page filled with a repeating byte pattern.
    pub fn new(params: ScanParameters) -> Self {
        Self {
            params,
            data: PageData::Pattern,
            deliver: params.image_size,
        }
    }

    pub fn from_bytes(params: ScanParameters, bytes: Vec<u8>) -> Self {
        Self {
            params,
            deliver: bytes.len() as u64,
            data: PageData::Bytes(Arc::new(bytes)),
        }
    }

    /// Deliver `bytes` bytes regardless of what the parameters declare.
    pub fn delivering(mut self, bytes: u64) -> Self {
        self.deliver = bytes;
        self
    }

    pub fn params(&self) -> ScanParameters {
        self.params
    }

    /// Byte at `offset` in the delivered stream.
    pub fn byte_at(&self, offset: u64) -> u8 {
        match &self.data {
            PageData::Pattern => (offset % 251) as u8,
            PageData::Bytes(bytes) if bytes.is_empty() => 0,
            PageData::Bytes(bytes) => bytes[(offset % bytes.len() as u64) as usize],
        }
    }
}

/// A capture source below a device.
#[derive(Debug, Clone)]
pub struct DumbSource {
    name: String,
    kind: ItemType,
    options: Vec<DumbOption>,
    pages: Vec<DumbPage>,
    endless_feed: bool,
    chunk: usize,
    read_delay: Duration,
}

impl DumbSource {
    pub fn new(name: impl Into<String>, kind: ItemType) -> Self {
        Self {
            name: name.into(),
            kind,
            options: Vec::new(),
            pages: Vec::new(),
            endless_feed: false,
            chunk: DEFAULT_CHUNK,
            read_delay: Duration::ZERO,
        }
    }

    pub fn with_option(mut self, option: DumbOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_page(mut self, page: DumbPage) -> Self {
        self.pages.push(page);
        self
    }

    /// Never report the end of the feed: the pages repeat forever, the way
    /// many flatbed drivers behave.
    pub fn endless_feed(mut self) -> Self {
        self.endless_feed = true;
        self
    }

    pub fn chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    /// Latency of every `read`, interruptible by `cancel`.
    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }
}

/// A device: the root node plus its sources.
#[derive(Debug, Clone)]
pub struct DumbDevice {
    vendor: String,
    model: String,
    kind: String,
    local: bool,
    root: DumbSource,
    sources: Vec<DumbSource>,
}

impl DumbDevice {
    pub fn new(id: impl Into<String>, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            kind: "flatbed scanner".into(),
            local: true,
            root: DumbSource::new(id, ItemType::Device),
            sources: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Reported as a network device.
    pub fn remote(mut self) -> Self {
        self.local = false;
        self
    }

    pub fn with_option(mut self, option: DumbOption) -> Self {
        self.root = self.root.with_option(option);
        self
    }

    /// Page produced when the device node itself is scanned.
    pub fn with_page(mut self, page: DumbPage) -> Self {
        self.root = self.root.with_page(page);
        self
    }

    pub fn endless_feed(mut self) -> Self {
        self.root = self.root.endless_feed();
        self
    }

    pub fn chunk_size(mut self, chunk: usize) -> Self {
        self.root = self.root.chunk_size(chunk);
        self
    }

    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.root = self.root.read_delay(delay);
        self
    }

    pub fn with_source(mut self, source: DumbSource) -> Self {
        self.sources.push(source);
        self
    }
}

/// Snapshot of how often each backend entry point was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumbCounters {
    pub list_devices: usize,
    pub get_device: usize,
    pub descriptor_reads: usize,
    pub value_reads: usize,
    pub value_writes: usize,
    pub scan_starts: usize,
    pub reads: usize,
}

// ---------------------------------------------------------------------------
// Shared runtime state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    list_devices: AtomicUsize,
    get_device: AtomicUsize,
    descriptor_reads: AtomicUsize,
    value_reads: AtomicUsize,
    value_writes: AtomicUsize,
    scan_starts: AtomicUsize,
    reads: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug)]
struct BackendShared {
    name: String,
    devices: Mutex<Vec<Arc<DeviceShared>>>,
    faults: AtomicU32,
    writes_while_busy: AtomicBool,
    counters: Counters,
}

impl BackendShared {
    /// Consume one injected transient failure, if any is pending.
    fn transient(&self) -> Result<()> {
        let pending = self
            .faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match pending {
            Ok(_) => Err(ScanError::backend_io(&self.name, "injected transient failure")),
            Err(_) => Ok(()),
        }
    }
}

#[derive(Debug)]
struct NodeSpec {
    name: String,
    kind: ItemType,
    pages: Vec<DumbPage>,
    endless_feed: bool,
    chunk: usize,
    read_delay: Duration,
}

#[derive(Debug)]
struct DeviceState {
    /// Options of each node, node 0 being the device itself.
    options: Vec<Vec<DumbOption>>,
    busy: bool,
    disconnected: bool,
    fail_reads_after: Option<u64>,
}

#[derive(Debug)]
struct DeviceShared {
    desc: DeviceDescriptor,
    nodes: Vec<NodeSpec>,
    state: Mutex<DeviceState>,
}

impl DeviceShared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Handle on an in-memory backend. Clones share the same devices.
#[derive(Debug, Clone)]
pub struct DumbBackend {
    shared: Arc<BackendShared>,
}

impl DumbBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(BackendShared {
                name: name.into(),
                devices: Mutex::new(Vec::new()),
                faults: AtomicU32::new(0),
                writes_while_busy: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    fn devices(&self) -> MutexGuard<'_, Vec<Arc<DeviceShared>>> {
        self.shared
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, dev_id: &str) -> Option<Arc<DeviceShared>> {
        self.devices()
            .iter()
            .find(|d| d.desc.dev_id == dev_id)
            .cloned()
    }

    pub fn add_device(&self, device: DumbDevice) {
        let DumbDevice {
            vendor,
            model,
            kind,
            local,
            root,
            sources,
        } = device;
        let desc = DeviceDescriptor {
            dev_id: root.name.clone(),
            vendor,
            model,
            kind,
            backend: self.shared.name.clone(),
            local,
        };

        let mut nodes = Vec::with_capacity(sources.len() + 1);
        let mut options = Vec::with_capacity(sources.len() + 1);
        for source in std::iter::once(root).chain(sources) {
            options.push(source.options);
            nodes.push(NodeSpec {
                name: source.name,
                kind: source.kind,
                pages: source.pages,
                endless_feed: source.endless_feed,
                chunk: source.chunk,
                read_delay: source.read_delay,
            });
        }

        debug!(backend = %self.shared.name, dev_id = %desc.dev_id, "device added");
        self.devices().push(Arc::new(DeviceShared {
            desc,
            nodes,
            state: Mutex::new(DeviceState {
                options,
                busy: false,
                disconnected: false,
                fail_reads_after: None,
            }),
        }));
    }

    /// Make the next `count` backend calls fail with a transient I/O error.
    pub fn inject_io_failures(&self, count: u32) {
        self.shared.faults.store(count, Ordering::SeqCst);
    }

    /// Accept option writes while a device is scanning, like drivers that
    /// apply them to the next scan.
    pub fn allow_writes_while_busy(&self) {
        self.shared.writes_while_busy.store(true, Ordering::SeqCst);
    }

    /// Simulate unplugging a device. It disappears from listings and every
    /// open handle starts failing with `DeviceDisconnected`.
    pub fn disconnect(&self, dev_id: &str) {
        if let Some(device) = self.find(dev_id) {
            device.lock().disconnected = true;
        }
    }

    /// Disconnect the device once `bytes` bytes have been read from it.
    pub fn fail_reads_after(&self, dev_id: &str, bytes: u64) {
        if let Some(device) = self.find(dev_id) {
            device.lock().fail_reads_after = Some(bytes);
        }
    }

    /// Current backend-side value of an option, bypassing every layer.
    pub fn peek_value(&self, dev_id: &str, node: &str, option: &str) -> Option<Value> {
        let device = self.find(dev_id)?;
        let index = device.nodes.iter().position(|n| n.name == node)?;
        let state = device.lock();
        state.options[index]
            .iter()
            .find(|o| o.desc.name == option)
            .map(|o| o.value.clone())
    }

    pub fn is_busy(&self, dev_id: &str) -> bool {
        self.find(dev_id).is_some_and(|d| d.lock().busy)
    }

    pub fn counters(&self) -> DumbCounters {
        let c = &self.shared.counters;
        DumbCounters {
            list_devices: c.list_devices.load(Ordering::Relaxed),
            get_device: c.get_device.load(Ordering::Relaxed),
            descriptor_reads: c.descriptor_reads.load(Ordering::Relaxed),
            value_reads: c.value_reads.load(Ordering::Relaxed),
            value_writes: c.value_writes.load(Ordering::Relaxed),
            scan_starts: c.scan_starts.load(Ordering::Relaxed),
            reads: c.reads.load(Ordering::Relaxed),
        }
    }
}

impl Api for DumbBackend {
    type Item = DumbItem;

    fn name(&self) -> &str {
        &self.shared.name
    }

    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        bump(&self.shared.counters.list_devices);
        self.shared.transient()?;
        Ok(self
            .devices()
            .iter()
            .filter(|d| !d.lock().disconnected)
            .filter(|d| locations == DeviceLocations::Any || d.desc.local)
            .map(|d| d.desc.clone())
            .collect())
    }

    fn get_device(&self, dev_id: &str) -> Result<DumbItem> {
        bump(&self.shared.counters.get_device);
        self.shared.transient()?;
        let device = self
            .find(dev_id)
            .filter(|d| !d.lock().disconnected)
            .ok_or_else(|| ScanError::not_found(format!("device '{dev_id}'")))?;
        debug!(backend = %self.shared.name, dev_id, "device opened");
        Ok(DumbItem {
            backend: self.shared.clone(),
            device,
            closed: Arc::new(AtomicBool::new(false)),
            node: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Items and options
// ---------------------------------------------------------------------------

/// Handle on a device or source of the in-memory backend.
#[derive(Debug, Clone)]
pub struct DumbItem {
    backend: Arc<BackendShared>,
    device: Arc<DeviceShared>,
    /// Shared by a device handle and every child obtained from it.
    closed: Arc<AtomicBool>,
    node: usize,
}

impl DumbItem {
    fn spec(&self) -> &NodeSpec {
        &self.device.nodes[self.node]
    }

    fn path(&self) -> String {
        if self.node == 0 {
            format!("{}:{}", self.backend.name, self.device.desc.dev_id)
        } else {
            format!(
                "{}:{}/{}",
                self.backend.name,
                self.device.desc.dev_id,
                self.spec().name
            )
        }
    }

    /// Fail if the handle was closed or the device went away.
    fn check(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScanError::Closed { node: self.path() });
        }
        if self.device.lock().disconnected {
            return Err(ScanError::disconnected(self.path(), "device unplugged"));
        }
        Ok(())
    }
}

impl Item for DumbItem {
    type Opt = DumbOpt;
    type Session = DumbSession;

    fn name(&self) -> String {
        self.spec().name.clone()
    }

    fn kind(&self) -> ItemType {
        self.spec().kind
    }

    fn children(&self) -> Result<Vec<Self>> {
        self.check()?;
        self.backend.transient()?;
        if self.node != 0 {
            return Ok(Vec::new());
        }
        Ok((1..self.device.nodes.len())
            .map(|node| Self {
                node,
                ..self.clone()
            })
            .collect())
    }

    fn options(&self) -> Result<Vec<DumbOpt>> {
        self.check()?;
        self.backend.transient()?;
        let count = self.device.lock().options[self.node].len();
        Ok((0..count)
            .map(|index| DumbOpt {
                item: self.clone(),
                index,
            })
            .collect())
    }

    fn scan_start(&self) -> Result<DumbSession> {
        self.check()?;
        bump(&self.backend.counters.scan_starts);
        {
            let mut state = self.device.lock();
            if state.busy {
                return Err(ScanError::DeviceBusy { node: self.path() });
            }
            state.busy = true;
        }
        debug!(node = %self.path(), "scan started");
        Ok(DumbSession::new(
            self.backend.clone(),
            self.device.clone(),
            self.node,
            self.path(),
        ))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(node = %self.path(), "handle closed");
        }
    }
}

/// Handle on one option of a [`DumbItem`].
#[derive(Debug, Clone)]
pub struct DumbOpt {
    item: DumbItem,
    index: usize,
}

impl DumbOpt {
    fn with<T>(&self, f: impl FnOnce(&DumbOption) -> T) -> T {
        let state = self.item.device.lock();
        f(&state.options[self.item.node][self.index])
    }
}

impl ScanOption for DumbOpt {
    fn descriptor(&self) -> Result<OptionDescriptor> {
        self.item.check()?;
        bump(&self.item.backend.counters.descriptor_reads);
        self.item.backend.transient()?;
        Ok(self.with(|o| o.desc.clone()))
    }

    fn value(&self) -> Result<Value> {
        self.item.check()?;
        bump(&self.item.backend.counters.value_reads);
        self.item.backend.transient()?;
        self.with(|o| {
            if o.desc.is_active() && o.desc.capabilities.contains(Capabilities::READABLE) {
                Ok(o.value.clone())
            } else {
                Err(ScanError::AccessDenied {
                    option: o.desc.name.clone(),
                })
            }
        })
    }

    fn set_value(&self, value: Value) -> Result<SetFlags> {
        self.item.check()?;
        bump(&self.item.backend.counters.value_writes);
        self.item.backend.transient()?;

        let mut state = self.item.device.lock();
        if state.busy && !self.item.backend.writes_while_busy.load(Ordering::SeqCst) {
            return Err(ScanError::DeviceBusy {
                node: self.item.path(),
            });
        }
        let options = &mut state.options[self.item.node];
        let opt = &mut options[self.index];
        if !opt.desc.is_writable() {
            return Err(ScanError::Inactive {
                option: opt.desc.name.clone(),
            });
        }
        let value = opt.desc.validate(value)?;
        opt.value = value;

        let mut flags = SetFlags::empty();
        if opt.reload_params {
            flags |= SetFlags::RELOAD_PARAMS;
        }
        let side_effects = opt.side_effects.clone();
        for (name, new_value) in side_effects {
            if let Some(other) = options.iter_mut().find(|o| o.desc.name == name) {
                other.value = new_value;
                flags |= SetFlags::OPTIONS_CHANGED;
            }
        }
        Ok(flags)
    }
}
