// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Generic layer decorator.
//
// A layer is a zero-or-small-sized type implementing `Layer`. Wrapping an
// adapter in `LayerApi<L, A>` yields another adapter whose items, options
// and sessions are `LayerItem`, `LayerOption` and `LayerSession`. Every
// call goes through the matching `Layer` hook when the layer is enabled and
// straight to the wrapped object when it is not. All hooks default to the
// pass-through behaviour in [`passthrough`], so a layer only overrides the
// calls it actually alters.

use std::sync::Arc;

use scanwerk_backend::traits::{Api, Item, ScanOption, ScanSession};
use scanwerk_core::error::Result;
use scanwerk_core::logger::Logger;
use scanwerk_core::types::{
    CancelToken, DeviceDescriptor, DeviceLocations, ItemType, OptionDescriptor, ScanParameters,
    SetFlags, Value,
};

/// One normalization or workaround.
pub trait Layer: Send + Sync + Sized + 'static {
    /// Configuration flag of the layer, e.g. `normalizer.raw24`.
    const NAME: &'static str;

    /// State shared by every node obtained from one `get_device` call.
    type DeviceState: Default + Send + Sync + 'static;

    /// State of one scan session.
    type SessionState: Default + Send + 'static;

    fn list_devices<A: Api>(
        &self,
        api: &LayerApi<Self, A>,
        locations: DeviceLocations,
    ) -> Result<Vec<DeviceDescriptor>> {
        passthrough::list_devices(api, locations)
    }

    fn get_device<A: Api>(
        &self,
        api: &LayerApi<Self, A>,
        dev_id: &str,
    ) -> Result<LayerItem<Self, A::Item>> {
        passthrough::get_device(api, dev_id)
    }

    /// Called once on every node this layer hands out, before anyone above
    /// sees it.
    fn filter_node<I: Item>(
        &self,
        _node: &mut Node<I>,
        _device: &Self::DeviceState,
        _logger: &Logger,
    ) -> Result<()> {
        Ok(())
    }

    fn children<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<Vec<LayerItem<Self, I>>> {
        passthrough::children(item)
    }

    fn options<I: Item>(
        &self,
        item: &LayerItem<Self, I>,
    ) -> Result<Vec<LayerOption<Self, I::Opt>>> {
        passthrough::options(item)
    }

    fn scan_start<I: Item>(&self, item: &LayerItem<Self, I>) -> Result<LayerSession<Self, I>> {
        passthrough::scan_start(item)
    }

    fn close<I: Item>(&self, item: &LayerItem<Self, I>) {
        passthrough::close(item)
    }

    fn descriptor<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<OptionDescriptor> {
        opt.inner.descriptor()
    }

    fn value<O: ScanOption>(&self, opt: &LayerOption<Self, O>) -> Result<Value> {
        opt.inner.value()
    }

    fn set_value<O: ScanOption>(&self, opt: &LayerOption<Self, O>, value: Value) -> Result<SetFlags> {
        opt.inner.set_value(value)
    }

    fn scan_parameters<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<ScanParameters> {
        session.inner.scan_parameters()
    }

    fn end_of_feed<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        session.inner.end_of_feed()
    }

    fn end_of_page<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        session.inner.end_of_page()
    }

    fn read<I: Item>(&self, session: &mut LayerSession<Self, I>, buf: &mut [u8]) -> Result<usize> {
        session.inner.read(buf)
    }

    fn cancel<I: Item>(&self, session: &mut LayerSession<Self, I>) {
        session.inner.cancel()
    }
}

/// A layer instance with its on/off switch and logger.
pub struct LayerCtx<L> {
    pub layer: L,
    pub enabled: bool,
    pub logger: Logger,
}

impl<L: Layer> LayerCtx<L> {
    pub fn log_info(&self, message: &str) {
        self.logger.info(L::NAME, message);
    }

    pub fn log_warning(&self, message: &str) {
        self.logger.warning(L::NAME, message);
    }

    pub fn log_debug(&self, message: &str) {
        self.logger.debug(L::NAME, message);
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A device or source as seen by one layer.
#[derive(Debug, Clone)]
pub struct Node<I> {
    /// Item of the layer below that receives the calls.
    pub inner: I,
    /// Device this node belongs to, `None` for the device itself.
    pub root: Option<I>,
    pub name: String,
    pub kind: ItemType,
    /// Created by a layer rather than reported by the backend. Synthetic
    /// sources scan through their device and own no backend handle.
    pub synthetic: bool,
    /// Layer-specific payload of a synthetic node.
    pub tag: Option<Value>,
}

impl<I: Item> Node<I> {
    pub fn wrap(inner: I, root: Option<I>) -> Self {
        Self {
            name: inner.name(),
            kind: inner.kind(),
            inner,
            root,
            synthetic: false,
            tag: None,
        }
    }

    /// Source backed by its device.
    pub fn synthetic(root: I, name: impl Into<String>, kind: ItemType, tag: Option<Value>) -> Self {
        Self {
            inner: root.clone(),
            root: Some(root),
            name: name.into(),
            kind,
            synthetic: true,
            tag,
        }
    }

    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }

    /// The device of this node (the node itself for a device).
    pub fn root_item(&self) -> &I {
        self.root.as_ref().unwrap_or(&self.inner)
    }
}

// ---------------------------------------------------------------------------
// Api
// ---------------------------------------------------------------------------

/// An adapter decorated by one layer.
pub struct LayerApi<L: Layer, A: Api> {
    pub(crate) ctx: Arc<LayerCtx<L>>,
    pub(crate) inner: A,
}

impl<L: Layer, A: Api> LayerApi<L, A> {
    pub fn new(layer: L, enabled: bool, logger: Logger, inner: A) -> Self {
        Self {
            ctx: Arc::new(LayerCtx {
                layer,
                enabled,
                logger,
            }),
            inner,
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.enabled
    }

    pub fn ctx(&self) -> &LayerCtx<L> {
        &self.ctx
    }

    /// Wrap a freshly opened device of the layer below.
    pub fn open(&self, inner: A::Item) -> Result<LayerItem<L, A::Item>> {
        let mut node = Node::wrap(inner, None);
        let device = Arc::new(L::DeviceState::default());
        if self.ctx.enabled {
            self.ctx
                .layer
                .filter_node(&mut node, &device, &self.ctx.logger)?;
        }
        Ok(LayerItem {
            ctx: self.ctx.clone(),
            device,
            node: Arc::new(node),
        })
    }
}

impl<L: Layer, A: Api> Api for LayerApi<L, A> {
    type Item = LayerItem<L, A::Item>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        if self.ctx.enabled {
            self.ctx.layer.list_devices(self, locations)
        } else {
            passthrough::list_devices(self, locations)
        }
    }

    fn get_device(&self, dev_id: &str) -> Result<Self::Item> {
        if self.ctx.enabled {
            self.ctx.layer.get_device(self, dev_id)
        } else {
            passthrough::get_device(self, dev_id)
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A node decorated by one layer.
pub struct LayerItem<L: Layer, I: Item> {
    pub(crate) ctx: Arc<LayerCtx<L>>,
    pub(crate) device: Arc<L::DeviceState>,
    pub(crate) node: Arc<Node<I>>,
}

impl<L: Layer, I: Item> Clone for LayerItem<L, I> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            device: self.device.clone(),
            node: self.node.clone(),
        }
    }
}

impl<L: Layer, I: Item> LayerItem<L, I> {
    pub fn node(&self) -> &Node<I> {
        &self.node
    }

    pub fn device_state(&self) -> &L::DeviceState {
        &self.device
    }

    pub fn ctx(&self) -> &LayerCtx<L> {
        &self.ctx
    }

    /// Another node of the same device.
    pub fn derive(&self, mut node: Node<I>) -> Result<Self> {
        if self.ctx.enabled {
            self.ctx
                .layer
                .filter_node(&mut node, &self.device, &self.ctx.logger)?;
        }
        Ok(Self {
            ctx: self.ctx.clone(),
            device: self.device.clone(),
            node: Arc::new(node),
        })
    }

    pub fn wrap_option(&self, inner: I::Opt, index: usize) -> LayerOption<L, I::Opt> {
        LayerOption {
            ctx: self.ctx.clone(),
            device: self.device.clone(),
            node: Arc::from(self.node.name.as_str()),
            index,
            inner,
        }
    }

    pub fn wrap_session(&self, inner: I::Session) -> LayerSession<L, I> {
        LayerSession {
            ctx: self.ctx.clone(),
            device: self.device.clone(),
            node: self.node.clone(),
            inner,
            state: L::SessionState::default(),
        }
    }
}

impl<L: Layer, I: Item> Item for LayerItem<L, I> {
    type Opt = LayerOption<L, I::Opt>;
    type Session = LayerSession<L, I>;

    fn name(&self) -> String {
        self.node.name.clone()
    }

    fn kind(&self) -> ItemType {
        self.node.kind
    }

    fn children(&self) -> Result<Vec<Self>> {
        if self.ctx.enabled {
            self.ctx.layer.children(self)
        } else {
            passthrough::children(self)
        }
    }

    fn options(&self) -> Result<Vec<Self::Opt>> {
        if self.ctx.enabled {
            self.ctx.layer.options(self)
        } else {
            passthrough::options(self)
        }
    }

    fn scan_start(&self) -> Result<Self::Session> {
        if self.ctx.enabled {
            self.ctx.layer.scan_start(self)
        } else {
            passthrough::scan_start(self)
        }
    }

    fn close(&self) {
        if self.ctx.enabled {
            self.ctx.layer.close(self)
        } else {
            passthrough::close(self)
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// An option decorated by one layer.
pub struct LayerOption<L: Layer, O: ScanOption> {
    pub(crate) ctx: Arc<LayerCtx<L>>,
    pub(crate) device: Arc<L::DeviceState>,
    /// Name of the node the option was listed on.
    pub(crate) node: Arc<str>,
    /// Position in that node's option list.
    pub(crate) index: usize,
    pub(crate) inner: O,
}

impl<L: Layer, O: ScanOption> Clone for LayerOption<L, O> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            device: self.device.clone(),
            node: self.node.clone(),
            index: self.index,
            inner: self.inner.clone(),
        }
    }
}

impl<L: Layer, O: ScanOption> LayerOption<L, O> {
    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn node_name(&self) -> &str {
        &self.node
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn device_state(&self) -> &L::DeviceState {
        &self.device
    }

    pub fn ctx(&self) -> &LayerCtx<L> {
        &self.ctx
    }
}

impl<L: Layer, O: ScanOption> ScanOption for LayerOption<L, O> {
    fn descriptor(&self) -> Result<OptionDescriptor> {
        if self.ctx.enabled {
            self.ctx.layer.descriptor(self)
        } else {
            self.inner.descriptor()
        }
    }

    fn value(&self) -> Result<Value> {
        if self.ctx.enabled {
            self.ctx.layer.value(self)
        } else {
            self.inner.value()
        }
    }

    fn set_value(&self, value: Value) -> Result<SetFlags> {
        if self.ctx.enabled {
            self.ctx.layer.set_value(self, value)
        } else {
            self.inner.set_value(value)
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A scan session decorated by one layer.
pub struct LayerSession<L: Layer, I: Item> {
    pub(crate) ctx: Arc<LayerCtx<L>>,
    pub(crate) device: Arc<L::DeviceState>,
    /// Node the scan was started on.
    pub(crate) node: Arc<Node<I>>,
    pub(crate) inner: I::Session,
    pub(crate) state: L::SessionState,
}

impl<L: Layer, I: Item> LayerSession<L, I> {
    pub fn node(&self) -> &Node<I> {
        &self.node
    }
}

impl<L: Layer, I: Item> ScanSession for LayerSession<L, I> {
    fn scan_parameters(&mut self) -> Result<ScanParameters> {
        let ctx = self.ctx.clone();
        if ctx.enabled {
            ctx.layer.scan_parameters(self)
        } else {
            self.inner.scan_parameters()
        }
    }

    fn end_of_feed(&mut self) -> Result<bool> {
        let ctx = self.ctx.clone();
        if ctx.enabled {
            ctx.layer.end_of_feed(self)
        } else {
            self.inner.end_of_feed()
        }
    }

    fn end_of_page(&mut self) -> Result<bool> {
        let ctx = self.ctx.clone();
        if ctx.enabled {
            ctx.layer.end_of_page(self)
        } else {
            self.inner.end_of_page()
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let ctx = self.ctx.clone();
        if ctx.enabled {
            ctx.layer.read(self, buf)
        } else {
            self.inner.read(buf)
        }
    }

    fn cancel(&mut self) {
        let ctx = self.ctx.clone();
        if ctx.enabled {
            ctx.layer.cancel(self)
        } else {
            self.inner.cancel()
        }
    }

    fn cancel_token(&self) -> CancelToken {
        self.inner.cancel_token()
    }
}

// ---------------------------------------------------------------------------
// Pass-through behaviour
// ---------------------------------------------------------------------------

/// What a disabled layer does, and what an enabled one does for every call
/// it does not override.
pub mod passthrough {
    use super::*;

    pub fn list_devices<L: Layer, A: Api>(
        api: &LayerApi<L, A>,
        locations: DeviceLocations,
    ) -> Result<Vec<DeviceDescriptor>> {
        api.inner.list_devices(locations)
    }

    pub fn get_device<L: Layer, A: Api>(
        api: &LayerApi<L, A>,
        dev_id: &str,
    ) -> Result<LayerItem<L, A::Item>> {
        let inner = api.inner.get_device(dev_id)?;
        api.open(inner)
    }

    pub fn children<L: Layer, I: Item>(item: &LayerItem<L, I>) -> Result<Vec<LayerItem<L, I>>> {
        if item.node.synthetic {
            return Ok(Vec::new());
        }
        let root = item.node.root_item().clone();
        item.node
            .inner
            .children()?
            .into_iter()
            .map(|child| item.derive(Node::wrap(child, Some(root.clone()))))
            .collect()
    }

    pub fn options<L: Layer, I: Item>(
        item: &LayerItem<L, I>,
    ) -> Result<Vec<LayerOption<L, I::Opt>>> {
        Ok(item
            .node
            .inner
            .options()?
            .into_iter()
            .enumerate()
            .map(|(index, opt)| item.wrap_option(opt, index))
            .collect())
    }

    pub fn scan_start<L: Layer, I: Item>(item: &LayerItem<L, I>) -> Result<LayerSession<L, I>> {
        let inner = item.node.inner.scan_start()?;
        Ok(item.wrap_session(inner))
    }

    pub fn close<L: Layer, I: Item>(item: &LayerItem<L, I>) {
        if !item.node.synthetic {
            item.node.inner.close();
        }
    }
}
