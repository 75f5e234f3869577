// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability nodes: devices and the sources below them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use scanwerk_backend::traits::Item;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::Logger;
use scanwerk_core::types::{ItemType, NodeId};

use crate::option::OptionHandle;
use crate::session::Session;
use crate::StackItem;

const COMPONENT: &str = "node";

fn list_options(item: &StackItem) -> Result<Vec<OptionHandle>> {
    item.options()?.into_iter().map(OptionHandle::new).collect()
}

fn find_option(item: &StackItem, node: &str, name: &str) -> Result<OptionHandle> {
    list_options(item)?
        .into_iter()
        .find(|opt| opt.name() == name)
        .ok_or_else(|| ScanError::not_found(format!("option '{name}' on {node}")))
}

/// Backend handle of an opened device, shared by the device, its sources
/// and their sessions. The device is closed when the last of them is gone.
pub(crate) struct OpenDevice {
    id: String,
    item: StackItem,
    closed: AtomicBool,
}

impl OpenDevice {
    pub(crate) fn new(id: String, item: StackItem) -> Self {
        Self {
            id,
            item,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns whether this call closed it.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.item.close();
        true
    }
}

impl Drop for OpenDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// An opened scanner.
///
/// Closing the device invalidates every source obtained from it. The device
/// is also closed once the handle, every source obtained from it and their
/// sessions have been dropped.
pub struct Device {
    handle: Arc<OpenDevice>,
    node_id: NodeId,
    logger: Logger,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("id", &self.handle.id).finish()
    }
}

impl Device {
    pub(crate) fn new(handle: Arc<OpenDevice>, logger: Logger) -> Self {
        Self {
            handle,
            node_id: NodeId::new(),
            logger,
        }
    }

    fn item(&self) -> &StackItem {
        &self.handle.item
    }

    /// Id this device was opened with.
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// Identity of this handle. A device opened twice gets two ids.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn name(&self) -> String {
        self.item().name()
    }

    pub fn kind(&self) -> ItemType {
        self.item().kind()
    }

    pub fn options(&self) -> Result<Vec<OptionHandle>> {
        list_options(self.item())
    }

    pub fn option(&self, name: &str) -> Result<OptionHandle> {
        find_option(self.item(), self.id(), name)
    }

    /// Sources in the order the backend reported them.
    pub fn children(&self) -> Result<Vec<Source>> {
        Ok(self
            .item()
            .children()?
            .into_iter()
            .map(|item| Source {
                id: format!("{}/{}", self.id(), item.name()),
                node_id: self.node_id.child(&item.name()),
                item,
                device: self.handle.clone(),
                logger: self.logger.clone(),
            })
            .collect())
    }

    /// Source by name, ignoring case.
    pub fn source(&self, name: &str) -> Result<Source> {
        self.children()?
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ScanError::not_found(format!("source '{name}' on {}", self.id())))
    }

    /// Release the device. Idempotent.
    pub fn close(&self) {
        if self.handle.close() {
            self.logger.debug(COMPONENT, &format!("closed {}", self.id()));
        }
    }
}

/// One capture path of a device: flatbed, feeder, ...
pub struct Source {
    id: String,
    node_id: NodeId,
    item: StackItem,
    device: Arc<OpenDevice>,
    logger: Logger,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source").field("id", &self.id).finish()
    }
}

impl Source {
    /// `<device id>/<source name>`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Derived from the device handle, so the same child always gets the
    /// same id.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn name(&self) -> String {
        self.item.name()
    }

    pub fn kind(&self) -> ItemType {
        self.item.kind()
    }

    pub fn options(&self) -> Result<Vec<OptionHandle>> {
        list_options(&self.item)
    }

    pub fn option(&self, name: &str) -> Result<OptionHandle> {
        find_option(&self.item, &self.id, name)
    }

    /// Start scanning.
    ///
    /// Fails with `DeviceBusy` while another session of the same device is
    /// alive, and with `DeviceDisconnected` once the device went away.
    pub fn scan_start(&self) -> Result<Session> {
        let inner = self.item.scan_start()?;
        Ok(Session::new(
            inner,
            self.id.clone(),
            self.device.clone(),
            self.logger.clone(),
        ))
    }
}
