// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk: one device/option/session model over every scanner backend.
//
// A `Registry` owns the backends and the layer stack. Devices and sources
// handed out by it have already been normalized, so clients never deal
// with driver quirks.

pub mod node;
pub mod option;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use node::{Device, Source};
pub use option::OptionHandle;
pub use registry::{Registry, RegistryBuilder};
pub use session::{CancelHandle, Session, SessionState};

pub use scanwerk_core::{
    Capabilities, Constraint, DeviceDescriptor, DeviceLocations, ImageFormat, ItemType, LogLevel,
    LogSink, Logger, MemorySink, OptionDescriptor, PipelineConfig, Result, ScanError,
    ScanParameters, SetFlags, Unit, Value, ValueType,
};
pub use scanwerk_pipeline::RetryConfig;

use scanwerk_backend::traits::{Api, Item};
use scanwerk_backend::Multiplexer;
use scanwerk_pipeline::Chain;

/// The full stack every registry talks to.
pub(crate) type Stack = Chain<Multiplexer>;
pub(crate) type StackItem = <Stack as Api>::Item;
pub(crate) type StackOption = <StackItem as Item>::Opt;
pub(crate) type StackSession = <StackItem as Item>::Session;
