// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk pipeline: the normalizers and workarounds that make every
// backend look the same.
//
// Each layer decorates the adapter below it (see `layer`). `chain::build`
// stacks all of them in a fixed order and puts the result behind the
// optional dedicated backend thread.

pub mod chain;
pub mod layer;
pub mod layers;
pub mod retry;
pub mod threaded;

#[cfg(test)]
mod testing;

pub use chain::{Chain, build};
pub use layer::{Layer, LayerApi, LayerItem, LayerOption, LayerSession, Node};
pub use retry::RetryConfig;
pub use threaded::{Threaded, Worker};
