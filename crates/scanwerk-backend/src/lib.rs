// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk backend adapter boundary.
//
// Defines the capability traits every backend implements, the type-erased
// handles the registry stores, the multiplexer that merges backends, and the
// in-memory `dumb` backend used for tests and demos.

pub mod dumb;
pub mod erased;
pub mod multiplexer;
pub mod traits;

pub use dumb::DumbBackend;
pub use erased::{AnyBackend, AnyItem, AnyOption, AnySession};
pub use multiplexer::Multiplexer;
pub use traits::{Api, Item, ScanOption, ScanSession};
