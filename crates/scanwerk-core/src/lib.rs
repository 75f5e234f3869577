// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk: core value model, error taxonomy, pipeline configuration and
// logging shared across all crates.

pub mod config;
pub mod error;
pub mod logger;
pub mod names;
pub mod types;

pub use config::{LAYER_FLAGS, PipelineConfig};
pub use error::{Result, ScanError};
pub use logger::{LogLevel, LogSink, Logger, MemorySink};
pub use types::*;
