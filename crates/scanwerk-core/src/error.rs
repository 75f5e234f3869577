// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.
//
// Backend adapters translate every native failure into one of these variants
// before it crosses into the pipeline. Nothing above the adapter boundary
// ever sees a raw transport error.

use thiserror::Error;

use crate::types::ErrorClass;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Lookup --
    #[error("{what} not found")]
    NotFound { what: String },

    // -- Options --
    #[error("option '{option}': value {value} violates constraint {constraint}")]
    ConstraintViolation {
        option: String,
        value: String,
        constraint: String,
    },

    #[error("option '{option}' is inactive or read-only")]
    Inactive { option: String },

    #[error("option '{option}' cannot be read")]
    AccessDenied { option: String },

    // -- Devices --
    #[error("device busy: {node}")]
    DeviceBusy { node: String },

    #[error("device disconnected: {node} ({detail})")]
    DeviceDisconnected { node: String, detail: String },

    #[error("{node} has been closed")]
    Closed { node: String },

    #[error("backend '{backend}' I/O error: {detail}")]
    BackendIo { backend: String, detail: String },

    #[error("operation not supported by backend '{backend}': {detail}")]
    Unsupported { backend: String, detail: String },

    // -- Sessions --
    #[error("page {page}: scan parameters declared {expected} bytes, backend delivered {delivered}")]
    ProtocolMismatch {
        page: usize,
        expected: u64,
        delivered: u64,
    },

    #[error("scan session has been cancelled")]
    Cancelled,

    // -- Configuration --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn backend_io(backend: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::BackendIo {
            backend: backend.into(),
            detail: detail.to_string(),
        }
    }

    pub fn disconnected(node: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::DeviceDisconnected {
            node: node.into(),
            detail: detail.to_string(),
        }
    }

    /// Errors that end an active scan session when they surface from a read.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            Self::DeviceDisconnected { .. } | Self::BackendIo { .. } | Self::Cancelled
        )
    }

    /// Classify this error for retry decisions at the adapter boundary.
    ///
    /// Only backend I/O failures are ever transient. Everything else is a
    /// statement about the request or the device that a retry cannot change.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BackendIo { .. } => ErrorClass::Transient,
            Self::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => {
                    ErrorClass::Transient
                }
                _ => ErrorClass::Permanent,
            },
            _ => ErrorClass::Permanent,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
