// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared test helpers.

use scanwerk_backend::dumb::DumbBackend;
use scanwerk_backend::traits::ScanSession;
use scanwerk_core::logger::Logger;

use crate::layer::{Layer, LayerApi};

/// One layer directly on top of an in-memory backend.
pub fn wrap<L: Layer>(layer: L, enabled: bool, backend: DumbBackend) -> LayerApi<L, DumbBackend> {
    LayerApi::new(layer, enabled, Logger::new(), backend)
}

/// Read the current page to its end with reads of `buf_len` bytes.
pub fn drain_page<S: ScanSession>(session: &mut S, buf_len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; buf_len];
    while !session.end_of_page().unwrap() {
        let n = session.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}
