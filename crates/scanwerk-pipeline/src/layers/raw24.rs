// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.raw24: clients only ever receive RAW_RGB_24 pages.
//
// Grayscale pages are expanded to three identical channels. Black & white
// pages are expanded bit by bit (bit set = black), dropping the padding bits
// at the end of each row. Bytes that do not fit the caller's buffer are kept
// for the next read.

use scanwerk_backend::traits::{Item, ScanSession};
use scanwerk_core::error::Result;
use scanwerk_core::types::{ImageFormat, ScanParameters};

use crate::layer::{Layer, LayerSession};

#[derive(Debug, Clone, Copy, Default)]
pub struct Raw24;

/// Read state of one session.
#[derive(Debug, Default)]
pub struct Raw24Session {
    /// Parameters reported by the layer below for the current page.
    page: Option<ScanParameters>,
    /// Byte offset within the current BW_1 row.
    line_pos: u64,
    /// Expanded bytes not yet handed out.
    pending: Vec<u8>,
    pending_off: usize,
}

impl Raw24Session {
    fn has_pending(&self) -> bool {
        self.pending_off < self.pending.len()
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.pending[self.pending_off..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_off += n;
        if !self.has_pending() {
            self.pending.clear();
            self.pending_off = 0;
        }
        n
    }
}

/// Append each gray byte three times.
pub fn expand_gray8(input: &[u8], out: &mut Vec<u8>) {
    out.reserve(input.len() * 3);
    for &v in input {
        out.extend_from_slice(&[v, v, v]);
    }
}

/// Expand BW_1 bytes of rows `width` pixels wide.
///
/// `line_pos` is the byte offset of `input[0]` within its row and is updated
/// so that successive chunks of one page can be expanded independently.
pub fn expand_bw1(input: &[u8], width: u32, line_pos: &mut u64, out: &mut Vec<u8>) {
    let width = u64::from(width);
    let bytes_per_line = width.div_ceil(8).max(1);
    out.reserve(input.len() * 24);
    for &byte in input {
        for bit in 0..8u64 {
            if *line_pos * 8 + bit >= width {
                break;
            }
            let v = if byte & (0x80 >> bit) != 0 { 0x00 } else { 0xFF };
            out.extend_from_slice(&[v, v, v]);
        }
        *line_pos = (*line_pos + 1) % bytes_per_line;
    }
}

fn page_params<I: Item>(session: &mut LayerSession<Raw24, I>) -> Result<ScanParameters> {
    if let Some(params) = session.state.page {
        return Ok(params);
    }
    let params = session.inner.scan_parameters()?;
    session.state.page = Some(params);
    session.state.line_pos = 0;
    Ok(params)
}

impl Layer for Raw24 {
    const NAME: &'static str = "normalizer.raw24";
    type DeviceState = ();
    type SessionState = Raw24Session;

    fn scan_parameters<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<ScanParameters> {
        let params = session.inner.scan_parameters()?;
        if !session.state.has_pending() && session.state.page.is_none() {
            session.state.page = Some(params);
            session.state.line_pos = 0;
        }
        if params.format == ImageFormat::RawRgb24 {
            return Ok(params);
        }
        session.ctx.log_debug(&format!(
            "{:?} {}x{} exposed as RAW_RGB_24",
            params.format, params.width, params.height
        ));
        Ok(ScanParameters::new(
            ImageFormat::RawRgb24,
            params.width,
            params.height,
        ))
    }

    fn end_of_feed<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        if session.state.has_pending() {
            return Ok(false);
        }
        session.inner.end_of_feed()
    }

    fn end_of_page<I: Item>(&self, session: &mut LayerSession<Self, I>) -> Result<bool> {
        if session.state.has_pending() {
            return Ok(false);
        }
        let ended = session.inner.end_of_page()?;
        if ended {
            // The next read belongs to another page, maybe of another format.
            session.state.page = None;
        }
        Ok(ended)
    }

    fn read<I: Item>(&self, session: &mut LayerSession<Self, I>, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if session.state.has_pending() {
            return Ok(session.state.drain_pending(buf));
        }

        let params = page_params(session)?;
        let chunk = match params.format {
            ImageFormat::RawRgb24 => return session.inner.read(buf),
            ImageFormat::Grayscale8 => (buf.len() / 3).max(1),
            ImageFormat::Bw1 => (buf.len() / 24).max(1),
        };

        let mut raw = vec![0u8; chunk];
        let n = session.inner.read(&mut raw)?;
        if n == 0 {
            return Ok(0);
        }

        let state = &mut session.state;
        let mut expanded = std::mem::take(&mut state.pending);
        expanded.clear();
        match params.format {
            ImageFormat::Grayscale8 => expand_gray8(&raw[..n], &mut expanded),
            ImageFormat::Bw1 => expand_bw1(&raw[..n], params.width, &mut state.line_pos, &mut expanded),
            ImageFormat::RawRgb24 => {}
        }
        state.pending = expanded;
        state.pending_off = 0;
        Ok(state.drain_pending(buf))
    }

    fn cancel<I: Item>(&self, session: &mut LayerSession<Self, I>) {
        session.state.pending.clear();
        session.state.pending_off = 0;
        session.inner.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain_page, wrap};
    use rstest::rstest;
    use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbPage};
    use scanwerk_backend::traits::Api;

    fn backend(page: DumbPage) -> DumbBackend {
        let backend = DumbBackend::new("dumb");
        backend.add_device(DumbDevice::new("dev0", "Acme", "Scan").with_page(page));
        backend
    }

    #[test]
    fn gray_is_tripled() {
        let mut out = Vec::new();
        expand_gray8(&[0x10, 0xA0], &mut out);
        assert_eq!(out, vec![0x10, 0x10, 0x10, 0xA0, 0xA0, 0xA0]);
    }

    #[test]
    fn bw_padding_bits_are_dropped() {
        // 10 pixels per row: 2 bytes per row, 6 padding bits.
        let mut out = Vec::new();
        let mut pos = 0;
        expand_bw1(&[0b1000_0001, 0b0100_0000, 0xFF, 0xFF], 10, &mut pos, &mut out);
        assert_eq!(out.len(), 2 * 10 * 3);
        assert_eq!(&out[..3], &[0x00, 0x00, 0x00]);
        assert_eq!(&out[3..6], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&out[7 * 3..8 * 3], &[0x00, 0x00, 0x00]);
        assert_eq!(&out[9 * 3..10 * 3], &[0x00, 0x00, 0x00]);
        assert!(out[30..].iter().all(|&b| b == 0x00));
        assert_eq!(pos, 0);
    }

    #[test]
    fn bw_row_position_survives_chunking() {
        let rows = [0xF0u8, 0x80, 0x0F, 0x00];
        let mut whole = Vec::new();
        let mut pos = 0;
        expand_bw1(&rows, 9, &mut pos, &mut whole);

        let mut split = Vec::new();
        let mut pos = 0;
        for byte in rows {
            expand_bw1(&[byte], 9, &mut pos, &mut split);
        }
        assert_eq!(whole, split);
        assert_eq!(whole.len(), 2 * 9 * 3);
    }

    #[rstest]
    #[case(ImageFormat::Grayscale8)]
    #[case(ImageFormat::Bw1)]
    #[case(ImageFormat::RawRgb24)]
    fn pages_come_out_as_rgb(#[case] format: ImageFormat) {
        let api = wrap(Raw24, true, backend(DumbPage::new(ScanParameters::new(format, 13, 7))));
        let dev = api.get_device("dev0").unwrap();
        let mut session = dev.scan_start().unwrap();
        let params = session.scan_parameters().unwrap();
        assert_eq!(params.format, ImageFormat::RawRgb24);
        assert_eq!(params.image_size, 13 * 7 * 3);
        assert_eq!(drain_page(&mut session, 100).len(), 13 * 7 * 3);
        assert!(session.end_of_feed().unwrap());
    }

    #[test]
    fn disabled_layer_keeps_native_format() {
        let api = wrap(
            Raw24,
            false,
            backend(DumbPage::new(ScanParameters::new(ImageFormat::Grayscale8, 13, 7))),
        );
        let dev = api.get_device("dev0").unwrap();
        let mut session = dev.scan_start().unwrap();
        assert_eq!(session.scan_parameters().unwrap().format, ImageFormat::Grayscale8);
        assert_eq!(drain_page(&mut session, 100).len(), 13 * 7);
    }

    #[test]
    fn gray_values_are_preserved() {
        let params = ScanParameters::new(ImageFormat::Grayscale8, 2, 1);
        let api = wrap(Raw24, true, backend(DumbPage::from_bytes(params, vec![7, 200])));
        let dev = api.get_device("dev0").unwrap();
        let mut session = dev.scan_start().unwrap();
        session.scan_parameters().unwrap();
        assert_eq!(drain_page(&mut session, 4), vec![7, 7, 7, 200, 200, 200]);
    }
}
