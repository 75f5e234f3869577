// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan session of the in-memory backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::types::{CancelToken, ImageFormat, ScanParameters};

use super::{BackendShared, DeviceShared, DumbPage, NodeSpec, bump};
use crate::traits::ScanSession;

/// Granularity at which a delayed read checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(2);

pub struct DumbSession {
    backend: Arc<BackendShared>,
    device: Arc<DeviceShared>,
    node: usize,
    path: String,
    page: usize,
    offset: u64,
    token: CancelToken,
    released: bool,
}

impl DumbSession {
    pub(super) fn new(
        backend: Arc<BackendShared>,
        device: Arc<DeviceShared>,
        node: usize,
        path: String,
    ) -> Self {
        Self {
            backend,
            device,
            node,
            path,
            page: 0,
            offset: 0,
            token: CancelToken::new(),
            released: false,
        }
    }

    fn spec(&self) -> &NodeSpec {
        &self.device.nodes[self.node]
    }

    fn current(&self) -> Option<&DumbPage> {
        let pages = &self.spec().pages;
        if pages.is_empty() {
            None
        } else {
            Some(&pages[self.page % pages.len()])
        }
    }

    fn page_done(&self) -> bool {
        self.current().is_none_or(|page| self.offset >= page.deliver)
    }

    fn has_next_page(&self) -> bool {
        let spec = self.spec();
        !spec.pages.is_empty() && (spec.endless_feed || self.page + 1 < spec.pages.len())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.device.lock().busy = false;
            debug!(node = %self.path, "device released");
        }
    }

    /// Sleep for the configured latency unless cancelled first.
    fn wait(&self) -> Result<()> {
        let delay = self.spec().read_delay;
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            if self.token.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            std::thread::sleep(CANCEL_POLL.min(delay));
        }
        Ok(())
    }
}

impl ScanSession for DumbSession {
    fn scan_parameters(&mut self) -> Result<ScanParameters> {
        if self.token.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let pages = &self.spec().pages;
        if pages.is_empty() {
            return Ok(ScanParameters::new(ImageFormat::RawRgb24, 0, 0));
        }
        let index = if self.page_done() && self.has_next_page() {
            self.page + 1
        } else {
            self.page
        };
        Ok(pages[index % pages.len()].params())
    }

    fn end_of_feed(&mut self) -> Result<bool> {
        let done = self.page_done() && !self.has_next_page();
        if done {
            self.release();
        }
        Ok(done)
    }

    fn end_of_page(&mut self) -> Result<bool> {
        Ok(self.page_done())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.token.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let fail_after = {
            let state = self.device.lock();
            if state.disconnected {
                drop(state);
                self.release();
                return Err(ScanError::disconnected(&self.path, "device unplugged"));
            }
            state.fail_reads_after
        };

        if self.page_done() {
            if !self.has_next_page() {
                return Ok(0);
            }
            self.page += 1;
            self.offset = 0;
            debug!(node = %self.path, page = self.page, "next page");
        }

        self.wait()?;
        bump(&self.backend.counters.reads);

        let remaining = match self.current() {
            Some(page) => page.deliver - self.offset,
            None => return Ok(0),
        };
        let mut n = (buf.len() as u64).min(self.spec().chunk as u64).min(remaining);

        if let Some(limit) = fail_after {
            let total = self.total_delivered();
            if total >= limit {
                warn!(node = %self.path, total, "simulated disconnect during read");
                self.device.lock().disconnected = true;
                self.release();
                return Err(ScanError::disconnected(&self.path, "connection lost during read"));
            }
            n = n.min(limit - total);
        }

        let Some(page) = self.current() else {
            return Ok(0);
        };
        for (i, byte) in buf[..n as usize].iter_mut().enumerate() {
            *byte = page.byte_at(self.offset + i as u64);
        }
        self.offset += n;
        Ok(n as usize)
    }

    fn cancel(&mut self) {
        self.token.cancel();
        self.release();
    }

    fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl DumbSession {
    /// Bytes delivered since the session started, across pages.
    fn total_delivered(&self) -> u64 {
        let pages = &self.spec().pages;
        if pages.is_empty() {
            return 0;
        }
        let full: u64 = (0..self.page)
            .map(|i| pages[i % pages.len()].deliver)
            .sum();
        full + self.offset
    }
}

impl Drop for DumbSession {
    fn drop(&mut self) {
        if !self.released {
            self.token.cancel();
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dumb::{DumbBackend, DumbDevice, DumbSource};
    use crate::traits::{Api, Item};
    use scanwerk_core::types::ItemType;

    fn params() -> ScanParameters {
        ScanParameters::new(ImageFormat::RawRgb24, 10, 10)
    }

    fn open(source: DumbSource) -> (DumbBackend, DumbSession) {
        let backend = DumbBackend::new("dumb");
        backend.add_device(DumbDevice::new("dev0", "Acme", "Scan").with_source(source));
        let src = backend.get_device("dev0").unwrap().children().unwrap().remove(0);
        let session = src.scan_start().unwrap();
        (backend, session)
    }

    fn drain_page(session: &mut DumbSession) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while !session.end_of_page().unwrap() {
            let n = session.read(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn delivers_pages_in_order() {
        let (backend, mut session) = open(
            DumbSource::new("feeder", ItemType::Adf)
                .with_page(DumbPage::from_bytes(params(), vec![1; 300]))
                .with_page(DumbPage::from_bytes(params(), vec![2; 300])),
        );
        assert!(!session.end_of_feed().unwrap());
        assert_eq!(drain_page(&mut session), vec![1; 300]);
        assert!(!session.end_of_feed().unwrap());
        assert_eq!(session.read(&mut [0u8; 16]).unwrap(), 16);
        let rest = drain_page(&mut session);
        assert_eq!(rest.len(), 284);
        assert!(session.end_of_feed().unwrap());
        assert!(!backend.is_busy("dev0"));
        assert_eq!(session.read(&mut [0u8; 16]).unwrap(), 0);
    }

    #[test]
    fn chunk_size_bounds_reads() {
        let (_backend, mut session) = open(
            DumbSource::new("flatbed", ItemType::Flatbed)
                .with_page(DumbPage::new(params()))
                .chunk_size(7),
        );
        assert_eq!(session.read(&mut [0u8; 64]).unwrap(), 7);
    }

    #[test]
    fn endless_feed_never_ends() {
        let (_backend, mut session) = open(
            DumbSource::new("flatbed", ItemType::Flatbed)
                .with_page(DumbPage::new(params()))
                .endless_feed(),
        );
        let mut buf = [0u8; 512];
        for _ in 0..3 {
            assert_eq!(session.read(&mut buf).unwrap(), 300);
            assert!(session.end_of_page().unwrap());
            assert!(!session.end_of_feed().unwrap());
        }
    }

    #[test]
    fn cancel_interrupts_slow_read() {
        let (_backend, mut session) = open(
            DumbSource::new("flatbed", ItemType::Flatbed)
                .with_page(DumbPage::new(params()))
                .read_delay(Duration::from_secs(30)),
        );
        let token = session.cancel_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        let started = Instant::now();
        assert!(matches!(session.read(&mut [0u8; 8]), Err(ScanError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
    }

    #[test]
    fn disconnect_mid_read() {
        let (backend, mut session) =
            open(DumbSource::new("flatbed", ItemType::Flatbed).with_page(DumbPage::new(params())));
        backend.fail_reads_after("dev0", 100);
        let mut buf = [0u8; 64];
        assert_eq!(session.read(&mut buf).unwrap(), 64);
        assert_eq!(session.read(&mut buf).unwrap(), 36);
        assert!(matches!(
            session.read(&mut buf),
            Err(ScanError::DeviceDisconnected { .. })
        ));
        assert!(!backend.is_busy("dev0"));
    }

    #[test]
    fn short_delivery_is_visible() {
        let (_backend, mut session) = open(
            DumbSource::new("flatbed", ItemType::Flatbed)
                .with_page(DumbPage::new(params()).delivering(120)),
        );
        assert_eq!(drain_page(&mut session).len(), 120);
        assert_eq!(session.scan_parameters().unwrap().image_size, 300);
    }

    #[test]
    fn empty_feed_ends_immediately() {
        let (backend, mut session) = open(DumbSource::new("feeder", ItemType::Adf));
        assert!(session.end_of_feed().unwrap());
        assert!(!backend.is_busy("dev0"));
        assert_eq!(session.read(&mut [0u8; 4]).unwrap(), 0);
    }
}
