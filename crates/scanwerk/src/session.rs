// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan session state machine.
//
//   Active(n) --end_of_page--> PageBoundary(n) --read--> Active(n + 1)
//        |                           |
//        |                           +--end_of_feed--> FeedExhausted
//        +--cancel / fatal error--> Cancelled
//
// Parameters are fetched once per page. The number of bytes actually
// delivered is checked against them when the page ends; a disagreement is
// reported once as `ProtocolMismatch` and never corrected.

use scanwerk_backend::traits::ScanSession;
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::Logger;
use scanwerk_core::types::{CancelToken, ScanParameters};

use std::sync::Arc;

use crate::StackSession;
use crate::node::OpenDevice;

const COMPONENT: &str = "session";

/// Buffer size used by [`Session::read_page`], and the largest
/// [`Session::read_bytes`] buffer before the page size is known.
pub const READ_CHUNK: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Bytes of page `page` are being delivered.
    Active { page: usize },
    /// Page `page` has been fully delivered.
    PageBoundary { page: usize },
    /// No further page will be produced. Terminal.
    FeedExhausted,
    /// Cancelled by the client or by a fatal error. Terminal.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FeedExhausted | Self::Cancelled)
    }
}

/// Cancels a session from another thread.
///
/// A read blocked in the backend returns `Cancelled` promptly. The source
/// is released on the session's next call, or when it is dropped.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancelToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Page-oriented byte stream of one scan.
///
/// A session must be cancelled or read until the feed is exhausted;
/// dropping a live session cancels it.
pub struct Session {
    inner: StackSession,
    node: String,
    logger: Logger,
    token: CancelToken,
    state: SessionState,
    page: usize,
    params: Option<ScanParameters>,
    page_delivered: u64,
    total_delivered: u64,
    /// Keeps the device open while the scan runs.
    _device: Arc<OpenDevice>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("node", &self.node)
            .field("state", &self.state)
            .field("page_delivered", &self.page_delivered)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        inner: StackSession,
        node: String,
        device: Arc<OpenDevice>,
        logger: Logger,
    ) -> Self {
        logger.info(COMPONENT, &format!("{node}: scan started"));
        Self {
            token: inner.cancel_token(),
            inner,
            node,
            logger,
            state: SessionState::Active { page: 0 },
            page: 0,
            params: None,
            page_delivered: 0,
            total_delivered: 0,
            _device: device,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Index of the current (or last) page, starting at 0.
    pub fn page_index(&self) -> usize {
        self.page
    }

    /// Bytes delivered since the session started, across pages.
    pub fn bytes_delivered(&self) -> u64 {
        self.total_delivered
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.clone(),
        }
    }

    /// Parameters of the current page.
    ///
    /// At a page boundary this moves on to the next page, if there is one,
    /// and describes it.
    pub fn scan_parameters(&mut self) -> Result<ScanParameters> {
        self.check_live()?;
        match self.state {
            SessionState::FeedExhausted => self.params.ok_or(ScanError::Cancelled),
            SessionState::PageBoundary { .. } => {
                if self.next_page()? {
                    self.page_params()
                } else {
                    self.params.ok_or(ScanError::Cancelled)
                }
            }
            _ => self.page_params(),
        }
    }

    /// Read up to `buf.len()` bytes of the current page.
    ///
    /// Returns 0 only at a page boundary or once the feed is exhausted.
    /// Reading at a boundary starts the next page.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_live()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let state = self.state;
        match state {
            SessionState::FeedExhausted => return Ok(0),
            SessionState::PageBoundary { .. } if !self.next_page()? => return Ok(0),
            _ => {}
        }

        let expected = self.page_params()?.image_size;
        if self.page_delivered >= expected && self.end_of_page()? {
            return Ok(0);
        }

        let read = self.inner.read(buf);
        let n = self.guard(read)?;
        if n == 0 {
            self.end_of_page()?;
            return Ok(0);
        }
        self.page_delivered += n as u64;
        self.total_delivered += n as u64;
        Ok(n)
    }

    /// Read at most `max_len` bytes into a fresh buffer.
    ///
    /// The buffer never exceeds what is left of the current page, or
    /// [`READ_CHUNK`] while that is not known.
    pub fn read_bytes(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let remaining = match (self.state, self.params) {
            (SessionState::Active { .. }, Some(params)) => {
                params.image_size.saturating_sub(self.page_delivered)
            }
            _ => 0,
        };
        let cap = match remaining {
            0 => READ_CHUNK,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let mut buf = vec![0u8; max_len.min(cap)];
        let n = self.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read the current page, or the next one at a boundary, to its end.
    pub fn read_page(&mut self) -> Result<Vec<u8>> {
        let mut page = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            page.extend_from_slice(&buf[..n]);
            if self.end_of_page()? {
                break;
            }
        }
        Ok(page)
    }

    /// Whether every byte of the current page has been delivered.
    pub fn end_of_page(&mut self) -> Result<bool> {
        self.check_live()?;
        let page = match self.state {
            SessionState::Active { page } => page,
            SessionState::PageBoundary { .. } | SessionState::FeedExhausted => return Ok(true),
            SessionState::Cancelled => return Err(ScanError::Cancelled),
        };

        let expected = self.page_params()?.image_size;
        let ended = self.inner.end_of_page();
        if !self.guard(ended)? {
            return Ok(false);
        }
        self.state = SessionState::PageBoundary { page };

        if self.page_delivered != expected {
            self.logger.warning(
                COMPONENT,
                &format!(
                    "{}: page {page} declared {expected} bytes, backend delivered {}",
                    self.node, self.page_delivered
                ),
            );
            return Err(ScanError::ProtocolMismatch {
                page,
                expected,
                delivered: self.page_delivered,
            });
        }
        self.logger
            .debug(COMPONENT, &format!("{}: page {page} complete", self.node));
        Ok(true)
    }

    /// Whether no further page will be produced.
    ///
    /// Once true the session is over and the source is released.
    pub fn end_of_feed(&mut self) -> Result<bool> {
        if self.state.is_terminal() {
            return Ok(true);
        }
        self.check_live()?;
        if matches!(self.state, SessionState::Active { .. }) && !self.end_of_page()? {
            return Ok(false);
        }
        self.feed_done()
    }

    /// Abort the scan and release the source. Idempotent.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.logger
            .info(COMPONENT, &format!("{}: scan cancelled", self.node));
        self.finish(SessionState::Cancelled);
    }

    fn finish(&mut self, state: SessionState) {
        self.token.cancel();
        self.inner.cancel();
        self.state = state;
    }

    /// Pick up a cancellation requested through a [`CancelHandle`].
    fn check_live(&mut self) -> Result<()> {
        if self.state == SessionState::Cancelled {
            return Err(ScanError::Cancelled);
        }
        if !self.state.is_terminal() && self.token.is_cancelled() {
            self.logger.info(
                COMPONENT,
                &format!("{}: scan cancelled from another thread", self.node),
            );
            self.finish(SessionState::Cancelled);
            return Err(ScanError::Cancelled);
        }
        Ok(())
    }

    /// Errors that end the session move it to `Cancelled` before they are
    /// handed to the caller.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal_for_session() && !self.state.is_terminal() {
                self.logger
                    .warning(COMPONENT, &format!("{}: scan aborted: {err}", self.node));
                self.finish(SessionState::Cancelled);
            }
        }
        result
    }

    fn page_params(&mut self) -> Result<ScanParameters> {
        if let Some(params) = self.params {
            return Ok(params);
        }
        let fetched = self.inner.scan_parameters();
        let params = self.guard(fetched)?;
        self.logger.debug(
            COMPONENT,
            &format!(
                "{}: page {} is {:?} {}x{}, {} bytes",
                self.node, self.page, params.format, params.width, params.height, params.image_size
            ),
        );
        self.params = Some(params);
        Ok(params)
    }

    fn feed_done(&mut self) -> Result<bool> {
        let ended = self.inner.end_of_feed();
        let done = self.guard(ended)?;
        if done {
            self.logger.info(
                COMPONENT,
                &format!(
                    "{}: feed exhausted after {} page(s), {} bytes",
                    self.node,
                    self.page + 1,
                    self.total_delivered
                ),
            );
            self.finish(SessionState::FeedExhausted);
        }
        Ok(done)
    }

    /// Leave a page boundary. Returns false when the feed is exhausted.
    fn next_page(&mut self) -> Result<bool> {
        if self.feed_done()? {
            return Ok(false);
        }
        self.page += 1;
        self.state = SessionState::Active { page: self.page };
        self.params = None;
        self.page_delivered = 0;
        Ok(true)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.logger.debug(
                COMPONENT,
                &format!("{}: live session dropped, cancelling", self.node),
            );
            self.finish(SessionState::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flatbed_device, flatbed_with_page, registry_with};
    use scanwerk_backend::dumb::{DumbDevice, DumbPage, DumbSource};
    use scanwerk_core::types::{ImageFormat, ItemType};
    use std::time::{Duration, Instant};

    fn rgb(width: u32, height: u32) -> DumbPage {
        DumbPage::new(ScanParameters::new(ImageFormat::RawRgb24, width, height))
    }

    #[test]
    fn a4_page_is_delivered_exactly() {
        let (registry, backend) = registry_with(flatbed_with_page(rgb(2550, 3509)));
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();

        let params = session.scan_parameters().unwrap();
        assert_eq!(params.image_size, 26_843_850);

        let mut total = 0;
        while !session.end_of_page().unwrap() {
            let chunk = session.read_bytes(32768).unwrap();
            assert!(!chunk.is_empty() && chunk.len() <= 32768);
            total += chunk.len();
        }
        assert_eq!(total, 26_843_850);
        assert_eq!(session.bytes_delivered(), 26_843_850);
        assert_eq!(session.state(), SessionState::PageBoundary { page: 0 });

        assert!(session.end_of_feed().unwrap());
        assert_eq!(session.state(), SessionState::FeedExhausted);
        assert!(!backend.is_busy("dev0"));
    }

    #[test]
    fn oversized_read_request_is_bounded_by_the_page() {
        let (registry, _) = registry_with(flatbed_with_page(rgb(100, 100)));
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();

        assert_eq!(session.scan_parameters().unwrap().image_size, 30_000);
        let mut total = 0;
        while !session.end_of_page().unwrap() {
            let chunk = session.read_bytes(usize::MAX).unwrap();
            assert!(!chunk.is_empty() && chunk.len() <= 30_000 - total);
            total += chunk.len();
        }
        assert_eq!(total, 30_000);
        assert!(session.read_bytes(usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn feeder_delivers_every_page() {
        let (registry, backend) = registry_with(
            DumbDevice::new("dev0", "Acme", "Feeder").with_source(
                DumbSource::new("Feeder", ItemType::Adf)
                    .with_page(rgb(4, 2))
                    .with_page(rgb(4, 3)),
            ),
        );
        let source = registry.get_device("dumb:dev0").unwrap().source("feeder").unwrap();
        let mut session = source.scan_start().unwrap();

        assert_eq!(session.read_page().unwrap().len(), 24);
        assert!(!session.end_of_feed().unwrap());

        assert_eq!(session.scan_parameters().unwrap().height, 3);
        assert_eq!(session.page_index(), 1);
        assert_eq!(session.read_page().unwrap().len(), 36);
        assert!(session.end_of_feed().unwrap());
        assert_eq!(session.read(&mut [0u8; 16]).unwrap(), 0);
        assert!(!backend.is_busy("dev0"));
    }

    #[test]
    fn flatbed_feed_ends_after_one_page() {
        let (registry, _) = registry_with(
            DumbDevice::new("dev0", "Acme", "Flatbed").with_source(
                DumbSource::new("Flatbed", ItemType::Flatbed)
                    .with_page(rgb(4, 2))
                    .endless_feed(),
            ),
        );
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();
        assert_eq!(session.read_page().unwrap().len(), 24);
        assert!(session.end_of_feed().unwrap());
        assert_eq!(session.page_index(), 0);
    }

    #[test]
    fn second_scan_start_is_busy() {
        let (registry, _) = registry_with(flatbed_with_page(rgb(64, 64)));
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut first = source.scan_start().unwrap();
        assert_eq!(first.read_bytes(100).unwrap().len(), 100);

        assert!(matches!(
            source.scan_start(),
            Err(ScanError::DeviceBusy { .. })
        ));

        assert_eq!(first.state(), SessionState::Active { page: 0 });
        assert_eq!(first.read_page().unwrap().len(), 64 * 64 * 3 - 100);
        assert!(first.end_of_feed().unwrap());
    }

    #[test]
    fn cancel_is_idempotent() {
        let (registry, backend) = registry_with(flatbed_device());
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();
        session.cancel();
        session.cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(matches!(session.read_bytes(8), Err(ScanError::Cancelled)));
        assert!(session.end_of_feed().unwrap());
        assert!(!backend.is_busy("dev0"));
        assert!(source.scan_start().is_ok());
    }

    #[test]
    fn dropping_a_live_session_releases_the_source() {
        let (registry, backend) = registry_with(flatbed_device());
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        {
            let mut session = source.scan_start().unwrap();
            session.read_bytes(4).unwrap();
            assert!(backend.is_busy("dev0"));
        }
        assert!(!backend.is_busy("dev0"));
        assert!(source.scan_start().is_ok());
    }

    #[test]
    fn cancel_from_another_thread_interrupts_a_blocked_read() {
        let (registry, backend) = registry_with(
            DumbDevice::new("dev0", "Acme", "Slow").with_source(
                DumbSource::new("Flatbed", ItemType::Flatbed)
                    .with_page(rgb(4, 2))
                    .read_delay(Duration::from_secs(30)),
            ),
        );
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();
        let handle = session.cancel_handle();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.cancel();
        });

        let started = Instant::now();
        assert!(matches!(session.read_bytes(8), Err(ScanError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();

        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(!backend.is_busy("dev0"));
    }

    #[test]
    fn short_page_is_reported_once() {
        let (registry, _) = registry_with(flatbed_with_page(rgb(4, 2).delivering(20)));
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();

        assert_eq!(session.read_bytes(64).unwrap().len(), 20);
        assert!(matches!(
            session.end_of_page(),
            Err(ScanError::ProtocolMismatch {
                page: 0,
                expected: 24,
                delivered: 20
            })
        ));
        assert!(session.end_of_page().unwrap());
        assert!(session.end_of_feed().unwrap());
    }

    #[test]
    fn disconnect_cancels_the_session() {
        let (registry, backend) = registry_with(flatbed_with_page(rgb(100, 4)));
        backend.fail_reads_after("dev0", 500);
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();

        let err = loop {
            match session.read_bytes(128) {
                Ok(chunk) => assert!(!chunk.is_empty()),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, ScanError::DeviceDisconnected { .. }));
        assert_eq!(session.bytes_delivered(), 500);
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(matches!(session.read_bytes(128), Err(ScanError::Cancelled)));
    }
}
