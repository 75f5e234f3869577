// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// workaround.dedicated_thread: every call into the layers below runs on one
// worker thread owned by the chain.
//
// Some native drivers (TWAIN, WIA through COM) misbehave as soon as they are
// called from more than one thread. The caller blocks until the worker
// answers. A panic in a backend call is caught on the worker and reported as
// a `BackendIo` error instead of tearing the worker down.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;

use crossbeam_channel::{Sender, bounded, unbounded};
use tracing::{debug, error};

use scanwerk_backend::traits::{Api, Item, ScanOption, ScanSession};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::Logger;
use scanwerk_core::types::{
    CancelToken, DeviceDescriptor, DeviceLocations, ItemType, OptionDescriptor, ScanParameters,
    SetFlags, Value,
};

pub const NAME: &str = "workaround.dedicated_thread";

type Job = Box<dyn FnOnce() + Send>;

/// Handle on the worker thread. Disabled workers run calls in place.
///
/// The thread exits once the last handle is dropped.
#[derive(Clone)]
pub struct Worker {
    queue: Option<(Sender<Job>, ThreadId)>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("dedicated", &self.queue.is_some())
            .finish()
    }
}

impl Worker {
    /// Calls run on the calling thread.
    pub fn direct() -> Self {
        Self { queue: None }
    }

    pub fn spawn(logger: &Logger) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let handle = std::thread::Builder::new()
            .name("scanwerk-backend".into())
            .spawn(move || {
                for job in rx {
                    job();
                }
                debug!("backend worker thread exiting");
            })?;
        logger.info(NAME, "backend calls moved to a dedicated thread");
        Ok(Self {
            queue: Some((tx, handle.thread().id())),
        })
    }

    pub fn is_dedicated(&self) -> bool {
        self.queue.is_some()
    }

    /// Run `f` on the worker and wait for its result.
    pub fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let Some((tx, worker_id)) = &self.queue else {
            return f();
        };
        // Nested call from a job already running on the worker.
        if std::thread::current().id() == *worker_id {
            return f();
        }

        let (reply_tx, reply_rx) = bounded(1);
        let job: Job = Box::new(move || {
            let out = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
                error!("backend call panicked on the worker thread");
                Err(ScanError::backend_io(NAME, "backend call panicked"))
            });
            let _ = reply_tx.send(out);
        });
        tx.send(job)
            .map_err(|_| ScanError::backend_io(NAME, "worker thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| ScanError::backend_io(NAME, "worker thread dropped the call"))?
    }
}

// ---------------------------------------------------------------------------
// Api
// ---------------------------------------------------------------------------

/// Adapter whose every call is executed by a [`Worker`].
pub struct Threaded<A> {
    inner: Arc<A>,
    worker: Worker,
}

impl<A: Api> Threaded<A> {
    /// `enabled == false` gives a transparent wrapper with no thread.
    pub fn new(inner: A, enabled: bool, logger: &Logger) -> Result<Self> {
        let worker = if enabled {
            Worker::spawn(logger)?
        } else {
            Worker::direct()
        };
        Ok(Self {
            inner: Arc::new(inner),
            worker,
        })
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }
}

impl<A: Api> Api for Threaded<A> {
    type Item = ThreadedItem<A::Item>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        let inner = self.inner.clone();
        self.worker.call(move || inner.list_devices(locations))
    }

    fn get_device(&self, dev_id: &str) -> Result<Self::Item> {
        let inner = self.inner.clone();
        let dev_id = dev_id.to_string();
        let item = self.worker.call(move || inner.get_device(&dev_id))?;
        Ok(ThreadedItem {
            inner: item,
            worker: self.worker.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Items and options
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ThreadedItem<I> {
    inner: I,
    worker: Worker,
}

impl<I: Item> ThreadedItem<I> {
    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I: Item> Item for ThreadedItem<I> {
    type Opt = ThreadedOption<I::Opt>;
    type Session = ThreadedSession<I::Session>;

    fn name(&self) -> String {
        self.inner.name()
    }

    fn kind(&self) -> ItemType {
        self.inner.kind()
    }

    fn children(&self) -> Result<Vec<Self>> {
        let inner = self.inner.clone();
        let children = self.worker.call(move || inner.children())?;
        Ok(children
            .into_iter()
            .map(|inner| Self {
                inner,
                worker: self.worker.clone(),
            })
            .collect())
    }

    fn options(&self) -> Result<Vec<Self::Opt>> {
        let inner = self.inner.clone();
        let options = self.worker.call(move || inner.options())?;
        Ok(options
            .into_iter()
            .map(|inner| ThreadedOption {
                inner,
                worker: self.worker.clone(),
            })
            .collect())
    }

    fn scan_start(&self) -> Result<Self::Session> {
        let inner = self.inner.clone();
        let (session, token) = self.worker.call(move || {
            let session = inner.scan_start()?;
            let token = session.cancel_token();
            Ok((session, token))
        })?;
        Ok(ThreadedSession {
            inner: Arc::new(Mutex::new(Some(session))),
            worker: self.worker.clone(),
            token,
        })
    }

    fn close(&self) {
        let inner = self.inner.clone();
        if let Err(e) = self.worker.call(move || {
            inner.close();
            Ok(())
        }) {
            error!(error = %e, "close could not reach the backend worker");
        }
    }
}

#[derive(Clone)]
pub struct ThreadedOption<O> {
    inner: O,
    worker: Worker,
}

impl<O: ScanOption> ScanOption for ThreadedOption<O> {
    fn descriptor(&self) -> Result<OptionDescriptor> {
        let inner = self.inner.clone();
        self.worker.call(move || inner.descriptor())
    }

    fn value(&self) -> Result<Value> {
        let inner = self.inner.clone();
        self.worker.call(move || inner.value())
    }

    fn set_value(&self, value: Value) -> Result<SetFlags> {
        let inner = self.inner.clone();
        self.worker.call(move || inner.set_value(value))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session living on the worker. It is dropped there too.
pub struct ThreadedSession<S: ScanSession> {
    inner: Arc<Mutex<Option<S>>>,
    worker: Worker,
    token: CancelToken,
}

impl<S: ScanSession> ThreadedSession<S> {
    fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        self.worker.call(move || {
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(session) => f(session),
                None => Err(ScanError::Cancelled),
            }
        })
    }
}

impl<S: ScanSession> ScanSession for ThreadedSession<S> {
    fn scan_parameters(&mut self) -> Result<ScanParameters> {
        self.run(|s| s.scan_parameters())
    }

    fn end_of_feed(&mut self) -> Result<bool> {
        self.run(|s| s.end_of_feed())
    }

    fn end_of_page(&mut self) -> Result<bool> {
        self.run(|s| s.end_of_page())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.worker.is_dedicated() {
            let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            return match guard.as_mut() {
                Some(session) => session.read(buf),
                None => Err(ScanError::Cancelled),
            };
        }
        let len = buf.len();
        let chunk = self.run(move |s| {
            let mut chunk = vec![0u8; len];
            let n = s.read(&mut chunk)?;
            chunk.truncate(n);
            Ok(chunk)
        })?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn cancel(&mut self) {
        self.token.cancel();
        if let Err(e) = self.run(|s| {
            s.cancel();
            Ok(())
        }) {
            debug!(error = %e, "cancel not forwarded to the worker");
        }
    }

    fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl<S: ScanSession> Drop for ThreadedSession<S> {
    fn drop(&mut self) {
        let inner = self.inner.clone();
        let Some((tx, _)) = &self.worker.queue else {
            return;
        };
        let _ = tx.send(Box::new(move || {
            inner.lock().unwrap_or_else(PoisonError::into_inner).take();
        }));
    }
}
