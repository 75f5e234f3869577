// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device registry: the backends, the layer stack on top of them and the
// logger every component reports to.
//
// The layer configuration is fixed when the registry is built. Devices,
// sources and sessions obtained from a registry must not outlive a change
// of configuration; build a new registry instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use scanwerk_backend::dumb::DumbBackend;
use scanwerk_backend::traits::Api;
use scanwerk_backend::{AnyBackend, Multiplexer};
use scanwerk_core::config::{ENV_PREFIX, PipelineConfig};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::logger::{LogSink, Logger};
use scanwerk_core::types::{DeviceDescriptor, DeviceLocations};
use scanwerk_pipeline::RetryConfig;
use tracing::debug;

use crate::Stack;
use crate::node::{Device, OpenDevice};

const COMPONENT: &str = "registry";

/// Environment variable enabling the in-memory demonstration backend.
pub const DUMB_ENV: &str = "SCANWERK_DUMB";

/// Entry point: enumerate and open devices.
pub struct Registry {
    stack: Stack,
    backends: Vec<String>,
    config: PipelineConfig,
    logger: Logger,
    /// Devices opened through this registry, to close them on teardown.
    opened: Mutex<Vec<Weak<OpenDevice>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.backends)
            .field("layers", &self.config.enabled_layers())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Registry {
    /// Registry with every normalizer and workaround enabled.
    ///
    /// Without native adapters, or with `SCANWERK_DUMB` set, the in-memory
    /// demonstration backend is registered.
    pub fn new_safebet() -> Result<Self> {
        let mut builder = Self::builder().config(PipelineConfig::safebet());
        if std::env::var_os(DUMB_ENV).is_some() {
            builder = builder.backend(DumbBackend::demo());
        }
        builder.build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ScanError::Closed {
                node: COMPONENT.to_string(),
            });
        }
        Ok(())
    }

    /// Enumerate devices of every backend without opening them.
    pub fn list_devices(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        self.check_open()?;
        let devices = self.stack.list_devices(locations)?;
        self.logger.debug(
            COMPONENT,
            &format!("{} device(s) found ({locations:?})", devices.len()),
        );
        Ok(devices)
    }

    /// Open a device by the id reported from [`Registry::list_devices`].
    pub fn get_device(&self, dev_id: &str) -> Result<Device> {
        self.check_open()?;
        let item = self.stack.get_device(dev_id)?;
        self.logger.info(COMPONENT, &format!("opened {dev_id}"));
        let handle = Arc::new(OpenDevice::new(dev_id.to_string(), item));
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        opened.retain(|entry| entry.upgrade().is_some_and(|d| !d.is_closed()));
        opened.push(Arc::downgrade(&handle));
        Ok(Device::new(handle, self.logger.clone()))
    }

    /// Devices opened through this registry that are still open.
    pub fn open_devices(&self) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.upgrade().is_some_and(|d| !d.is_closed()))
            .count()
    }

    /// Close every device opened through this registry. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let opened =
            std::mem::take(&mut *self.opened.lock().unwrap_or_else(PoisonError::into_inner));
        let mut released = 0;
        for device in opened.iter().filter_map(Weak::upgrade) {
            if device.close() {
                debug!(dev_id = device.id(), "closed device on registry teardown");
                released += 1;
            }
        }
        self.logger.info(
            COMPONENT,
            &format!("registry closed, {released} device handle(s) released"),
        );
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.close();
    }
}

/// Explicit construction of a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    backends: Vec<AnyBackend>,
    config: Option<PipelineConfig>,
    retry: RetryConfig,
    logger: Option<Logger>,
}

impl RegistryBuilder {
    /// Add a backend. Device ids are prefixed with its name.
    pub fn backend<A: Api>(mut self, backend: A) -> Self {
        self.backends.push(AnyBackend::new(backend));
        self
    }

    /// Layer configuration. Defaults to [`PipelineConfig::safebet`].
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Safebet configuration overridden by the `SCANWERK_*` environment.
    pub fn config_from_env(self) -> Self {
        debug!(prefix = ENV_PREFIX, "reading layer configuration from the environment");
        self.config(PipelineConfig::from_env())
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Forward every log event to `sink` as well as to `tracing`.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.logger = Some(Logger::with_sink(sink));
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let logger = self.logger.unwrap_or_default();
        let config = self.config.unwrap_or_else(PipelineConfig::safebet);

        let mut backends = self.backends;
        if backends.is_empty() {
            logger.info(COMPONENT, "no backend registered, using the demonstration backend");
            backends.push(AnyBackend::new(DumbBackend::demo()));
        }

        let mux = Multiplexer::new(backends, logger.clone());
        let names: Vec<String> = mux.backend_names().into_iter().map(String::from).collect();
        logger.info(COMPONENT, &format!("backends: {}", names.join(", ")));
        let stack = scanwerk_pipeline::build(mux, &config, self.retry, &logger)?;

        Ok(Registry {
            stack,
            backends: names,
            config,
            logger,
            opened: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flatbed_device, flatbed_with_page, init_tracing, registry_with};
    use rstest::rstest;
    use scanwerk_backend::dumb::DumbPage;
    use scanwerk_core::config::LAYER_FLAGS;
    use scanwerk_core::logger::{LogLevel, MemorySink};
    use scanwerk_core::types::{ImageFormat, ScanParameters, Value};

    #[test]
    fn safebet_lists_the_demonstration_devices() {
        init_tracing();
        let registry = Registry::new_safebet().unwrap();
        assert_eq!(registry.config(), &PipelineConfig::safebet());

        let all = registry.list_devices(DeviceLocations::Any).unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.dev_id.as_str()).collect();
        assert_eq!(ids, ["dumb:flatbed0", "dumb:mfp0", "dumb:net0"]);
        assert_eq!(all[0].vendor, "HP");
        assert_eq!(all[0].model, "ScanJet 4850");

        let local = registry.list_devices(DeviceLocations::LocalOnly).unwrap();
        assert_eq!(local.len(), 2);
    }

    #[rstest]
    #[case("dumb:nope")]
    #[case("sane:dev0")]
    #[case("no-prefix")]
    fn unknown_ids_are_not_found(#[case] dev_id: &str) {
        let (registry, _) = registry_with(flatbed_device());
        assert!(matches!(
            registry.get_device(dev_id),
            Err(ScanError::NotFound { .. })
        ));
    }

    #[test]
    fn close_releases_devices_and_is_idempotent() {
        let (registry, _) = registry_with(flatbed_device());
        let device = registry.get_device("dumb:dev0").unwrap();
        registry.close();
        registry.close();
        assert!(matches!(device.options(), Err(ScanError::Closed { .. })));
        assert!(matches!(
            registry.list_devices(DeviceLocations::Any),
            Err(ScanError::Closed { .. })
        ));
    }

    #[test]
    fn closed_and_dropped_devices_are_released() {
        let (registry, _) = registry_with(flatbed_device());
        for _ in 0..1000 {
            let device = registry.get_device("dumb:dev0").unwrap();
            device.close();
        }
        for _ in 0..1000 {
            registry.get_device("dumb:dev0").unwrap();
        }
        assert_eq!(registry.open_devices(), 0);
        assert!(registry.opened.lock().unwrap().len() <= 1);

        let device = registry.get_device("dumb:dev0").unwrap();
        let source = device.source("flatbed").unwrap();
        drop(device);
        assert_eq!(registry.open_devices(), 1);
        let mut session = source.scan_start().unwrap();
        drop(source);
        assert_eq!(registry.open_devices(), 1);
        assert_eq!(session.read_page().unwrap().len(), 8 * 4 * 3);
        drop(session);
        assert_eq!(registry.open_devices(), 0);
    }

    #[test]
    fn passthrough_exposes_the_raw_backend() {
        let registry = Registry::builder()
            .backend(DumbBackend::demo())
            .config(PipelineConfig::passthrough())
            .build()
            .unwrap();
        let device = registry.get_device("dumb:flatbed0").unwrap();
        assert!(device.children().unwrap().is_empty());
        assert!(device.option("scan-resolution").is_ok());
    }

    #[test]
    fn sink_receives_engine_events() {
        let sink = Arc::new(MemorySink::new());
        let registry = Registry::builder()
            .backend(DumbBackend::demo())
            .sink(sink.clone())
            .build()
            .unwrap();
        registry.get_device("dumb:mfp0").unwrap();

        let events = sink.events();
        assert!(events
            .iter()
            .any(|(level, msg)| *level == LogLevel::Info && msg.contains("enabled layers")));
        assert!(events.iter().any(|(_, msg)| msg.contains("opened dumb:mfp0")));
    }

    struct FailingSink;

    impl LogSink for FailingSink {
        fn log(&self, _level: LogLevel, _message: &str) {
            panic!("sink failure");
        }
    }

    #[test]
    fn failing_sink_does_not_stop_a_scan() {
        let backend = DumbBackend::new("dumb");
        backend.add_device(flatbed_device());
        let registry = Registry::builder()
            .backend(backend)
            .sink(Arc::new(FailingSink))
            .build()
            .unwrap();
        let source = registry.get_device("dumb:dev0").unwrap().source("flatbed").unwrap();
        let mut session = source.scan_start().unwrap();
        assert_eq!(session.read_page().unwrap().len(), 8 * 4 * 3);
    }

    /// Turning any single layer off keeps the node, option and session
    /// contracts intact.
    #[rstest]
    fn every_layer_can_be_switched_off(
        #[values(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16)] index: usize,
    ) {
        init_tracing();
        let flag = LAYER_FLAGS[index];
        let backend = DumbBackend::new("dumb");
        backend.add_device(flatbed_with_page(DumbPage::new(ScanParameters::new(
            ImageFormat::Grayscale8,
            8,
            4,
        ))));
        let registry = Registry::builder()
            .backend(backend.clone())
            .config(PipelineConfig::safebet().with(flag, false))
            .retry(RetryConfig::immediate(1))
            .build()
            .unwrap();
        assert_eq!(registry.config().get(flag), Some(false));

        let device = registry.get_device("dumb:dev0").unwrap();
        let source = device.source("flatbed").unwrap();
        let resolution = source.option("resolution").unwrap();
        assert!(matches!(
            resolution.set_value(175),
            Err(ScanError::ConstraintViolation { .. })
        ));
        resolution.set_value(300).unwrap();
        assert_eq!(resolution.value().unwrap(), Value::Int(300));

        let mut session = source.scan_start().unwrap();
        let params = session.scan_parameters().unwrap();
        let page = session.read_page().unwrap();
        assert_eq!(page.len() as u64, params.image_size);
        assert!(session.end_of_feed().unwrap());
        assert!(!backend.is_busy("dev0"));
    }
}
