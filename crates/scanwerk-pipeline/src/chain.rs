// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The statically composed layer stack.
//
// Every layer is always part of the type; the configuration only decides
// which ones are switched on. Order is fixed, innermost first, matching
// `scanwerk_core::config::LAYER_FLAGS`.

use scanwerk_backend::traits::Api;
use scanwerk_core::config::PipelineConfig;
use scanwerk_core::error::Result;
use scanwerk_core::logger::Logger;

use crate::layer::LayerApi;
use crate::layers::{
    AllOptsOnAllSources, Cache, CheckCapabilities, CleanDevDescs, Lamp, MinOneSource,
    OnePageFlatbed, OptNames, OptValues, Raw24, Resolution, RetryIo, SafeDefaults, SourceNames,
    SourceNodes, SourceTypes,
};
use crate::retry::RetryConfig;
use crate::threaded::Threaded;

/// `A` wrapped in every layer.
pub type Chain<A> = Threaded<
    LayerApi<
        AllOptsOnAllSources,
        LayerApi<
            OnePageFlatbed,
            LayerApi<
                SourceTypes,
                LayerApi<
                    SourceNames,
                    LayerApi<
                        MinOneSource,
                        LayerApi<
                            SourceNodes,
                            LayerApi<
                                SafeDefaults,
                                LayerApi<
                                    CleanDevDescs,
                                    LayerApi<
                                        Resolution,
                                        LayerApi<
                                            Raw24,
                                            LayerApi<
                                                OptValues,
                                                LayerApi<
                                                    OptNames,
                                                    LayerApi<
                                                        Lamp,
                                                        LayerApi<
                                                            Cache,
                                                            LayerApi<
                                                                CheckCapabilities,
                                                                LayerApi<RetryIo, A>,
                                                            >,
                                                        >,
                                                    >,
                                                >,
                                            >,
                                        >,
                                    >,
                                >,
                            >,
                        >,
                    >,
                >,
            >,
        >,
    >,
>;

/// Wrap `backend` in the whole pipeline.
pub fn build<A: Api>(
    backend: A,
    config: &PipelineConfig,
    retry: RetryConfig,
    logger: &Logger,
) -> Result<Chain<A>> {
    let log = || logger.clone();
    let api = LayerApi::new(RetryIo::new(retry), config.retry_io, log(), backend);
    let api = LayerApi::new(CheckCapabilities, config.check_capabilities, log(), api);
    let api = LayerApi::new(Cache, config.cache, log(), api);
    let api = LayerApi::new(Lamp, config.lamp, log(), api);
    let api = LayerApi::new(OptNames, config.opt_names, log(), api);
    let api = LayerApi::new(OptValues, config.opt_values, log(), api);
    let api = LayerApi::new(Raw24, config.raw24, log(), api);
    let api = LayerApi::new(Resolution, config.resolution, log(), api);
    let api = LayerApi::new(CleanDevDescs, config.clean_dev_descs, log(), api);
    let api = LayerApi::new(SafeDefaults, config.safe_defaults, log(), api);
    let api = LayerApi::new(SourceNodes, config.source_nodes, log(), api);
    let api = LayerApi::new(MinOneSource, config.min_one_source, log(), api);
    let api = LayerApi::new(SourceNames, config.source_names, log(), api);
    let api = LayerApi::new(SourceTypes, config.source_types, log(), api);
    let api = LayerApi::new(OnePageFlatbed, config.one_page_flatbed, log(), api);
    let api = LayerApi::new(AllOptsOnAllSources, config.all_opts_on_all_sources, log(), api);

    logger.info(
        "pipeline",
        &format!("enabled layers: {}", config.enabled_layers().join(", ")),
    );
    Threaded::new(api, config.dedicated_thread, logger)
}
