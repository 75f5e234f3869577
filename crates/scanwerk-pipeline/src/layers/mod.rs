// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Every normalizer and workaround, one module each.

pub mod all_opts_on_all_sources;
pub mod cache;
pub mod check_capabilities;
pub mod clean_dev_descs;
pub mod lamp;
pub mod min_one_source;
pub mod one_page_flatbed;
pub mod opt_names;
pub mod opt_values;
pub mod raw24;
pub mod resolution;
pub mod retry_io;
pub mod safe_defaults;
pub mod source_names;
pub mod source_nodes;
pub mod source_types;

pub use all_opts_on_all_sources::AllOptsOnAllSources;
pub use cache::Cache;
pub use check_capabilities::CheckCapabilities;
pub use clean_dev_descs::CleanDevDescs;
pub use lamp::Lamp;
pub use min_one_source::MinOneSource;
pub use one_page_flatbed::OnePageFlatbed;
pub use opt_names::OptNames;
pub use opt_values::OptValues;
pub use raw24::Raw24;
pub use resolution::Resolution;
pub use retry_io::RetryIo;
pub use safe_defaults::SafeDefaults;
pub use source_names::SourceNames;
pub use source_nodes::SourceNodes;
pub use source_types::SourceTypes;

use scanwerk_backend::traits::{Item, ScanOption};
use scanwerk_core::error::Result;
use scanwerk_core::types::OptionDescriptor;

/// First option of `item` named `name` (ASCII case-insensitive).
pub(crate) fn find_option<I: Item>(
    item: &I,
    name: &str,
) -> Result<Option<(I::Opt, OptionDescriptor)>> {
    for opt in item.options()? {
        let desc = opt.descriptor()?;
        if desc.name.eq_ignore_ascii_case(name) {
            return Ok(Some((opt, desc)));
        }
    }
    Ok(None)
}
