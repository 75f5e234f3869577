// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.source_types: give unidentified nodes a type, guessed from
// their name.

use std::sync::LazyLock;

use regex::Regex;
use scanwerk_backend::traits::Item;
use scanwerk_core::error::Result;
use scanwerk_core::logger::Logger;
use scanwerk_core::types::ItemType;

use crate::layer::{Layer, Node};

const RULES: &[(&str, ItemType)] = &[
    (r"(?i)flatbed", ItemType::Flatbed),
    (r"(?i)automatic document feeder", ItemType::Adf),
    (r"(?i)adf", ItemType::Adf),
    (r"(?i)feeder", ItemType::Adf),
];

static COMPILED: LazyLock<Vec<(Regex, ItemType)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, *kind)))
        .collect()
});

/// Type suggested by a source name.
pub fn guess_source_type(name: &str) -> Option<ItemType> {
    COMPILED
        .iter()
        .find(|(re, _)| re.is_match(name))
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceTypes;

impl Layer for SourceTypes {
    const NAME: &'static str = "normalizer.source_types";
    type DeviceState = ();
    type SessionState = ();

    fn filter_node<I: Item>(&self, node: &mut Node<I>, _device: &(), logger: &Logger) -> Result<()> {
        if node.kind != ItemType::Unidentified {
            return Ok(());
        }
        if node.is_root() {
            node.kind = ItemType::Device;
            return Ok(());
        }
        match guess_source_type(&node.name) {
            Some(kind) => {
                logger.info(Self::NAME, &format!("source '{}': type {kind:?}", node.name));
                node.kind = kind;
            }
            None => logger.warning(
                Self::NAME,
                &format!("failed to identify type of source '{}'", node.name),
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::wrap;
    use rstest::rstest;
    use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbSource};
    use scanwerk_backend::traits::Api;

    fn backend(source: &str, kind: ItemType) -> DumbBackend {
        let backend = DumbBackend::new("dumb");
        backend.add_device(DumbDevice::new("dev0", "Acme", "Scan").with_source(DumbSource::new(source, kind)));
        backend
    }

    #[rstest]
    #[case("flatbed", ItemType::Unidentified, ItemType::Flatbed)]
    #[case("feeder", ItemType::Unidentified, ItemType::Adf)]
    #[case("Rear ADF", ItemType::Unidentified, ItemType::Adf)]
    #[case("Automatic Document Feeder", ItemType::Unidentified, ItemType::Adf)]
    #[case("Transparency", ItemType::Unidentified, ItemType::Unidentified)]
    #[case("flatbed", ItemType::Adf, ItemType::Adf)]
    fn types_are_guessed(#[case] name: &str, #[case] kind: ItemType, #[case] expected: ItemType) {
        let api = wrap(SourceTypes, true, backend(name, kind));
        let dev = api.get_device("dev0").unwrap();
        assert_eq!(dev.kind(), ItemType::Device);
        assert_eq!(dev.children().unwrap()[0].kind(), expected);
    }

    #[test]
    fn disabled_layer_keeps_unidentified() {
        let api = wrap(SourceTypes, false, backend("flatbed", ItemType::Unidentified));
        let dev = api.get_device("dev0").unwrap();
        assert_eq!(dev.children().unwrap()[0].kind(), ItemType::Unidentified);
    }
}
