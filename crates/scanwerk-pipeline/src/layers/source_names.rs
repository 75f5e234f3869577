// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// normalizer.source_names: source names start with `flatbed` or `feeder`
// whenever the driver name can be recognized.

use std::sync::LazyLock;

use regex::Regex;
use scanwerk_backend::traits::Item;
use scanwerk_core::error::Result;
use scanwerk_core::logger::Logger;
use scanwerk_core::names::{SOURCE_FEEDER, SOURCE_FLATBED};

use crate::layer::{Layer, Node};

struct Rule {
    pattern: Regex,
    prefix: &'static str,
    lowercase: bool,
}

/// (pattern, replacement prefix, lowercase the captured rest)
const RULES: &[(&str, &str, bool)] = &[
    (r"(?i)^flatbed(.*)$", SOURCE_FLATBED, false),
    (r"(?i)^feeder(.*)$", SOURCE_FEEDER, false),
    // SANE
    (r"(?i)^adf(.*)$", SOURCE_FEEDER, false),
    (r"(?i)^automatic document feeder(.*)$", SOURCE_FEEDER, false),
    // SANE + Epson Perfection
    (r"(?i)^document table(.*)$", SOURCE_FLATBED, false),
    // WIA item paths: "0000\Root\Flatbed"
    (r"(?i)^[0-9]+\\Root\\(.*)$", "", true),
];

static COMPILED: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, prefix, lowercase)| {
            Regex::new(pattern).ok().map(|pattern| Rule {
                pattern,
                prefix: *prefix,
                lowercase: *lowercase,
            })
        })
        .collect()
});

/// Canonical name of a source, `None` when no rule matches.
pub fn normalize_source_name(name: &str) -> Option<String> {
    COMPILED.iter().find_map(|rule| {
        let rest = rule.pattern.captures(name)?.get(1)?.as_str();
        let rest = if rule.lowercase {
            rest.to_lowercase()
        } else {
            rest.to_string()
        };
        Some(format!("{}{rest}", rule.prefix))
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceNames;

impl Layer for SourceNames {
    const NAME: &'static str = "normalizer.source_names";
    type DeviceState = ();
    type SessionState = ();

    fn filter_node<I: Item>(&self, node: &mut Node<I>, _device: &(), logger: &Logger) -> Result<()> {
        if node.is_root() {
            return Ok(());
        }
        match normalize_source_name(&node.name) {
            Some(name) => {
                if name != node.name {
                    logger.info(Self::NAME, &format!("source '{}' -> '{name}'", node.name));
                }
                node.name = name;
            }
            None => logger.warning(
                Self::NAME,
                &format!("failed to normalize name of source '{}'", node.name),
            ),
        }
        Ok(())
    }
}
