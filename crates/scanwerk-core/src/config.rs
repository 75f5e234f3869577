// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// One boolean flag per normalizer/workaround layer. The set is read once
// when a registry is built and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Prefix of the environment variables that toggle layers.
pub const ENV_PREFIX: &str = "SCANWERK_";

/// Every layer flag, innermost layer first.
pub const LAYER_FLAGS: [&str; 17] = [
    "workaround.retry_io",
    "workaround.check_capabilities",
    "workaround.cache",
    "workaround.lamp",
    "workaround.opt_names",
    "workaround.opt_values",
    "normalizer.raw24",
    "normalizer.resolution",
    "normalizer.clean_dev_descs",
    "normalizer.safe_defaults",
    "normalizer.source_nodes",
    "normalizer.min_one_source",
    "normalizer.source_names",
    "normalizer.source_types",
    "workaround.one_page_flatbed",
    "normalizer.all_opts_on_all_sources",
    "workaround.dedicated_thread",
];

fn enabled() -> bool {
    true
}

/// Which pipeline layers are active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "workaround.retry_io", default = "enabled")]
    pub retry_io: bool,
    #[serde(rename = "workaround.check_capabilities", default = "enabled")]
    pub check_capabilities: bool,
    #[serde(rename = "workaround.cache", default = "enabled")]
    pub cache: bool,
    #[serde(rename = "workaround.lamp", default = "enabled")]
    pub lamp: bool,
    #[serde(rename = "workaround.opt_names", default = "enabled")]
    pub opt_names: bool,
    #[serde(rename = "workaround.opt_values", default = "enabled")]
    pub opt_values: bool,
    #[serde(rename = "normalizer.raw24", default = "enabled")]
    pub raw24: bool,
    #[serde(rename = "normalizer.resolution", default = "enabled")]
    pub resolution: bool,
    #[serde(rename = "normalizer.clean_dev_descs", default = "enabled")]
    pub clean_dev_descs: bool,
    #[serde(rename = "normalizer.safe_defaults", default = "enabled")]
    pub safe_defaults: bool,
    #[serde(rename = "normalizer.source_nodes", default = "enabled")]
    pub source_nodes: bool,
    #[serde(rename = "normalizer.min_one_source", default = "enabled")]
    pub min_one_source: bool,
    #[serde(rename = "normalizer.source_names", default = "enabled")]
    pub source_names: bool,
    #[serde(rename = "normalizer.source_types", default = "enabled")]
    pub source_types: bool,
    #[serde(rename = "workaround.one_page_flatbed", default = "enabled")]
    pub one_page_flatbed: bool,
    #[serde(rename = "normalizer.all_opts_on_all_sources", default = "enabled")]
    pub all_opts_on_all_sources: bool,
    #[serde(rename = "workaround.dedicated_thread", default = "enabled")]
    pub dedicated_thread: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::safebet()
    }
}

impl PipelineConfig {
    /// Every layer enabled. Correct by default for unknown hardware.
    pub fn safebet() -> Self {
        Self::all(true)
    }

    /// Every layer disabled: the raw backend behaviour.
    pub fn passthrough() -> Self {
        Self::all(false)
    }

    fn all(on: bool) -> Self {
        Self {
            retry_io: on,
            check_capabilities: on,
            cache: on,
            lamp: on,
            opt_names: on,
            opt_values: on,
            raw24: on,
            resolution: on,
            clean_dev_descs: on,
            safe_defaults: on,
            source_nodes: on,
            min_one_source: on,
            source_names: on,
            source_types: on,
            one_page_flatbed: on,
            all_opts_on_all_sources: on,
            dedicated_thread: on,
        }
    }

    fn flag_mut(&mut self, flag: &str) -> Option<&mut bool> {
        Some(match flag {
            "workaround.retry_io" => &mut self.retry_io,
            "workaround.check_capabilities" => &mut self.check_capabilities,
            "workaround.cache" => &mut self.cache,
            "workaround.lamp" => &mut self.lamp,
            "workaround.opt_names" => &mut self.opt_names,
            "workaround.opt_values" => &mut self.opt_values,
            "normalizer.raw24" => &mut self.raw24,
            "normalizer.resolution" => &mut self.resolution,
            "normalizer.clean_dev_descs" => &mut self.clean_dev_descs,
            "normalizer.safe_defaults" => &mut self.safe_defaults,
            "normalizer.source_nodes" => &mut self.source_nodes,
            "normalizer.min_one_source" => &mut self.min_one_source,
            "normalizer.source_names" => &mut self.source_names,
            "normalizer.source_types" => &mut self.source_types,
            "workaround.one_page_flatbed" => &mut self.one_page_flatbed,
            "normalizer.all_opts_on_all_sources" => &mut self.all_opts_on_all_sources,
            "workaround.dedicated_thread" => &mut self.dedicated_thread,
            _ => return None,
        })
    }

    /// Every flag with its state, innermost layer first.
    pub fn flags(&self) -> [(&'static str, bool); 17] {
        [
            (LAYER_FLAGS[0], self.retry_io),
            (LAYER_FLAGS[1], self.check_capabilities),
            (LAYER_FLAGS[2], self.cache),
            (LAYER_FLAGS[3], self.lamp),
            (LAYER_FLAGS[4], self.opt_names),
            (LAYER_FLAGS[5], self.opt_values),
            (LAYER_FLAGS[6], self.raw24),
            (LAYER_FLAGS[7], self.resolution),
            (LAYER_FLAGS[8], self.clean_dev_descs),
            (LAYER_FLAGS[9], self.safe_defaults),
            (LAYER_FLAGS[10], self.source_nodes),
            (LAYER_FLAGS[11], self.min_one_source),
            (LAYER_FLAGS[12], self.source_names),
            (LAYER_FLAGS[13], self.source_types),
            (LAYER_FLAGS[14], self.one_page_flatbed),
            (LAYER_FLAGS[15], self.all_opts_on_all_sources),
            (LAYER_FLAGS[16], self.dedicated_thread),
        ]
    }

    /// State of a layer flag, `None` if the flag is unknown.
    pub fn get(&self, flag: &str) -> Option<bool> {
        self.flags()
            .into_iter()
            .find(|(name, _)| *name == flag)
            .map(|(_, on)| on)
    }

    /// Set a layer flag. Returns `false` (and changes nothing) for unknown flags.
    pub fn set(&mut self, flag: &str, on: bool) -> bool {
        match self.flag_mut(flag) {
            Some(slot) => {
                *slot = on;
                true
            }
            None => {
                debug!(flag, "ignoring unknown pipeline flag");
                false
            }
        }
    }

    pub fn with(mut self, flag: &str, on: bool) -> Self {
        self.set(flag, on);
        self
    }

    /// Safebet configuration overridden by explicit flags.
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        let mut config = Self::safebet();
        for (flag, on) in flags {
            config.set(flag, on);
        }
        config
    }

    /// Safebet configuration overridden by `SCANWERK_NORMALIZER_*` and
    /// `SCANWERK_WORKAROUND_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::safebet();
        for flag in LAYER_FLAGS {
            let key = env_key(flag);
            let Some(raw) = lookup(&key) else { continue };
            match parse_switch(&raw) {
                Some(on) => {
                    debug!(%key, on, "pipeline flag from environment");
                    config.set(flag, on);
                }
                None => debug!(%key, value = %raw, "ignoring unparsable pipeline flag"),
            }
        }
        config
    }

    /// Parse a JSON object of `"flag": bool` pairs on top of safebet.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut config = Self::safebet();
        for (flag, value) in &map {
            match value.as_bool() {
                Some(on) => {
                    config.set(flag, on);
                }
                None => debug!(flag = %flag, "ignoring non-boolean pipeline flag"),
            }
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Flags of the enabled layers, innermost first.
    pub fn enabled_layers(&self) -> Vec<&'static str> {
        self.flags()
            .into_iter()
            .filter_map(|(flag, on)| on.then_some(flag))
            .collect()
    }
}

/// `normalizer.raw24` -> `SCANWERK_NORMALIZER_RAW24`.
pub fn env_key(flag: &str) -> String {
    format!("{ENV_PREFIX}{}", flag.replace('.', "_").to_ascii_uppercase())
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn safebet_enables_everything() {
        let config = PipelineConfig::safebet();
        assert_eq!(config.enabled_layers().len(), LAYER_FLAGS.len());
        assert_eq!(config, PipelineConfig::default());
        assert!(PipelineConfig::passthrough().enabled_layers().is_empty());
    }

    #[test]
    fn unknown_flags_are_ignored() {
        let mut config = PipelineConfig::safebet();
        assert!(!config.set("normalizer.does_not_exist", false));
        assert_eq!(config, PipelineConfig::safebet());
        assert_eq!(config.get("normalizer.does_not_exist"), None);
    }

    #[test]
    fn from_flags_overrides_safebet() {
        let config =
            PipelineConfig::from_flags([("normalizer.raw24", false), ("bogus.flag", false)]);
        assert!(!config.raw24);
        assert!(config.cache);
    }

    #[test]
    fn env_keys() {
        assert_eq!(env_key("normalizer.raw24"), "SCANWERK_NORMALIZER_RAW24");
        assert_eq!(
            env_key("workaround.dedicated_thread"),
            "SCANWERK_WORKAROUND_DEDICATED_THREAD"
        );
    }

    #[test]
    fn from_lookup_reads_switches() {
        let vars: HashMap<&str, &str> = [
            ("SCANWERK_NORMALIZER_RAW24", "0"),
            ("SCANWERK_WORKAROUND_LAMP", "off"),
            ("SCANWERK_WORKAROUND_CACHE", "maybe"),
        ]
        .into_iter()
        .collect();
        let config = PipelineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!config.raw24);
        assert!(!config.lamp);
        assert!(config.cache, "unparsable value keeps the default");
    }

    #[test]
    fn json_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::safebet().with("workaround.dedicated_thread", false);
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn from_json_tolerates_unknown_and_non_boolean() {
        let config = PipelineConfig::from_json(
            r#"{"normalizer.resolution": false, "future.layer": true, "workaround.cache": "no"}"#,
        )
        .unwrap();
        assert!(!config.resolution);
        assert!(config.cache);
        assert!(PipelineConfig::from_json("[1, 2]").is_err());
    }
}
