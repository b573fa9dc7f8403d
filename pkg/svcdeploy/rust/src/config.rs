// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/svc-deploy/deploy.yaml";
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

fn default_readiness_timeout() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECS
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}

fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

fn default_stop_signal() -> String {
    "SIGINT".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Existing events service to use instead of launching `events`.
    pub events_address: Option<String>,
    pub events: Option<EventsConfig>,
    #[serde(default)]
    pub discovery: bool,
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub port: u16,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<String>,
    /// Launched only when named by `--include`.
    #[serde(default)]
    pub optional: bool,
}

pub fn config_path() -> PathBuf {
    std::env::var("SVC_DEPLOY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config(path: &Path) -> Result<DeployConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: DeployConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    debug!(
        "loaded {} service config(s) from {}",
        config.services.len(),
        path.display()
    );
    Ok(config)
}
