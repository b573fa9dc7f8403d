// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::DeployConfig;
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;

pub const EVENTS_SERVICE_NAME: &str = "events";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate service name '{0}'")]
    DuplicateName(String),

    #[error("services '{first}' and '{second}' both use port {port}")]
    DuplicatePort {
        port: u16,
        first: String,
        second: String,
    },

    #[error("service '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("invalid port override '{0}', expected NAME=PORT")]
    InvalidPortOverride(String),
}

/// One child process to launch. Immutable once the plan is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub port: u16,
    /// Address of the shared events service this one registers with.
    pub depends_on_address: Option<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            command,
            port,
            depends_on_address: None,
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Values taken from the command line that override or extend the config file.
#[derive(Debug, Clone, Default)]
pub struct PlanOverrides {
    pub events_address: Option<String>,
    pub events_port: Option<u16>,
    /// Optional services to launch.
    pub include: Vec<String>,
    /// `NAME=PORT` pairs.
    pub ports: Vec<String>,
    pub discovery: bool,
}

/// Ordered services to start. Later services may depend on earlier ones, so the
/// order is also the readiness order.
#[derive(Debug, Clone, Default)]
pub struct LaunchPlan {
    services: Vec<ServiceSpec>,
}

impl LaunchPlan {
    pub fn new(services: Vec<ServiceSpec>) -> Self {
        Self { services }
    }

    pub fn build(config: &DeployConfig, overrides: &PlanOverrides) -> Result<Self, PlanError> {
        let port_overrides = parse_port_overrides(&overrides.ports)?;

        let known: HashSet<&str> = config
            .services
            .iter()
            .map(|s| s.name.as_str())
            .chain(config.events.as_ref().map(|_| EVENTS_SERVICE_NAME))
            .collect();
        for name in overrides.include.iter().chain(port_overrides.keys()) {
            if !known.contains(name.as_str()) {
                return Err(PlanError::UnknownService(name.clone()));
            }
        }

        let mut services = Vec::new();
        let external = overrides
            .events_address
            .clone()
            .or_else(|| config.events_address.clone());
        let events_address = match (external, &config.events) {
            (Some(addr), _) => Some(addr),
            (None, Some(events)) => {
                let port = overrides
                    .events_port
                    .or_else(|| port_overrides.get(EVENTS_SERVICE_NAME).copied())
                    .unwrap_or(events.port);
                let mut command = vec![events.command.clone()];
                command.extend(events.args.iter().cloned());
                services.push(ServiceSpec::new(EVENTS_SERVICE_NAME, command, port));
                Some(format!("127.0.0.1:{port}"))
            }
            (None, None) => None,
        };

        for svc in &config.services {
            if svc.optional && !overrides.include.contains(&svc.name) {
                debug!("[{}] optional and not included, skipping", svc.name);
                continue;
            }
            let mut command = vec![svc.command.clone()];
            command.extend(svc.args.iter().cloned());
            services.push(ServiceSpec {
                name: svc.name.clone(),
                command,
                port: port_overrides.get(&svc.name).copied().unwrap_or(svc.port),
                depends_on_address: events_address.clone(),
                env: svc
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                working_dir: svc.working_dir.as_ref().map(PathBuf::from),
            });
        }

        let discovery = overrides.discovery || config.discovery;
        for spec in &mut services {
            let port = spec.port.to_string();
            spec.command.extend(["-p".to_string(), port]);
            if let Some(ref addr) = spec.depends_on_address {
                spec.command.extend(["--events".to_string(), addr.clone()]);
            }
            if discovery {
                spec.command.push("--register".to_string());
            }
        }

        let plan = Self { services };
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), PlanError> {
        let mut names = HashSet::new();
        let mut ports: BTreeMap<u16, &str> = BTreeMap::new();
        for spec in &self.services {
            if spec.program().is_empty() {
                return Err(PlanError::EmptyCommand(spec.name.clone()));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(PlanError::DuplicateName(spec.name.clone()));
            }
            if let Some(first) = ports.insert(spec.port, &spec.name) {
                return Err(PlanError::DuplicatePort {
                    port: spec.port,
                    first: first.to_string(),
                    second: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn into_services(self) -> Vec<ServiceSpec> {
        self.services
    }
}

fn parse_port_overrides(raw: &[String]) -> Result<BTreeMap<String, u16>, PlanError> {
    raw.iter()
        .map(|entry| {
            let (name, port) = entry
                .split_once('=')
                .ok_or_else(|| PlanError::InvalidPortOverride(entry.clone()))?;
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| PlanError::InvalidPortOverride(entry.clone()))?;
            Ok((name.trim().to_string(), port))
        })
        .collect()
}
