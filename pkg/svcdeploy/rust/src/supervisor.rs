// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::DeployConfig;
use crate::plan::{LaunchPlan, ServiceSpec};
use crate::probe::{ReadinessProbe, ReadinessResult, TcpProbe};
use crate::process::{ProcessHandle, Sink, stdout_sink};
use crate::shutdown::{DEFAULT_GRACE_PERIOD, ShutdownCoordinator};
use crate::state::ShutdownCause;
use anyhow::{Context, Result};
use log::{debug, error, info};
use nix::sys::signal::Signal;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub readiness_timeout: Duration,
    pub grace_period: Duration,
    pub probe_host: String,
    pub stop_signal: Signal,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            probe_host: "127.0.0.1".to_string(),
            stop_signal: Signal::SIGINT,
        }
    }
}

impl SupervisorOptions {
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let stop_signal = config
            .stop_signal
            .parse::<Signal>()
            .with_context(|| format!("invalid stop_signal: {}", config.stop_signal))?;
        Ok(Self {
            readiness_timeout: Duration::from_secs(config.readiness_timeout_secs),
            grace_period: Duration::from_secs(config.grace_period_secs),
            probe_host: config.probe_host.clone(),
            stop_signal,
        })
    }
}

pub struct Supervisor<P = TcpProbe> {
    options: SupervisorOptions,
    probe: P,
    sink: Sink,
    coordinator: Arc<ShutdownCoordinator>,
}

impl Supervisor<TcpProbe> {
    pub fn new(options: SupervisorOptions) -> Self {
        Self::with_probe(options, TcpProbe::default())
    }
}

impl<P: ReadinessProbe> Supervisor<P> {
    pub fn with_probe(options: SupervisorOptions, probe: P) -> Self {
        let coordinator = Arc::new(ShutdownCoordinator::new(
            options.stop_signal,
            options.grace_period,
        ));
        Self {
            options,
            probe,
            sink: stdout_sink(),
            coordinator,
        }
    }

    /// Relay child output somewhere other than stdout.
    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    /// Handle for triggering shutdown from outside the run loop.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Launch every service, verify readiness in plan order, then wait until
    /// the deployment is shut down. Returns why it stopped.
    pub async fn run(&self, plan: LaunchPlan) -> Result<ShutdownCause> {
        let specs = plan.into_services();

        if let Err(cause) = self.launch(&specs) {
            self.coordinator.trigger(cause).await;
            return Ok(self.coordinator.wait_done().await);
        }
        info!("launched {} service(s)", self.coordinator.handle_count());

        let interrupts = listen_for_interrupts(Arc::clone(&self.coordinator))?;

        if self.verify_readiness(&specs).await {
            info!("Done starting all services");
        }

        let cause = self.coordinator.wait_done().await;
        interrupts.abort();
        Ok(cause)
    }

    fn launch(&self, specs: &[ServiceSpec]) -> Result<(), ShutdownCause> {
        for spec in specs {
            let mut handle = match ProcessHandle::spawn(spec.clone()) {
                Ok(handle) => handle,
                Err(e) => {
                    error!("{e:#}");
                    return Err(ShutdownCause::SpawnFailure {
                        service: spec.name.clone(),
                        error: format!("{e:#}"),
                    });
                }
            };
            handle.start_relay(Arc::clone(&self.sink));
            if !self.coordinator.register(handle) {
                debug!("shutdown began during launch, not starting the rest");
                break;
            }
        }
        Ok(())
    }

    /// Probe each service in order. Returns true only if all became ready.
    async fn verify_readiness(&self, specs: &[ServiceSpec]) -> bool {
        for spec in specs {
            let Some(cancel) = self.coordinator.begin_probe() else {
                debug!("shutdown underway, skipping remaining readiness checks");
                return false;
            };
            let address = format!("{}:{}", self.options.probe_host, spec.port);
            let result = self
                .probe
                .probe(&address, self.options.readiness_timeout, &cancel)
                .await;
            self.coordinator.end_probe();

            match result {
                ReadinessResult::Ready => info!("[{}] ready on {address}", spec.name),
                ReadinessResult::Timeout => {
                    error!("Failed to launch: {}", spec.command_line());
                    self.coordinator
                        .trigger(ShutdownCause::ReadinessFailure {
                            service: spec.name.clone(),
                            command: spec.command_line(),
                        })
                        .await;
                    return false;
                }
                ReadinessResult::Cancelled => {
                    debug!("[{}] readiness check cancelled", spec.name);
                    return false;
                }
            }
        }
        true
    }
}

fn listen_for_interrupts(coordinator: Arc<ShutdownCoordinator>) -> Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
            coordinator.trigger(ShutdownCause::Interrupt).await;
        }
    }))
}
