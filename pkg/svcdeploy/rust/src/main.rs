// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use svc_deploy::config::{config_path, load_config};
use svc_deploy::{LaunchPlan, PlanOverrides, Supervisor, SupervisorOptions};
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Launch a group of services and keep them up together")]
struct Args {
    /// Deployment file. Defaults to $SVC_DEPLOY_CONFIG, then /etc/svc-deploy/deploy.yaml.
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// An existing events service to use instead of launching one.
    #[arg(long, value_name = "HOST:PORT")]
    events_address: Option<String>,

    /// The port to launch the events service on.
    #[arg(long, value_name = "PORT")]
    events_port: Option<u16>,

    /// Also launch this optional service. Repeatable.
    #[arg(long, value_name = "NAME")]
    include: Vec<String>,

    /// Override a service's port. Repeatable.
    #[arg(long = "port", value_name = "NAME=PORT")]
    ports: Vec<String>,

    /// Ask every service to register itself for discovery.
    #[arg(long)]
    discovery: bool,

    /// Seconds each service gets to start accepting connections.
    #[arg(long, value_name = "SECS")]
    readiness_timeout: Option<u64>,

    /// Seconds to wait for each service's output after asking it to stop.
    #[arg(long, value_name = "SECS")]
    grace_period: Option<u64>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level)?;
    info!("svc-deploy starting (version {})", env!("CARGO_PKG_VERSION"));

    let path = args.config_file.clone().unwrap_or_else(config_path);
    let config = load_config(&path)?;

    let mut options = SupervisorOptions::from_config(&config)?;
    if let Some(secs) = args.readiness_timeout {
        options.readiness_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.grace_period {
        options.grace_period = Duration::from_secs(secs);
    }

    let overrides = PlanOverrides {
        events_address: args.events_address,
        events_port: args.events_port,
        include: args.include,
        ports: args.ports,
        discovery: args.discovery,
    };
    let plan = LaunchPlan::build(&config, &overrides)?;
    if plan.is_empty() {
        error!("no services to launch in {}", path.display());
        return Ok(ExitCode::FAILURE);
    }
    info!("launching {} service(s)", plan.len());

    let cause = Supervisor::new(options).run(plan).await?;
    info!("svc-deploy exiting after {cause}");
    Ok(ExitCode::from(cause.exit_code()))
}
