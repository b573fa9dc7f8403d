// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Launches a fixed group of network services, waits for each to accept
//! connections in order, and tears the whole group down together on an
//! interrupt or on the first service that fails to come up.

pub mod config;
pub mod plan;
pub mod probe;
pub mod process;
pub mod shutdown;
pub mod state;
pub mod supervisor;

pub use plan::{LaunchPlan, PlanOverrides, ServiceSpec};
pub use state::{ShutdownCause, SupervisorPhase};
pub use supervisor::{Supervisor, SupervisorOptions};
