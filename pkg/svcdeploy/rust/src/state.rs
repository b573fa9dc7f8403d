// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// Services are being launched or are up.
    Running,
    /// A trigger won; stop requests are going out and relays are draining.
    ShuttingDown,
    /// Every relay wait has been issued. Terminal.
    Done,
}

impl SupervisorPhase {
    pub fn is_running(self) -> bool {
        self == SupervisorPhase::Running
    }

    pub(crate) fn can_transition_to(self, next: SupervisorPhase) -> bool {
        use SupervisorPhase::*;
        matches!((self, next), (Running, ShuttingDown) | (ShuttingDown, Done))
    }
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorPhase::Running => write!(f, "running"),
            SupervisorPhase::ShuttingDown => write!(f, "shutting down"),
            SupervisorPhase::Done => write!(f, "done"),
        }
    }
}

/// Why the run ended. Recorded once, by whichever trigger won the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// SIGINT/SIGTERM received. The expected way to stop a healthy deployment.
    Interrupt,
    /// A service did not accept connections within the readiness timeout.
    ReadinessFailure { service: String, command: String },
    /// A command could not be started at all.
    SpawnFailure { service: String, error: String },
}

impl ShutdownCause {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ShutdownCause::Interrupt)
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_failure() { 1 } else { 0 }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Interrupt => write!(f, "interrupt"),
            ShutdownCause::ReadinessFailure { service, .. } => {
                write!(f, "readiness failure of {service}")
            }
            ShutdownCause::SpawnFailure { service, error } => {
                write!(f, "failed to spawn {service}: {error}")
            }
        }
    }
}
