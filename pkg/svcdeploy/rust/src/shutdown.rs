// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process::ProcessHandle;
use crate::state::{ShutdownCause, SupervisorPhase};
use log::{debug, info, warn};
use nix::sys::signal::Signal;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::{Duration, Instant, timeout_at};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Everything the interrupt listener and the main flow both touch.
struct SupervisorState {
    phase: SupervisorPhase,
    cause: Option<ShutdownCause>,
    /// Only grows, and only while running.
    handles: Vec<ProcessHandle>,
    pending_probe: Option<CancellationToken>,
}

/// Owns the single `Running -> ShuttingDown -> Done` transition for a run.
pub struct ShutdownCoordinator {
    state: Mutex<SupervisorState>,
    phase_tx: watch::Sender<SupervisorPhase>,
    stop_signal: Signal,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(stop_signal: Signal, grace_period: Duration) -> Self {
        let (phase_tx, _) = watch::channel(SupervisorPhase::Running);
        Self {
            state: Mutex::new(SupervisorState {
                phase: SupervisorPhase::Running,
                cause: None,
                handles: Vec::new(),
                pending_probe: None,
            }),
            phase_tx,
            stop_signal,
            grace_period,
        }
    }

    fn state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.state().phase
    }

    pub fn handle_count(&self) -> usize {
        self.state().handles.len()
    }

    /// Add a freshly spawned process. If shutdown already started, the process
    /// missed the cascade, so it is stopped here and `false` is returned.
    pub fn register(&self, handle: ProcessHandle) -> bool {
        let mut st = self.state();
        if !st.phase.is_running() {
            handle.terminate(self.stop_signal);
            st.handles.push(handle);
            return false;
        }
        st.handles.push(handle);
        true
    }

    /// Reserve the probe slot. `None` once shutdown has begun, so a probe can
    /// never start after the cascade has already cancelled the slot.
    pub fn begin_probe(&self) -> Option<CancellationToken> {
        let mut st = self.state();
        if !st.phase.is_running() {
            return None;
        }
        let token = CancellationToken::new();
        st.pending_probe = Some(token.clone());
        Some(token)
    }

    pub fn end_probe(&self) {
        self.state().pending_probe = None;
    }

    fn transition(&self, st: &mut SupervisorState, next: SupervisorPhase) -> bool {
        if !st.phase.can_transition_to(next) {
            return false;
        }
        debug!("supervisor {} -> {next}", st.phase);
        st.phase = next;
        self.phase_tx.send_replace(next);
        true
    }

    /// Start the cascade. Only the first caller wins; it returns the number of
    /// stop requests sent once every relay has finished or been abandoned.
    /// Everyone else gets `None` immediately.
    pub async fn trigger(&self, cause: ShutdownCause) -> Option<usize> {
        let (relays, sent) = {
            let mut st = self.state();
            if !self.transition(&mut st, SupervisorPhase::ShuttingDown) {
                return None;
            }
            info!("Shutting down all services ({cause})");
            st.cause = Some(cause);
            if let Some(probe) = st.pending_probe.take() {
                probe.cancel();
            }
            let sent = st
                .handles
                .iter()
                .filter(|h| h.terminate(self.stop_signal))
                .count();
            let relays: Vec<_> = st
                .handles
                .iter_mut()
                .filter_map(|h| {
                    let (name, pid) = (h.name().to_string(), h.pid());
                    h.take_relay().map(|relay| (name, pid, relay))
                })
                .collect();
            (relays, sent)
        };

        // One deadline for the whole group, not one grace period per relay.
        let deadline = Instant::now() + self.grace_period;
        for (name, pid, relay) in relays {
            match timeout_at(deadline, relay).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{name}] output relay failed: {e}"),
                Err(_) => warn!(
                    "[{name}] output not drained within {}s, abandoning (pid={pid})",
                    self.grace_period.as_secs_f64()
                ),
            }
        }

        let mut st = self.state();
        self.transition(&mut st, SupervisorPhase::Done);
        info!("Done shutting down all services");
        Some(sent)
    }

    /// Block until shutdown is complete and report why it happened.
    pub async fn wait_done(&self) -> ShutdownCause {
        let mut rx = self.phase_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|phase| *phase == SupervisorPhase::Done).await;
        self.cause().unwrap_or(ShutdownCause::Interrupt)
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        self.state().cause.clone()
    }
}
