// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::plan::ServiceSpec;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::Write;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Destination for relayed child output. Shared by every relay task.
pub type Sink = Arc<Mutex<dyn Write + Send>>;

pub fn stdout_sink() -> Sink {
    Arc::new(Mutex::new(std::io::stdout()))
}

type ExitSlot = Arc<Mutex<Option<ExitStatus>>>;

pub struct ProcessHandle {
    spec: ServiceSpec,
    pid: u32,
    exit_status: ExitSlot,
    /// Child and read end of its output pipe, until the relay takes them.
    pending: Option<(Child, pipe::Receiver)>,
    relay: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Launch `spec` with stdout and stderr sharing one pipe.
    pub fn spawn(spec: ServiceSpec) -> Result<Self> {
        let (tx, rx) = pipe::pipe().context("creating output pipe")?;
        let out = tx.into_blocking_fd().context("creating output pipe")?;
        let err = out.try_clone().context("duplicating output pipe")?;

        let mut cmd = Command::new(spec.program());
        cmd.args(spec.args())
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(std::process::Stdio::null())
            .stdout(out)
            .stderr(err);
        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("[{}] failed to spawn: {}", spec.name, spec.program()))?;
        // Dropping `cmd` closes our copies of the write end so the relay sees EOF
        // once the child (and anything it forked) is gone.
        drop(cmd);

        let pid = child.id().context("spawned child has no pid")?;
        info!(
            "[{}] spawned (pid={}, cmd={})",
            spec.name,
            pid,
            spec.command_line()
        );
        Ok(Self {
            spec,
            pid,
            exit_status: Arc::new(Mutex::new(None)),
            pending: Some((child, rx)),
            relay: None,
        })
    }

    /// Start forwarding the child's output to `sink`. Subsequent calls are no-ops.
    pub fn start_relay(&mut self, sink: Sink) {
        let Some((child, rx)) = self.pending.take() else {
            return;
        };
        let name = self.spec.name.clone();
        let exit_status = Arc::clone(&self.exit_status);
        self.relay = Some(tokio::spawn(relay_output(
            name,
            child,
            rx,
            sink,
            exit_status,
        )));
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self
            .exit_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Ask the process to stop. Returns false when it had already exited.
    pub fn terminate(&self, sig: Signal) -> bool {
        let exit_status = self
            .exit_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if exit_status.is_some() {
            debug!("[{}] already exited, not sending {sig}", self.spec.name);
            return false;
        }
        info!("[{}] sending {sig}", self.spec.name);
        match signal::kill(Pid::from_raw(self.pid as i32), sig) {
            Ok(()) => true,
            Err(Errno::ESRCH) => {
                debug!("[{}] process already gone", self.spec.name);
                false
            }
            Err(e) => {
                warn!("[{}] failed to send {sig}: {e}", self.spec.name);
                false
            }
        }
    }

    /// Hand the relay task to the caller, who decides how long to wait for it.
    pub fn take_relay(&mut self) -> Option<JoinHandle<()>> {
        self.relay.take()
    }
}

async fn relay_output(
    name: String,
    mut child: Child,
    rx: pipe::Receiver,
    sink: Sink,
    exit_status: ExitSlot,
) {
    let mut reader = BufReader::new(rx);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if !line.ends_with(b"\n") {
                    line.push(b'\n');
                }
                // The sink is a blocking writer; keep it off the runtime threads.
                let out = Arc::clone(&sink);
                let buf = std::mem::take(&mut line);
                let written = tokio::task::spawn_blocking(move || {
                    let res = write_line(&out, &buf);
                    (buf, res)
                })
                .await;
                match written {
                    Ok((buf, res)) => {
                        line = buf;
                        if let Err(e) = res {
                            debug!("[{name}] dropping output line: {e}");
                        }
                    }
                    Err(e) => warn!("[{name}] output writer failed: {e}"),
                }
            }
            Err(e) => {
                warn!("[{name}] error reading output: {e}");
                break;
            }
        }
    }

    match child.wait().await {
        Ok(status) => {
            info!("[{name}] exited with {status}");
            *exit_status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
        }
        Err(e) => warn!("[{name}] failed to wait on child: {e}"),
    }
}

fn write_line(sink: &Sink, line: &[u8]) -> std::io::Result<()> {
    let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
    out.write_all(line)?;
    out.flush()
}
