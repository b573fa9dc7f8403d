// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Script for a stand-in service: announces itself with its arguments, then
/// idles until asked to stop. Passed as `sh -c SCRIPT NAME`.
pub const SERVICE_SCRIPT: &str =
    r#"trap 'echo "$0 stopping"; exit 0' INT TERM; echo "$0 up $*"; while :; do sleep 0.1; done"#;

/// Handle to a running svc-deploy process.
pub struct DeployHandle {
    child: Child,
    log_lines: Arc<Mutex<Vec<String>>>,
    _stdout_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

fn collect<R: Read + Send + 'static>(
    stream: R,
    tag: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    eprintln!("[{tag}] {l}");
                    lines.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

impl DeployHandle {
    /// Start svc-deploy with `--config-file <config>` plus `args`.
    pub fn start(config: &Path, args: &[&str]) -> Self {
        let bin = env!("CARGO_BIN_EXE_svc-deploy");
        let mut child = Command::new(bin)
            .arg("--config-file")
            .arg(config)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start svc-deploy");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));

        // Child service output and INFO logs arrive on stdout, WARN/ERROR on stderr.
        let _stdout_thread = collect(stdout, "deploy", Arc::clone(&log_lines));
        let _stderr_thread = collect(stderr, "deploy:err", Arc::clone(&log_lines));

        Self {
            child,
            log_lines,
            _stdout_thread,
            _stderr_thread,
        }
    }

    /// Wait until an output line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        self.wait_for_log_count(pattern, 1, timeout)
    }

    pub fn wait_for_log_default(&self, pattern: &str) -> bool {
        self.wait_for_log(pattern, DEFAULT_TIMEOUT)
    }

    pub fn count_log_matches(&self, pattern: &str) -> usize {
        let lines = self.log_lines.lock().unwrap();
        lines.iter().filter(|l| l.contains(pattern)).count()
    }

    pub fn find_log(&self, pattern: &str) -> Option<String> {
        let lines = self.log_lines.lock().unwrap();
        lines.iter().find(|l| l.contains(pattern)).cloned()
    }

    pub fn wait_for_log_count(&self, pattern: &str, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count_log_matches(pattern) >= n {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id() as i32;
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to svc-deploy");
    }

    /// Wait for svc-deploy to exit on its own; kill it if it overstays `timeout`.
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check svc-deploy status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed svc-deploy");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// Extract PIDs from "spawned (pid=NNN" log lines.
    pub fn spawned_pids(&self) -> Vec<u32> {
        let lines = self.log_lines.lock().unwrap();
        lines
            .iter()
            .filter_map(|l| {
                let marker = "spawned (pid=";
                let start = l.find(marker)? + marker.len();
                let end = l[start..].find(|c: char| !c.is_ascii_digit())? + start;
                l[start..end].parse().ok()
            })
            .collect()
    }
}

impl Drop for DeployHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Write `yaml` as the deployment file in `dir`.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("deploy.yaml");
    std::fs::write(&path, yaml)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}

/// YAML for one stand-in service entry under `services:`.
pub fn service_yaml(name: &str, port: u16) -> String {
    format!(
        "  - name: {name}\n    command: /bin/sh\n    args:\n      - -c\n      - '{}'\n      - {name}\n    port: {port}\n",
        SERVICE_SCRIPT.replace('\'', "''")
    )
}

/// Bind a listener on an ephemeral port. Keep it alive to make the port "ready".
pub fn listener() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let port = l.local_addr().unwrap().port();
    (l, port)
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    listener().1
}

pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
