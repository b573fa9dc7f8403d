// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Readiness probing: a service is ready once its port accepts TCP connections.

use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessResult {
    Ready,
    Timeout,
    Cancelled,
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Wait at most `timeout` for `address` to become reachable. Must return
    /// `Cancelled` promptly once `cancel` fires.
    async fn probe(
        &self,
        address: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ReadinessResult;
}

/// Polls with plain TCP connects; no application-level handshake.
pub struct TcpProbe {
    interval: Duration,
}

impl TcpProbe {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_INTERVAL)
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(
        &self,
        address: &str,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> ReadinessResult {
        let deadline = Instant::now() + limit;
        let poll = async {
            loop {
                let attempt = timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(address));
                match attempt.await {
                    Ok(Ok(_stream)) => return,
                    Ok(Err(e)) => debug!("{address} not reachable yet: {e}"),
                    Err(_) => debug!("{address} connect attempt timed out"),
                }
                sleep(self.interval).await;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => ReadinessResult::Cancelled,
            res = tokio::time::timeout_at(deadline, poll) => match res {
                Ok(()) => ReadinessResult::Ready,
                Err(_) => ReadinessResult::Timeout,
            },
        }
    }
}
