//! Render-completion detection
//!
//! After a delivery URL is published the service may still be rendering the
//! derived asset. [`RenderDetector`] polls the URL with a [`RenderProbe`]
//! until it decodes, then reports through a completion callback.
//!
//! # State machine
//!
//! ```text
//! Idle ──start──▶ Polling ──decoded──▶ Confirmed
//!   ▲               │  └──max attempts──▶ Exhausted
//!   └────cancel─────┘
//! ```
//!
//! Exactly one poll task exists at a time: `start` aborts the running task
//! before spawning its replacement.

use crate::probe::RenderProbe;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Poll cadence and bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Delay before each probe
    pub interval_ms: u64,
    /// Give up after this many probes, `None` polls forever
    pub max_attempts: Option<u32>,
    /// A probe still running after this long counts as a failed attempt
    pub probe_timeout_ms: u64,
}

impl PollPolicy {
    /// Policy with no attempt cap
    #[inline]
    #[must_use]
    pub fn unbounded(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Delay between probes
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on a single probe
    #[inline]
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: Some(120),
            probe_timeout_ms: 10_000,
        }
    }
}

/// Detector lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorState {
    /// No poll cycle started, or last one cancelled
    Idle,
    /// Poll task running
    Polling,
    /// Last cycle decoded its URL
    Confirmed,
    /// Last cycle hit the attempt cap
    Exhausted,
}

/// How a poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// URL decoded on the given attempt
    Confirmed {
        /// Probes made
        attempts: u32,
    },
    /// Attempt cap reached
    Exhausted {
        /// Probes made
        attempts: u32,
    },
}

#[derive(Debug)]
struct Status {
    /// Bumped on every start/cancel so a finishing task can tell it is stale
    epoch: u64,
    state: DetectorState,
}

/// Owner of the single render-poll timer
pub struct RenderDetector {
    probe: Arc<dyn RenderProbe>,
    policy: PollPolicy,
    status: Arc<Mutex<Status>>,
    active: Option<JoinHandle<()>>,
}

impl RenderDetector {
    /// Create idle detector
    #[must_use]
    pub fn new(probe: Arc<dyn RenderProbe>, policy: PollPolicy) -> Self {
        Self {
            probe,
            policy,
            status: Arc::new(Mutex::new(Status {
                epoch: 0,
                state: DetectorState::Idle,
            })),
            active: None,
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> DetectorState {
        self.status.lock().state
    }

    /// Poll policy in use
    #[inline]
    #[must_use]
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Start polling `url`, replacing any running cycle
    ///
    /// `on_complete` runs once, on the runtime, when the cycle ends. It does
    /// not run if the cycle is cancelled or replaced first.
    ///
    /// # Panics
    /// Outside a tokio runtime
    pub fn start<F>(&mut self, url: Url, on_complete: F)
    where
        F: FnOnce(PollOutcome) + Send + 'static,
    {
        self.cancel();

        let epoch = {
            let mut status = self.status.lock();
            status.epoch += 1;
            status.state = DetectorState::Polling;
            status.epoch
        };

        let probe = Arc::clone(&self.probe);
        let status = Arc::clone(&self.status);
        let policy = self.policy;

        tracing::debug!(%url, interval_ms = policy.interval_ms, "render poll started");

        self.active = Some(tokio::spawn(async move {
            let outcome = poll_until_decodable(probe.as_ref(), &url, policy).await;

            {
                let mut status = status.lock();
                if status.epoch != epoch {
                    return;
                }
                status.state = match outcome {
                    PollOutcome::Confirmed { .. } => DetectorState::Confirmed,
                    PollOutcome::Exhausted { .. } => DetectorState::Exhausted,
                };
            }

            match outcome {
                PollOutcome::Confirmed { attempts } => {
                    tracing::info!(%url, attempts, "render confirmed");
                }
                PollOutcome::Exhausted { attempts } => {
                    tracing::warn!(%url, attempts, "render not decodable, giving up");
                }
            }
            on_complete(outcome);
        }));
    }

    /// Abort the running cycle, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
        let mut status = self.status.lock();
        status.epoch += 1;
        if status.state == DetectorState::Polling {
            status.state = DetectorState::Idle;
        }
    }

    /// Check if a poll task is running
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.state() == DetectorState::Polling
    }
}

impl Drop for RenderDetector {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RenderDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDetector")
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn poll_until_decodable(probe: &dyn RenderProbe, url: &Url, policy: PollPolicy) -> PollOutcome {
    let mut attempts = 0u32;
    loop {
        tokio::time::sleep(policy.interval()).await;
        attempts += 1;

        match tokio::time::timeout(policy.probe_timeout(), probe.probe(url)).await {
            Ok(Ok(())) => return PollOutcome::Confirmed { attempts },
            Ok(Err(e)) => tracing::debug!(%url, attempts, error = %e, "not decodable yet"),
            Err(_) => tracing::debug!(
                %url,
                attempts,
                timeout_ms = policy.probe_timeout_ms,
                "probe timed out"
            ),
        }

        if policy.exhausted(attempts) {
            return PollOutcome::Exhausted { attempts };
        }
    }
}
