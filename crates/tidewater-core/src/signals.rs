// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Callback signaling.
//!
//! A caller suspends on a [`PendingSignal`] while a table's workflow runs; the
//! workflow completes it exactly once through a [`SignalGateway`]. The
//! in-process gateway is a [`CorrelationTable`] mapping each callback token to
//! a oneshot sender, so the waiting side never polls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::types::CallbackToken;

/// Delivers a table's terminal outcome to whoever holds the callback token.
#[async_trait]
pub trait SignalGateway: Send + Sync {
    /// Report success with an output document.
    async fn send_task_success(&self, token: &CallbackToken, output: Value) -> Result<()>;

    /// Report failure with an error code and a human-readable cause.
    async fn send_task_failure(&self, token: &CallbackToken, error: &str, cause: &str) -> Result<()>;
}

/// Terminal outcome delivered to a waiting caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalOutcome {
    Success { output: Value },
    Failure { error: String, cause: String },
}

impl SignalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// In-process correlation table of outstanding callback tokens.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<Mutex<HashMap<CallbackToken, oneshot::Sender<SignalOutcome>>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token and the receiving half the caller waits on.
    pub async fn register(&self) -> PendingSignal {
        let token = CallbackToken::generate();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(token.clone(), tx);
        debug!(token = %token, "Registered callback token");
        PendingSignal { token, receiver: rx }
    }

    /// Complete a token. Unknown or already consumed tokens are rejected.
    pub async fn complete(&self, token: &CallbackToken, outcome: SignalOutcome) -> Result<()> {
        let sender = self.pending.lock().await.remove(token).ok_or_else(|| {
            OrchestratorError::SignalDelivery {
                token: token.to_string(),
                reason: "unknown or already consumed token".to_string(),
            }
        })?;

        if sender.send(outcome).is_err() {
            warn!(token = %token, "Caller stopped waiting before the signal arrived");
        }
        Ok(())
    }

    /// Drop a token without completing it. Returns whether it was outstanding.
    pub async fn discard(&self, token: &CallbackToken) -> bool {
        self.pending.lock().await.remove(token).is_some()
    }

    /// Number of outstanding tokens.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl SignalGateway for CorrelationTable {
    async fn send_task_success(&self, token: &CallbackToken, output: Value) -> Result<()> {
        self.complete(token, SignalOutcome::Success { output }).await
    }

    async fn send_task_failure(&self, token: &CallbackToken, error: &str, cause: &str) -> Result<()> {
        self.complete(
            token,
            SignalOutcome::Failure {
                error: error.to_string(),
                cause: cause.to_string(),
            },
        )
        .await
    }
}

/// Receiving half of a registered callback token.
#[derive(Debug)]
pub struct PendingSignal {
    token: CallbackToken,
    receiver: oneshot::Receiver<SignalOutcome>,
}

impl PendingSignal {
    pub fn token(&self) -> &CallbackToken {
        &self.token
    }

    /// Suspend until the token is completed.
    ///
    /// Fails if the token is discarded without a signal, which is what a
    /// silently timed-out workflow looks like from the caller's side.
    pub async fn wait(self) -> Result<SignalOutcome> {
        self.receiver.await.map_err(|_| OrchestratorError::SignalDelivery {
            token: self.token.to_string(),
            reason: "token discarded without a signal".to_string(),
        })
    }

    /// Like [`wait`](Self::wait) but gives up after `limit`.
    pub async fn wait_timeout(self, limit: Duration) -> Result<SignalOutcome> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout { elapsed: limit }),
        }
    }
}
