//! Batching aggregator.
//!
//! Incoming checks queue on a bounded channel; a background loop drains up
//! to the batch limit or waits out the flush interval, issues one batch
//! RPC, and fans the positional results back to the callers. A batch
//! error is broadcast to every request in it. Each caller's deadline is
//! honored independently: a timed-out caller gets its error without
//! disturbing the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::client::PermissionRpc;
use crate::errors::ClientError;
use crate::types::{CheckPermissionRequest, UserPermission};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Max requests coalesced into one batch RPC.
    pub max_batch: usize,
    /// How long a non-full batch waits for company.
    pub flush_interval: Duration,
    /// Queue capacity; producers block when it is full.
    pub queue_depth: usize,
    /// Per-request deadline while waiting for the batch answer.
    pub request_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_batch: 32,
            flush_interval: Duration::from_millis(10),
            queue_depth: 1024,
            request_timeout: Duration::from_secs(5),
        }
    }
}

struct Pending {
    request: CheckPermissionRequest,
    respond: oneshot::Sender<Result<bool, ClientError>>,
}

pub struct AggregatorClient {
    inner: Arc<dyn PermissionRpc>,
    tx: mpsc::Sender<Pending>,
    request_timeout: Duration,
}

impl AggregatorClient {
    pub fn new(inner: Arc<dyn PermissionRpc>, config: AggregatorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        tokio::spawn(run_flush_loop(
            inner.clone(),
            rx,
            config.max_batch.max(1),
            config.flush_interval,
        ));
        Self {
            inner,
            tx,
            request_timeout: config.request_timeout,
        }
    }
}

async fn run_flush_loop(
    inner: Arc<dyn PermissionRpc>,
    mut rx: mpsc::Receiver<Pending>,
    max_batch: usize,
    flush_interval: Duration,
) {
    loop {
        // Block for the first request; no busy-spin on an empty queue.
        let Some(first) = rx.recv().await else { break };
        let mut batch = vec![first];

        let deadline = tokio::time::sleep(flush_interval);
        tokio::pin!(deadline);
        while batch.len() < max_batch {
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(pending) => batch.push(pending),
                    None => break,
                },
            }
        }

        let requests: Vec<CheckPermissionRequest> =
            batch.iter().map(|p| p.request.clone()).collect();
        debug!(size = requests.len(), "flushing check batch");
        match inner.batch_check_permission(&requests).await {
            Ok(allowed) if allowed.len() == batch.len() => {
                for (pending, allowed) in batch.into_iter().zip(allowed) {
                    let _ = pending.respond.send(Ok(allowed));
                }
            }
            Ok(allowed) => {
                let message = format!(
                    "batch answer count {} does not match request count {}",
                    allowed.len(),
                    requests.len()
                );
                for pending in batch {
                    let _ = pending.respond.send(Err(ClientError::Other(message.clone())));
                }
            }
            Err(err) => {
                // Broadcast the batch failure to every caller in it.
                let message = err.to_string();
                for pending in batch {
                    let _ = pending.respond.send(Err(ClientError::Other(message.clone())));
                }
            }
        }
    }
}

#[async_trait]
impl PermissionRpc for AggregatorClient {
    async fn check_permission(
        &self,
        request: &CheckPermissionRequest,
    ) -> Result<bool, ClientError> {
        let (respond, answer) = oneshot::channel();
        self.tx
            .send(Pending {
                request: request.clone(),
                respond,
            })
            .await
            .map_err(|_| ClientError::Closed)?;
        match tokio::time::timeout(self.request_timeout, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::DeadlineExceeded),
        }
    }

    async fn batch_check_permission(
        &self,
        requests: &[CheckPermissionRequest],
    ) -> Result<Vec<bool>, ClientError> {
        self.inner.batch_check_permission(requests).await
    }

    async fn get_all_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> Result<UserPermission, ClientError> {
        self.inner.get_all_permissions(biz_id, user_id).await
    }
}
