pub mod context;
pub mod scheduler;
pub mod service;

use anyhow::Result;
use async_trait::async_trait;

use crate::controller::context::{ControllerContext, ControllerEvent, ControllerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileNext {
    Done,
    /// Retry with the queue's per-key exponential backoff.
    Backoff,
}

impl ReconcileNext {
    pub fn done() -> Self {
        Self::Done
    }

    pub fn backoff() -> Self {
        Self::Backoff
    }
}

#[async_trait]
pub trait Controller: Send + Sync {
    /// Map a cluster event to the key to reconcile, if any.
    async fn schedule(
        &self,
        ctx: ControllerContext,
        event: ControllerEvent,
    ) -> Result<Option<ControllerKey>>;

    /// Keys to enqueue on a periodic full pass.
    async fn resync(&self, ctx: ControllerContext) -> Result<Vec<ControllerKey>>;

    async fn reconcile(&self, ctx: ControllerContext, key: ControllerKey) -> Result<ReconcileNext>;

    async fn handle_error(
        &self,
        ctx: ControllerContext,
        key: ControllerKey,
        error: anyhow::Error,
    ) -> ReconcileNext;
}
