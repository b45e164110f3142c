pub mod queue;

use std::{sync::Arc, time::Duration};

use anyhow::{Result, bail};
use async_channel::Receiver;
use futures_util::StreamExt;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tracing::{debug, error, info, warn};

use crate::{
    constants::{DEFAULT_RESYNC_INTERVAL, DEFAULT_WORKER_COUNT, WATCH_RESTART_DELAY},
    controller::{
        Controller, ReconcileNext,
        context::{ControllerContext, ControllerEvent, ControllerKey},
        scheduler::queue::{Backoff, WorkQueue},
    },
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub resync_interval: Duration,
    pub backoff: Backoff,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff: Backoff::default(),
        }
    }
}

/// Resolves once shutdown was requested or the sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct Scheduler {
    ctx: ControllerContext,
    config: SchedulerConfig,
    queue: WorkQueue,
    rx: Receiver<ControllerKey>,
    ctrl: Arc<Vec<Box<dyn Controller>>>,
}

impl Scheduler {
    pub fn new(
        ctx: ControllerContext,
        config: SchedulerConfig,
        ctrls: Vec<Box<dyn Controller>>,
    ) -> Self {
        let (queue, rx) = WorkQueue::new(config.backoff);

        Self {
            ctx,
            config,
            queue,
            rx,
            ctrl: Arc::new(ctrls),
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn start_workers(&self) -> Vec<JoinHandle<()>> {
        info!("starting {} workers", self.config.worker_count);

        (0..self.config.worker_count.max(1))
            .map(|worker| {
                let queue = self.queue.clone();
                let ctx = self.ctx.clone();
                let ctrl = self.ctrl.clone();
                let rx = self.rx.clone();

                tokio::spawn(async move {
                    while let Ok(key) = rx.recv().await {
                        if queue.is_shut_down() {
                            break;
                        }

                        queue.start(&key);
                        debug!(worker, "processing {}", key);

                        let mut succeeded = true;
                        for ctrl in ctrl.iter() {
                            let next = match ctrl.reconcile(ctx.clone(), key.clone()).await {
                                Ok(next) => next,
                                Err(e) => {
                                    succeeded = false;
                                    ctrl.handle_error(ctx.clone(), key.clone(), e).await
                                }
                            };

                            match next {
                                ReconcileNext::Done => {}
                                ReconcileNext::Backoff => {
                                    let delay = queue.push_rate_limited(&key);
                                    warn!("requeued {} in {:?}", key, delay);
                                }
                            }
                        }

                        if succeeded {
                            queue.forget(&key);
                        }
                        queue.done(&key);
                    }

                    debug!(worker, "worker stopped");
                })
            })
            .collect()
    }

    pub async fn push(&self, ev: ControllerEvent) -> Result<()> {
        for ctrl in self.ctrl.iter() {
            let result = ctrl.schedule(self.ctx.clone(), ev.clone()).await;
            match result {
                Ok(Some(key)) => {
                    self.queue.push(&key);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("failed to schedule event for controller: {}", e);
                }
            }
        }

        Ok(())
    }

    /// One full pass: every controller lists what it owns and those keys are enqueued.
    pub async fn resync(&self) {
        for ctrl in self.ctrl.iter() {
            match ctrl.resync(self.ctx.clone()).await {
                Ok(keys) => {
                    debug!("resync enqueued {} keys", keys.len());
                    for key in keys {
                        self.queue.push(&key);
                    }
                }
                Err(e) => error!("periodic resync failed: {}", e),
            }
        }
    }

    pub fn start_resync(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(this.config.resync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => this.resync().await,
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }

            debug!("resync loop stopped");
        })
    }

    pub fn start_watch(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            loop {
                let mut events = this.ctx.cluster.watch();

                loop {
                    tokio::select! {
                        event = events.next() => match event {
                            Some(event) => {
                                this.push(event.into()).await.ok();
                            }
                            None => break,
                        },
                        _ = shutdown_requested(&mut shutdown) => return,
                    }
                }

                warn!(
                    "service watch ended, restarting in {:?}",
                    WATCH_RESTART_DELAY
                );
                tokio::select! {
                    _ = sleep(WATCH_RESTART_DELAY) => {}
                    _ = shutdown_requested(&mut shutdown) => return,
                }
            }
        })
    }

    /// Run workers, the watch pump and the resync timer until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.config.resync_interval.is_zero() {
            bail!("resync interval must be greater than zero");
        }

        let workers = self.start_workers();
        let watch = self.start_watch(shutdown.clone());
        let resync = self.start_resync(shutdown.clone());

        shutdown_requested(&mut shutdown).await;
        info!("stopping reconciler");

        self.queue.shutdown();
        for worker in workers {
            worker.await.ok();
        }
        watch.await.ok();
        resync.await.ok();

        info!("reconciler stopped");
        Ok(())
    }
}
