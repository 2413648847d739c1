//! Print job dispatcher
//!
//! Owns one ordered job list per printer and drives every job through
//! encode → deliver → settle. Each tick:
//! 1. retries whose delay has passed re-enter their printer's list
//! 2. every idle printer gets its head pending job dispatched on its own task
//!
//! At most one job per printer is in flight; printers never wait on each
//! other. The lists, in-flight locks and retry schedule share one mutex that
//! is never held across an `.await`. Job records live in a `DashMap` so
//! [`Dispatcher::get_job`] never contends with dispatching.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use validator::Validate;

use crate::clock::{Clock, SystemClock};
use crate::config::{MIN_TICK_INTERVAL, SpoolerConfig};
use crate::element::ReceiptElement;
use crate::error::{SpoolerError, SpoolerResult};
use crate::queue::PrinterQueue;
use crate::renderer::{self, ReceiptRenderer};
use crate::retry::{RetryDecision, RetryPolicy, RetrySchedule};
use crate::transport::{NetworkTransport, Transport};
use crate::types::{
    JobId, JobKind, JobResult, JobStatus, PrintJob, PrinterConfig, PrinterKey, Priority,
    QueueStats,
};

#[derive(Default)]
struct DispatchState {
    queues: HashMap<PrinterKey, PrinterQueue>,
    retries: RetrySchedule,
}

struct Inner {
    policy: RetryPolicy,
    tick_interval: Duration,
    max_queue_depth: Option<usize>,
    renderer: ReceiptRenderer,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    jobs: DashMap<JobId, PrintJob>,
    state: Mutex<DispatchState>,
}

/// Work handed from a tick to a pipeline task
struct Dispatch {
    job_id: JobId,
    printer_key: PrinterKey,
    printer: PrinterConfig,
    elements: Vec<ReceiptElement>,
}

/// What one tick did
#[derive(Debug)]
pub struct TickReport {
    /// Retries that became pending again
    pub released: usize,
    /// Jobs handed to a pipeline, one per idle printer at most
    pub dispatched: Vec<JobId>,
    handles: Vec<JoinHandle<()>>,
}

impl TickReport {
    /// Wait until every pipeline started by this tick has settled
    pub async fn settled(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Pipeline task did not complete");
            }
        }
    }
}

/// Per-printer print job dispatcher
///
/// Cheap to clone; all clones share the same queues.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Dispatcher delivering over TCP with the system clock
    pub fn new(config: &SpoolerConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(NetworkTransport::new(config.delivery_timeout)),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        config: &SpoolerConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy: config.retry_policy(),
                tick_interval: config.tick_interval,
                max_queue_depth: config.max_queue_depth,
                renderer: ReceiptRenderer::new(config.paper_columns, config.codepage),
                transport,
                clock,
                jobs: DashMap::new(),
                state: Mutex::new(DispatchState::default()),
            }),
        }
    }

    /// Queue a receipt for a printer
    ///
    /// The printer config is validated first; a rejected config never
    /// reaches a queue.
    #[instrument(skip(self, printer, elements), fields(printer = %printer.key(), elements = elements.len()))]
    pub fn submit_job(
        &self,
        printer: PrinterConfig,
        elements: Vec<ReceiptElement>,
        priority: Priority,
        kind: JobKind,
    ) -> SpoolerResult<JobId> {
        printer.validate()?;

        let job = PrintJob::new(printer, elements, priority, kind);
        let job_id = job.id.clone();
        let printer_key = job.printer_key.clone();

        let mut state = self.inner.state.lock();
        let queue = state.queues.entry(printer_key.clone()).or_default();
        if let Some(depth) = self.inner.max_queue_depth
            && queue.len() >= depth
        {
            warn!(depth, "Queue full, job rejected");
            return Err(SpoolerError::QueueFull {
                printer_key: printer_key.to_string(),
                depth,
            });
        }

        self.inner.jobs.insert(job_id.clone(), job);
        let position = queue.insert(job_id.clone(), priority);
        info!(job_id = %job_id, %priority, position, "Job queued");
        Ok(job_id)
    }

    /// Queue the built-in test page ahead of regular receipts
    pub fn submit_test_page(&self, printer: PrinterConfig) -> SpoolerResult<JobId> {
        let elements = renderer::test_page(&printer);
        self.submit_job(printer, elements, Priority::High, JobKind::Test)
    }

    /// Snapshot of a job
    pub fn get_job(&self, job_id: &str) -> Option<PrintJob> {
        self.inner.jobs.get(job_id).map(|job| job.clone())
    }

    /// Jobs currently listed for a printer, in dispatch order
    pub fn queued_jobs(&self, printer_key: &PrinterKey) -> Vec<PrintJob> {
        let ids: Vec<JobId> = {
            let state = self.inner.state.lock();
            state
                .queues
                .get(printer_key)
                .map(|queue| queue.job_ids().cloned().collect())
                .unwrap_or_default()
        };
        ids.iter().filter_map(|id| self.get_job(id)).collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.inner.jobs.iter() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        let state = self.inner.state.lock();
        stats.printers = state.queues.len();
        stats.scheduled_retries = state.retries.len();
        stats
    }

    /// Whether a printer accepts connections
    pub async fn check_printer(&self, printer: &PrinterConfig) -> SpoolerResult<bool> {
        printer.validate()?;
        Ok(self.inner.transport.probe(printer).await)
    }

    /// Run one dispatch pass
    ///
    /// Must be called from within a Tokio runtime; pipelines are spawned
    /// onto it and keep running after this returns.
    pub fn tick(&self) -> TickReport {
        let now = self.inner.clock.now();
        let mut dispatches = Vec::new();

        let released = {
            let mut state = self.inner.state.lock();
            let released = self.inner.release_due_retries(&mut state, now);

            for (printer_key, queue) in state.queues.iter_mut() {
                let Some(job_id) = queue.next_pending().cloned() else {
                    continue;
                };
                let Some(mut job) = self.inner.jobs.get_mut(&job_id) else {
                    warn!(job_id = %job_id, "Queued job has no record, dropping it");
                    queue.finish(&job_id);
                    continue;
                };
                if let Err(e) = job.transition(JobStatus::Processing) {
                    error!(error = %e, "Queued job is not pending, dropping it");
                    queue.finish(&job_id);
                    continue;
                }
                queue.start(&job_id);

                dispatches.push(Dispatch {
                    job_id: job_id.clone(),
                    printer_key: printer_key.clone(),
                    printer: job.printer.clone(),
                    elements: job.elements.clone(),
                });
            }
            released
        };

        let dispatched: Vec<JobId> = dispatches.iter().map(|d| d.job_id.clone()).collect();
        let handles = dispatches
            .into_iter()
            .map(|dispatch| tokio::spawn(Arc::clone(&self.inner).run_pipeline(dispatch)))
            .collect();

        if released > 0 || !dispatched.is_empty() {
            debug!(released, dispatched = dispatched.len(), "Tick");
        }

        TickReport {
            released,
            dispatched,
            handles,
        }
    }

    /// Tick on the configured interval until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_ms = self.inner.tick_interval.as_millis() as u64, "Dispatcher started");

        let mut interval =
            tokio::time::interval(self.inner.tick_interval.max(MIN_TICK_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Run the tick loop on a background task
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(shutdown).await })
    }
}

impl Inner {
    fn release_due_retries(&self, state: &mut DispatchState, now: Instant) -> usize {
        let mut released = 0;
        for retry in state.retries.take_due(now) {
            let Some(mut job) = self.jobs.get_mut(&retry.job_id) else {
                warn!(job_id = %retry.job_id, "Retry for unknown job dropped");
                continue;
            };
            if let Err(e) = job.transition(JobStatus::Pending) {
                error!(error = %e, "Retry dropped");
                continue;
            }
            let priority = job.priority;
            drop(job);

            let queue = state.queues.entry(retry.printer_key).or_default();
            let position = queue.requeue(retry.job_id.clone(), priority, self.policy.placement);
            info!(job_id = %retry.job_id, position, "Retry due, job pending again");
            released += 1;
        }
        released
    }

    async fn run_pipeline(self: Arc<Self>, dispatch: Dispatch) {
        let Dispatch {
            job_id,
            printer_key,
            printer,
            elements,
        } = dispatch;
        let span = info_span!("print_job", job_id = %job_id, printer = %printer_key);

        async {
            info!("Printing");
            let outcome = AssertUnwindSafe(self.process(&printer, elements))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = if let Some(s) = panic.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!(panic = %message, "Print pipeline panicked");
                    Err(SpoolerError::Pipeline(message))
                });
            self.settle(&printer_key, &job_id, outcome);
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        printer: &PrinterConfig,
        elements: Vec<ReceiptElement>,
    ) -> SpoolerResult<JobResult> {
        let renderer = self.renderer;
        let count = elements.len();
        // Image decoding is CPU bound
        let data = tokio::task::spawn_blocking(move || renderer.render(&elements))
            .await
            .map_err(|e| SpoolerError::Pipeline(format!("encoder task failed: {}", e)))?;

        self.transport.deliver(printer, &data).await?;

        Ok(JobResult {
            elements_processed: count,
            message: format!("Printed {} elements on {}", count, printer.label()),
        })
    }

    /// Record the outcome and release the printer
    fn settle(&self, printer_key: &PrinterKey, job_id: &str, outcome: SpoolerResult<JobResult>) {
        let mut state = self.state.lock();
        if let Some(queue) = state.queues.get_mut(printer_key) {
            queue.finish(job_id);
        }

        let Some(mut job) = self.jobs.get_mut(job_id) else {
            warn!("Settled job has no record");
            return;
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = job.transition(JobStatus::Completed) {
                    error!(error = %e, "Cannot complete job");
                    return;
                }
                info!(elements = result.elements_processed, "Print job completed");
                job.result = Some(result);
            }
            Err(err) if !err.is_retryable() => {
                if let Err(e) = job.transition(JobStatus::Failed) {
                    error!(error = %e, "Cannot fail job");
                    return;
                }
                job.error = Some(err.to_string());
                error!(error = %err, "Print job failed, not retrying");
            }
            Err(err) => match self.policy.decide(job.retry_count) {
                RetryDecision::RetryAfter(delay) => {
                    if let Err(e) = job.transition(JobStatus::Retrying) {
                        error!(error = %e, "Cannot schedule retry");
                        return;
                    }
                    job.retry_count += 1;
                    job.error = Some(err.to_string());
                    state
                        .retries
                        .schedule(job_id.to_string(), printer_key.clone(), self.clock.now() + delay);
                    warn!(
                        error = %err,
                        retry_count = job.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Print failed, retry scheduled"
                    );
                }
                RetryDecision::Exhausted => {
                    if let Err(e) = job.transition(JobStatus::Failed) {
                        error!(error = %e, "Cannot fail job");
                        return;
                    }
                    job.error = Some(err.to_string());
                    error!(error = %err, retry_count = job.retry_count, "Print job failed");
                }
            },
        }
    }
}
