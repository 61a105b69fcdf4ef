//! Bounded worker pool for background document jobs.
//!
//! A single pool task owns every piece of mutable state (active-job map,
//! FIFO queue, concurrency bound) and is driven by two channels: commands
//! from callers and events from running workers. Workers never touch pool
//! state directly, so there is exactly one settle path per job.

use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::operations::{JobRunner, OperationRunner};
use super::types::{
    CompressOutput, ConvertOutput, JobOutput, JobRequest, MergeOutput, PageAssembly, PageRange,
    PoolConfig, PoolStats, ProgressHandler, RasterFormat, SplitOutput,
};
use crate::domains::compression::types::CompressionLevel;
use crate::errors::{DomainError, ServiceError, ServiceResult};

/// Commands accepted by the pool task.
enum PoolCommand {
    Submit {
        request: JobRequest,
        on_progress: Option<ProgressHandler>,
        response: oneshot::Sender<ServiceResult<JobOutput>>,
    },
    Stats {
        response: oneshot::Sender<PoolStats>,
    },
    SetMaxWorkers {
        max_workers: usize,
        response: oneshot::Sender<()>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Events emitted by workers and job timers, keyed by job id.
enum WorkerEvent {
    Progress { job_id: Uuid, percent: u8 },
    Complete { job_id: Uuid, output: JobOutput },
    Error { job_id: Uuid, message: String },
    Timeout { job_id: Uuid },
}

struct ActiveJob {
    handle: JoinHandle<()>,
    resolve: oneshot::Sender<ServiceResult<JobOutput>>,
    on_progress: Option<ProgressHandler>,
    started_at: Instant,
    kind: &'static str,
}

struct QueuedJob {
    job_id: Uuid,
    request: JobRequest,
    on_progress: Option<ProgressHandler>,
    resolve: oneshot::Sender<ServiceResult<JobOutput>>,
}

/// Handle to the pool. Cloning shares the same pool task; dropping the last
/// handle tears the task down.
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::Sender<PoolCommand>,
}

impl WorkerPool {
    /// Spawn a pool backed by the real operation implementations.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_runner(config, Arc::new(OperationRunner))
    }

    /// Spawn a pool with an injected execution backend.
    pub fn with_runner(config: PoolConfig, runner: Arc<dyn JobRunner>) -> Self {
        let (commands, command_rx) = mpsc::channel(64);
        let (events_tx, event_rx) = mpsc::channel(256);

        let task = PoolTask {
            max_workers: config.max_workers.max(1),
            job_timeout: config.job_timeout,
            runner,
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            events_tx,
            shutting_down: false,
        };
        tokio::spawn(task.run(command_rx, event_rx));

        Self { commands }
    }

    pub async fn compress_pdf(
        &self,
        input: impl Into<PathBuf>,
        quality: CompressionLevel,
        on_progress: Option<ProgressHandler>,
    ) -> ServiceResult<CompressOutput> {
        let request = JobRequest::Compress {
            input: input.into(),
            quality,
        };
        match self.submit(request, on_progress).await? {
            JobOutput::Compress(out) => Ok(out),
            other => Err(unexpected_output("compress", &other)),
        }
    }

    pub async fn merge_pdfs(
        &self,
        inputs: Vec<PathBuf>,
        on_progress: Option<ProgressHandler>,
    ) -> ServiceResult<MergeOutput> {
        match self.submit(JobRequest::Merge { inputs }, on_progress).await? {
            JobOutput::Merge(out) => Ok(out),
            other => Err(unexpected_output("merge", &other)),
        }
    }

    pub async fn split_pdf(
        &self,
        input: impl Into<PathBuf>,
        ranges: Vec<PageRange>,
        on_progress: Option<ProgressHandler>,
    ) -> ServiceResult<SplitOutput> {
        let request = JobRequest::Split {
            input: input.into(),
            ranges,
        };
        match self.submit(request, on_progress).await? {
            JobOutput::Split(out) => Ok(out),
            other => Err(unexpected_output("split", &other)),
        }
    }

    pub async fn images_to_pdf(
        &self,
        inputs: Vec<PathBuf>,
        mode: PageAssembly,
        on_progress: Option<ProgressHandler>,
    ) -> ServiceResult<ConvertOutput> {
        let request = JobRequest::ImagesToPdf { inputs, mode };
        match self.submit(request, on_progress).await? {
            JobOutput::Convert(out) => Ok(out),
            other => Err(unexpected_output("images-to-pdf", &other)),
        }
    }

    pub async fn pdf_to_images(
        &self,
        input: impl Into<PathBuf>,
        format: RasterFormat,
        on_progress: Option<ProgressHandler>,
    ) -> ServiceResult<ConvertOutput> {
        let request = JobRequest::PdfToImages {
            input: input.into(),
            format,
        };
        match self.submit(request, on_progress).await? {
            JobOutput::Convert(out) => Ok(out),
            other => Err(unexpected_output("pdf-to-images", &other)),
        }
    }

    /// Live job counters.
    pub async fn stats(&self) -> ServiceResult<PoolStats> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(PoolCommand::Stats { response: tx })
            .await
            .map_err(|_| pool_gone())?;
        rx.await.map_err(|_| pool_gone())
    }

    /// Adjust the concurrency bound; queued jobs are promoted immediately
    /// when the bound grows.
    pub async fn set_max_workers(&self, max_workers: usize) -> ServiceResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(PoolCommand::SetMaxWorkers {
                max_workers,
                response: tx,
            })
            .await
            .map_err(|_| pool_gone())?;
        rx.await.map_err(|_| pool_gone())
    }

    /// Terminate every active worker, reject queued jobs and refuse further
    /// submissions. Safe to call repeatedly; a no-op when idle.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(PoolCommand::Shutdown { response: tx })
            .await
            .is_err()
        {
            // Pool task already gone; shutdown is complete by definition.
            return Ok(());
        }
        rx.await.map_err(|_| pool_gone())
    }

    async fn submit(
        &self,
        request: JobRequest,
        on_progress: Option<ProgressHandler>,
    ) -> ServiceResult<JobOutput> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(PoolCommand::Submit {
                request,
                on_progress,
                response: tx,
            })
            .await
            .map_err(|_| pool_gone())?;
        rx.await.map_err(|_| pool_gone())?
    }
}

fn pool_gone() -> ServiceError {
    ServiceError::ServiceUnavailable("worker pool is shut down".to_string())
}

fn unexpected_output(kind: &str, output: &JobOutput) -> ServiceError {
    ServiceError::Domain(DomainError::Internal(format!(
        "unexpected output for {} job: {:?}",
        kind, output
    )))
}

struct PoolTask {
    max_workers: usize,
    job_timeout: Duration,
    runner: Arc<dyn JobRunner>,
    jobs: HashMap<Uuid, ActiveJob>,
    queue: VecDeque<QueuedJob>,
    events_tx: mpsc::Sender<WorkerEvent>,
    shutting_down: bool,
}

impl PoolTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PoolCommand>,
        mut events: mpsc::Receiver<WorkerEvent>,
    ) {
        log::info!(
            "worker pool started: {} workers, {:?} job timeout",
            self.max_workers,
            self.job_timeout
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    // All pool handles dropped.
                    None => break,
                },
                Some(event) = events.recv() => self.on_event(event),
            }
        }

        self.drain("worker pool dropped").await;
        log::info!("worker pool stopped");
    }

    async fn on_command(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::Submit {
                request,
                on_progress,
                response,
            } => {
                if self.shutting_down {
                    let _ = response.send(Err(ServiceError::ServiceUnavailable(
                        "worker pool is shutting down".to_string(),
                    )));
                    return;
                }

                let job_id = Uuid::new_v4();
                if self.jobs.len() < self.max_workers {
                    self.start_job(job_id, request, on_progress, response);
                } else {
                    log::debug!(
                        "job {} ({}) queued at position {}",
                        job_id,
                        request.kind(),
                        self.queue.len() + 1
                    );
                    self.queue.push_back(QueuedJob {
                        job_id,
                        request,
                        on_progress,
                        resolve: response,
                    });
                }
            }
            PoolCommand::Stats { response } => {
                let _ = response.send(PoolStats {
                    active_jobs: self.jobs.len(),
                    queued_jobs: self.queue.len(),
                    max_workers: self.max_workers,
                });
            }
            PoolCommand::SetMaxWorkers {
                max_workers,
                response,
            } => {
                self.max_workers = max_workers.max(1);
                log::info!("max concurrency updated to {}", self.max_workers);
                self.promote_queued();
                let _ = response.send(());
            }
            PoolCommand::Shutdown { response } => {
                self.shutting_down = true;
                self.drain("worker pool is shutting down").await;
                let _ = response.send(());
            }
        }
    }

    fn on_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress { job_id, percent } => {
                if let Some(job) = self.jobs.get(&job_id) {
                    if let Some(on_progress) = &job.on_progress {
                        on_progress(percent.min(100));
                    }
                }
            }
            WorkerEvent::Complete { job_id, output } => self.finish(job_id, Ok(output)),
            WorkerEvent::Error { job_id, message } => {
                self.finish(job_id, Err(ServiceError::Worker(message)))
            }
            WorkerEvent::Timeout { job_id } => {
                if self.jobs.contains_key(&job_id) {
                    log::warn!("job {} exceeded {:?}", job_id, self.job_timeout);
                    self.finish(job_id, Err(ServiceError::JobTimeout));
                }
                // A timer firing for a settled job is ignored.
            }
        }
    }

    fn start_job(
        &mut self,
        job_id: Uuid,
        request: JobRequest,
        on_progress: Option<ProgressHandler>,
        resolve: oneshot::Sender<ServiceResult<JobOutput>>,
    ) {
        let kind = request.kind();
        let handle = tokio::spawn(run_worker(
            job_id,
            request,
            self.runner.clone(),
            self.events_tx.clone(),
        ));

        let timer_events = self.events_tx.clone();
        let timeout = self.job_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timer_events.send(WorkerEvent::Timeout { job_id }).await;
        });

        self.jobs.insert(
            job_id,
            ActiveJob {
                handle,
                resolve,
                on_progress,
                started_at: Instant::now(),
                kind,
            },
        );
        log::debug!(
            "job {} ({}) started; {} of {} workers busy",
            job_id,
            kind,
            self.jobs.len(),
            self.max_workers
        );
    }

    /// Settle a job exactly once: late events for ids no longer in the map
    /// fall through without touching anything.
    fn finish(&mut self, job_id: Uuid, result: ServiceResult<JobOutput>) {
        let Some(job) = self.jobs.remove(&job_id) else {
            return;
        };
        job.handle.abort();

        let duration_ms = job.started_at.elapsed().as_millis();
        match &result {
            Ok(_) => log::info!(
                "job {} ({}) completed in {} ms",
                job_id,
                job.kind,
                duration_ms
            ),
            Err(e) => log::warn!(
                "job {} ({}) failed after {} ms: {}",
                job_id,
                job.kind,
                duration_ms,
                e
            ),
        }

        let _ = job.resolve.send(result);
        self.promote_queued();
    }

    fn promote_queued(&mut self) {
        while self.jobs.len() < self.max_workers {
            let Some(queued) = self.queue.pop_front() else {
                break;
            };
            log::debug!(
                "promoting queued job {} ({} still waiting)",
                queued.job_id,
                self.queue.len()
            );
            self.start_job(
                queued.job_id,
                queued.request,
                queued.on_progress,
                queued.resolve,
            );
        }
    }

    /// Abort all active workers, wait for each to exit, reject everything
    /// queued, and leave the pool empty.
    async fn drain(&mut self, reason: &str) {
        let mut terminated = Vec::new();
        for (job_id, job) in self.jobs.drain() {
            job.handle.abort();
            let _ = job
                .resolve
                .send(Err(ServiceError::Cancelled(reason.to_string())));
            terminated.push((job_id, job.handle));
        }
        for (job_id, handle) in terminated {
            let _ = handle.await;
            log::debug!("job {} terminated", job_id);
        }

        for queued in self.queue.drain(..) {
            let _ = queued
                .resolve
                .send(Err(ServiceError::Cancelled(reason.to_string())));
        }
    }
}

async fn run_worker(
    job_id: Uuid,
    request: JobRequest,
    runner: Arc<dyn JobRunner>,
    events: mpsc::Sender<WorkerEvent>,
) {
    let progress_events = events.clone();
    let progress = move |percent: u8| {
        // Dropping an update under backpressure is fine; order is preserved.
        let _ = progress_events.try_send(WorkerEvent::Progress { job_id, percent });
    };

    let outcome = AssertUnwindSafe(runner.run(request, &progress))
        .catch_unwind()
        .await;

    let event = match outcome {
        Ok(Ok(output)) => WorkerEvent::Complete { job_id, output },
        Ok(Err(e)) => WorkerEvent::Error {
            job_id,
            message: e.to_string(),
        },
        Err(_) => WorkerEvent::Error {
            job_id,
            message: "worker terminated abnormally".to_string(),
        },
    };
    let _ = events.send(event).await;
}
