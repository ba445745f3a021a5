//! Worker pool running compound pipelines concurrently.
//!
//! One job per compound, `concurrency_limit` workers over an unbounded
//! queue. Workers stop pulling new jobs once cancelled; in-flight HTTP
//! requests complete or time out naturally.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{self, SearchContext};
use crate::{
    CompoundOutcome, CompoundStatus, Config, ProgressEvent, SearchOutcome, SearchRequest,
    aggregate,
};

/// A compound search job submitted to the pool.
pub struct CompoundJob {
    pub compound: String,
    pub index: usize,
    pub total: usize,
    pub result_tx: oneshot::Sender<CompoundOutcome>,
    /// Progress callback for this job.
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks that process compound search jobs.
///
/// Submit jobs via [`submit()`](SearchPool::submit), receive results via the
/// oneshot receiver paired with each job.
pub struct SearchPool {
    job_tx: async_channel::Sender<CompoundJob>,
    pool_handle: JoinHandle<()>,
}

impl SearchPool {
    /// Create a new pool with `num_workers` worker tasks.
    pub fn new(ctx: Arc<SearchContext>, cancel: CancellationToken, num_workers: usize) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<CompoundJob>();

        let pool_handle = tokio::spawn(async move {
            let mut worker_handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                worker_handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    ctx.clone(),
                    cancel.clone(),
                )));
            }
            // Drop our clone so workers are the last holders
            drop(job_rx);

            for h in worker_handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: CompoundJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the pool and wait for all workers to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    job_rx: async_channel::Receiver<CompoundJob>,
    ctx: Arc<SearchContext>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        if cancel.is_cancelled() {
            // Drain the queue reporting each job as cancelled so the caller
            // never sees a silently missing compound.
            let _ = job.result_tx.send(cancelled_outcome(&job.compound));
            continue;
        }

        let outcome = pipeline::process_compound(
            &ctx,
            job.index,
            job.total,
            &job.compound,
            job.progress.as_ref(),
            &cancel,
        )
        .await;
        let _ = job.result_tx.send(outcome);
    }
}

fn cancelled_outcome(compound: &str) -> CompoundOutcome {
    CompoundOutcome {
        compound: compound.to_string(),
        synonyms_used: vec![],
        status: CompoundStatus::Failed,
        reason: Some("search cancelled".into()),
        articles: vec![],
        failed_expressions: vec![],
    }
}

/// Run a full search over the pool and assemble the combined result set.
pub async fn run_search(
    request: SearchRequest,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> SearchOutcome {
    let total = request.compounds.len();
    if total == 0 {
        return SearchOutcome {
            compounds: vec![],
            combined: vec![],
        };
    }

    let num_workers = config.concurrency_limit.max(1);
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);
    let ctx = Arc::new(SearchContext::new(&request, config));

    let pool = SearchPool::new(ctx, cancel.clone(), num_workers);

    // Submit all compounds and collect oneshot receivers
    let mut receivers = Vec::with_capacity(total);
    for (i, compound) in request.compounds.iter().enumerate() {
        let (result_tx, result_rx) = oneshot::channel();
        let job = CompoundJob {
            compound: compound.clone(),
            index: i,
            total,
            result_tx,
            progress: progress.clone(),
        };
        pool.submit(job).await;
        receivers.push((compound.clone(), result_rx));
    }

    // Collect results in input order
    let mut compounds: Vec<CompoundOutcome> = Vec::with_capacity(total);
    for (compound, rx) in receivers {
        match rx.await {
            Ok(outcome) => compounds.push(outcome),
            Err(_) => compounds.push(cancelled_outcome(&compound)),
        }
    }

    pool.shutdown().await;

    // Combined set across all compounds, deduplicated again by the same
    // aggregator (idempotent over the per-compound deduplicated lists)
    let combined = aggregate::merge(compounds.iter().map(|c| c.articles.clone()));

    SearchOutcome {
        compounds,
        combined,
    }
}
