//! Runs several independent filter jobs concurrently and collects their
//! outcomes.
//!
//! Jobs share nothing but the HTTP client. There is no overall deadline:
//! `dispatch` returns only after every job has finished, so a job stuck on
//! a slow server holds up the batch for as long as its fetch timeout
//! allows.

use futures::future::join_all;
use tracing::Instrument;

use crate::config::FilterJob;
use crate::feed::FetchPolicy;
use crate::pipeline::{run_job, RunError, RunSummary};

/// The result of one job in a batch.
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub result: Result<RunSummary, RunError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Launches every job and waits for all of them.
///
/// Failures never escape: each one is logged and reported in its
/// [`JobOutcome`]. Outcomes are returned in the order of `jobs`.
pub async fn dispatch(
    jobs: &[FilterJob],
    client: &reqwest::Client,
    policy: &FetchPolicy,
) -> Vec<JobOutcome> {
    tracing::info!(jobs = jobs.len(), "Dispatching filter jobs");

    let runs: Vec<_> = jobs
        .iter()
        .map(|job| {
            tracing::info!(job = %job.name, url = %job.source_url, "Launching");
            let span = tracing::info_span!("job", name = %job.name);
            async move {
                let result = run_job(client, job, policy).await;
                match &result {
                    Ok(summary) => tracing::info!(
                        retained = summary.retained,
                        removed = summary.total - summary.retained,
                        "Job finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "Job failed"),
                }
                JobOutcome {
                    name: job.name.clone(),
                    result,
                }
            }
            .instrument(span)
        })
        .collect();

    tracing::info!("Waiting for filter jobs to complete");
    let outcomes = join_all(runs).await;

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    tracing::info!(
        succeeded = outcomes.len() - failed,
        failed,
        "All filter jobs have completed"
    );
    outcomes
}
