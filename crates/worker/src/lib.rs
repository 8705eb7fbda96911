//! Webhook delivery workers.
//!
//! Workers poll the notification job queue under a lease, deliver the
//! payload to every active endpoint of the job's ledger, and either complete
//! the job or hand it back to the queue with exponential backoff. Delivery is
//! at-least-once; receivers deduplicate on the event ID header.

pub mod delivery;
pub mod signature;

use std::time::Duration;

use reqwest::Client;
use sea_orm::DatabaseConnection;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ledaas_core::outbox::BackoffPolicy;
use ledaas_db::entities::notification_jobs;
use ledaas_db::repositories::{DeliveryAttempt, OutboxError, OutboxRepository, WebhookRepository};
use ledaas_shared::config::WebhookConfig;

use crate::delivery::deliver;

/// One webhook delivery worker.
pub struct WebhookWorker {
    outbox: OutboxRepository,
    webhooks: WebhookRepository,
    client: Client,
    policy: BackoffPolicy,
    config: WebhookConfig,
    worker_id: String,
}

impl WebhookWorker {
    /// Creates a worker with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        db: DatabaseConnection,
        config: WebhookConfig,
        worker_id: String,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let policy = BackoffPolicy {
            base_secs: config.backoff_base_secs,
            factor: config.backoff_factor,
            max_attempts: config.max_attempts,
        };

        Ok(Self {
            outbox: OutboxRepository::new(db.clone()),
            webhooks: WebhookRepository::new(db),
            client,
            policy,
            config,
            worker_id,
        })
    }

    /// Runs the poll loop until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "Webhook worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let processed = self.tick().await;
            if processed == 0 {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
                }
            }
        }

        info!(worker_id = %self.worker_id, "Webhook worker stopped");
    }

    /// Leases one batch and processes every job in it. Returns how many jobs
    /// were claimed.
    async fn tick(&self) -> usize {
        let lease = chrono::Duration::seconds(
            i64::try_from(self.config.lease_secs).unwrap_or(i64::MAX),
        );
        let jobs = match self
            .outbox
            .lease(&self.worker_id, self.config.batch_size, lease)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(worker_id = %self.worker_id, error = %e, "Failed to lease jobs");
                return 0;
            }
        };

        let count = jobs.len();
        for job in jobs {
            self.process(job).await;
        }
        count
    }

    /// Delivers one job to every active endpoint of its ledger.
    ///
    /// The job completes only when every endpoint acknowledged with 2xx; any
    /// failure hands the whole job back with backoff, so an endpoint that
    /// already acknowledged may see the event again (hence the dedup header).
    async fn process(&self, job: notification_jobs::Model) {
        let attempt = u32::try_from(job.attempt).unwrap_or(u32::MAX).saturating_add(1);

        let endpoints = match self.webhooks.active_endpoints(job.ledger_id).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to load endpoints");
                self.fail_job(job.id, &format!("endpoint lookup failed: {e}"))
                    .await;
                return;
            }
        };

        // No subscribers means nothing to deliver.
        if endpoints.is_empty() {
            debug!(job_id = %job.id, "No active endpoints, completing job");
            self.complete_job(job.id).await;
            return;
        }

        let payload = match serde_json::to_vec(&job.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail_job(job.id, &format!("payload encoding failed: {e}"))
                    .await;
                return;
            }
        };

        let mut failures = Vec::new();
        for endpoint in endpoints {
            let outcome = deliver(
                &self.client,
                &endpoint.url,
                &endpoint.secret,
                &payload,
                job.id,
                attempt,
            )
            .await;

            let recorded = self
                .webhooks
                .record_delivery(DeliveryAttempt {
                    job_id: job.id,
                    webhook_endpoint_id: endpoint.id,
                    attempt: i32::try_from(attempt).unwrap_or(i32::MAX),
                    status: outcome.status(),
                    http_status: outcome.http_status(),
                    error_message: outcome.error_message(),
                })
                .await;
            if let Err(e) = recorded {
                warn!(job_id = %job.id, error = %e, "Failed to record delivery attempt");
            }

            if !outcome.is_success() {
                failures.push(format!(
                    "{}: {}",
                    endpoint.url,
                    outcome.error_message().unwrap_or_default()
                ));
            }
        }

        if failures.is_empty() {
            self.complete_job(job.id).await;
        } else {
            self.fail_job(job.id, &failures.join("; ")).await;
        }
    }

    async fn complete_job(&self, job_id: uuid::Uuid) {
        match self.outbox.complete(job_id, &self.worker_id).await {
            Ok(()) => debug!(job_id = %job_id, "Job delivered"),
            Err(OutboxError::LeaseLost(_)) => {
                // The lease expired mid-delivery and another worker took over.
                warn!(job_id = %job_id, worker_id = %self.worker_id, "Lease lost before completion");
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to complete job"),
        }
    }

    async fn fail_job(&self, job_id: uuid::Uuid, error: &str) {
        match self
            .outbox
            .fail(job_id, &self.worker_id, error, &self.policy)
            .await
        {
            Ok(state) => {
                debug!(job_id = %job_id, next_state = ?state, "Job delivery failed");
            }
            Err(OutboxError::LeaseLost(_)) => {
                warn!(job_id = %job_id, worker_id = %self.worker_id, "Lease lost before failure record");
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to record job failure"),
        }
    }
}

/// Spawns the configured number of delivery workers.
///
/// # Errors
///
/// Returns an error if a worker's HTTP client cannot be built.
pub fn spawn_workers(
    db: &DatabaseConnection,
    config: &WebhookConfig,
    shutdown: &watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, reqwest::Error> {
    let mut handles = Vec::with_capacity(usize::try_from(config.worker_count).unwrap_or(0));
    for index in 0..config.worker_count {
        let worker = WebhookWorker::new(
            db.clone(),
            config.clone(),
            format!("webhook-worker-{index}"),
        )?;
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }
    Ok(handles)
}
