use crate::client::SpeachesClient;
use crate::error::Error;
use crate::model::ModelId;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

/// Exponential delay between attempts for the same model.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrefetchStatus {
    Downloaded,
    AlreadyPresent,
    Failed { reason: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrefetchOutcome {
    pub model: ModelId,
    #[serde(flatten)]
    pub status: PrefetchStatus,
    pub attempts: u32,
}

impl PrefetchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, PrefetchStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrefetchReport {
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<PrefetchOutcome>,
}

impl PrefetchReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| !o.is_failure() && o.status != PrefetchStatus::Skipped)
    }
}

/// Registers models with the server one at a time, in order.
pub struct Prefetcher<'a> {
    client: &'a SpeachesClient,
    retries: u32,
    backoff: Backoff,
    fail_fast: bool,
}

impl<'a> Prefetcher<'a> {
    pub fn new(client: &'a SpeachesClient, retries: u32) -> Self {
        Self {
            client,
            retries,
            backoff: Backoff::default(),
            fail_fast: false,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub async fn run(&self, models: &[ModelId]) -> PrefetchReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(models.len());
        let mut stopped = false;

        for model in models {
            if stopped {
                outcomes.push(PrefetchOutcome {
                    model: model.clone(),
                    status: PrefetchStatus::Skipped,
                    attempts: 0,
                });
                continue;
            }

            let outcome = self.prefetch_one(model).await;
            if outcome.is_failure() && self.fail_fast {
                tracing::warn!("Stopping after failure of '{}'", model);
                stopped = true;
            }
            outcomes.push(outcome);
        }

        PrefetchReport {
            base_url: self.client.base_url().to_string(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    pub async fn prefetch_one(&self, model: &ModelId) -> PrefetchOutcome {
        tracing::info!("Prefetching model: {}", model);

        let mut attempts = 0;
        let status = loop {
            attempts += 1;
            match self.client.prefetch(model).await {
                Ok(code) => break classify(code),
                Err(e) if e.is_transient() && attempts <= self.retries => {
                    let delay = self.backoff.delay(attempts);
                    tracing::warn!(
                        "Attempt {}/{} for '{}' failed: {}; retrying in {:?}",
                        attempts,
                        self.retries.saturating_add(1),
                        model,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break failed(model, &e),
            }
        };

        match &status {
            PrefetchStatus::Downloaded => tracing::info!("Model '{}' downloaded", model),
            PrefetchStatus::AlreadyPresent => {
                tracing::info!("Model '{}' already present", model)
            }
            _ => {}
        }

        PrefetchOutcome {
            model: model.clone(),
            status,
            attempts,
        }
    }
}

fn classify(code: StatusCode) -> PrefetchStatus {
    if code == StatusCode::CREATED {
        PrefetchStatus::Downloaded
    } else {
        PrefetchStatus::AlreadyPresent
    }
}

fn failed(model: &ModelId, err: &Error) -> PrefetchStatus {
    tracing::error!("Failed to prefetch '{}': {}", model, err);
    PrefetchStatus::Failed {
        reason: err.to_string(),
    }
}
