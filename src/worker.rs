//! Conversion job consumer.
//!
//! Each delivery walks `Received → FetchOriginal → ConvertLoop(0..N) → Cleanup`
//! and ends in exactly one settlement: acknowledged when every format was
//! converted and uploaded, rejected without requeue otherwise. Jobs are handled
//! strictly one after another, and so are the formats within a job.

use crate::convert::ConversionEngine;
use crate::models::{ConversionJob, WorkerConfig};
use crate::queue::{JobDelivery, JobSource};
use crate::storage::BlobStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{error, info, warn};

/// Where a job was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Received,
    FetchOriginal,
    ConvertLoop { index: usize },
    Cleanup,
}

#[derive(Debug)]
pub enum JobOutcome {
    /// All formats uploaded. `original_deleted` is false when the final
    /// delete failed, which does not fail the job.
    Acked {
        uploaded: Vec<String>,
        original_deleted: bool,
    },
    Rejected { stage: JobStage, error: Error },
}

impl JobOutcome {
    pub fn is_acked(&self) -> bool {
        matches!(self, JobOutcome::Acked { .. })
    }
}

enum JobState<'a> {
    Received(&'a [u8]),
    FetchOriginal(ConversionJob),
    ConvertLoop {
        job: ConversionJob,
        original: Vec<u8>,
        index: usize,
        uploaded: Vec<String>,
    },
    Cleanup {
        job: ConversionJob,
        uploaded: Vec<String>,
    },
}

impl JobState<'_> {
    fn stage(&self) -> JobStage {
        match self {
            JobState::Received(_) => JobStage::Received,
            JobState::FetchOriginal(_) => JobStage::FetchOriginal,
            JobState::ConvertLoop { index, .. } => JobStage::ConvertLoop { index: *index },
            JobState::Cleanup { .. } => JobStage::Cleanup,
        }
    }
}

enum Transition<'a> {
    Next(JobState<'a>),
    Done(JobOutcome),
}

fn reject(stage: JobStage, error: Error) -> Transition<'static> {
    Transition::Done(JobOutcome::Rejected { stage, error })
}

/// Running totals for one [`Worker::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub acked: usize,
    pub rejected: usize,
}

pub struct Worker {
    store: Arc<dyn BlobStore>,
    engine: ConversionEngine,
    job_timeout: Duration,
}

impl Worker {
    pub fn new(store: Arc<dyn BlobStore>, engine: ConversionEngine, config: &WorkerConfig) -> Self {
        Self {
            store,
            engine,
            job_timeout: config.job_timeout,
        }
    }

    /// Consume deliveries until the source ends.
    pub async fn run(&self, source: &mut dyn JobSource) -> Result<WorkerStats> {
        info!("Waiting for conversion jobs");
        let mut stats = WorkerStats::default();

        while let Some(delivery) = source.next_delivery().await? {
            if self.settle(delivery.as_ref()).await {
                stats.acked += 1;
            } else {
                stats.rejected += 1;
            }
        }

        info!(
            "Subscription ended after {} acked and {} rejected jobs",
            stats.acked, stats.rejected
        );
        Ok(stats)
    }

    /// Process one delivery and settle it. Returns true when it was acked.
    pub async fn settle(&self, delivery: &dyn JobDelivery) -> bool {
        let outcome = self.process(delivery.payload()).await;

        match outcome {
            JobOutcome::Acked { uploaded, .. } => {
                if let Err(e) = delivery.ack().await {
                    error!("Job finished but ack failed: {}", e);
                }
                info!("Image has been processed successfully ({} derived)", uploaded.len());
                true
            }
            JobOutcome::Rejected { stage, error } => {
                error!("Job rejected at {:?}: {}", stage, error);
                if let Err(e) = delivery.reject().await {
                    error!("Failed to reject delivery: {}", e);
                }
                false
            }
        }
    }

    /// Drive one message body to its outcome. The job deadline bounds every
    /// stage up to the last upload; cleanup has its own bound and never
    /// turns a finished job into a rejection.
    pub async fn process(&self, payload: &[u8]) -> JobOutcome {
        let deadline = Instant::now() + self.job_timeout;
        let mut state = JobState::Received(payload);

        loop {
            if let JobState::Cleanup { job, uploaded } = state {
                return self.cleanup(job, uploaded).await;
            }

            let stage = state.stage();
            let transition = match timeout_at(deadline, self.step(state)).await {
                Ok(transition) => transition,
                Err(_) => {
                    return JobOutcome::Rejected {
                        stage,
                        error: Error::JobTimeout(self.job_timeout.as_secs()),
                    }
                }
            };

            match transition {
                Transition::Next(next) => state = next,
                Transition::Done(outcome) => return outcome,
            }
        }
    }

    async fn step<'a>(&self, state: JobState<'a>) -> Transition<'a> {
        match state {
            JobState::Received(payload) => match ConversionJob::from_slice(payload) {
                Ok(job) => {
                    info!(
                        "Received job for '{}' -> '{}' as {:?}",
                        job.original_image_name, job.save_name, job.save_formats
                    );
                    Transition::Next(JobState::FetchOriginal(job))
                }
                Err(e) => reject(JobStage::Received, e),
            },

            JobState::FetchOriginal(job) => match self.store.fetch(&job.original_image_name).await
            {
                Ok(original) => Transition::Next(JobState::ConvertLoop {
                    job,
                    original,
                    index: 0,
                    uploaded: Vec::new(),
                }),
                Err(e) => reject(JobStage::FetchOriginal, e),
            },

            JobState::ConvertLoop {
                job,
                original,
                index,
                mut uploaded,
            } => {
                let Some(format) = job.save_formats.get(index) else {
                    return Transition::Next(JobState::Cleanup { job, uploaded });
                };

                match self.convert_and_upload(&job, &original, format).await {
                    Ok(key) => {
                        uploaded.push(key);
                        Transition::Next(JobState::ConvertLoop {
                            job,
                            original,
                            index: index + 1,
                            uploaded,
                        })
                    }
                    Err(e) => reject(JobStage::ConvertLoop { index }, e),
                }
            }

            JobState::Cleanup { job, uploaded } => {
                Transition::Done(self.cleanup(job, uploaded).await)
            }
        }
    }

    async fn cleanup(&self, job: ConversionJob, uploaded: Vec<String>) -> JobOutcome {
        let delete = timeout(self.job_timeout, self.store.delete(&job.original_image_name));
        let original_deleted = match delete.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Failed to delete the original image file: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    "Deleting the original image file timed out after {} seconds",
                    self.job_timeout.as_secs()
                );
                false
            }
        };

        JobOutcome::Acked {
            uploaded,
            original_deleted,
        }
    }

    async fn convert_and_upload(
        &self,
        job: &ConversionJob,
        original: &[u8],
        format: &str,
    ) -> Result<String> {
        let derived = self
            .engine
            .convert(original, &job.original_image_name, &job.save_name, format)
            .await?;

        self.store.store(&derived.name, &derived.bytes).await?;
        info!("Uploaded {} ({} bytes)", derived.name, derived.bytes.len());
        Ok(derived.name)
    }
}
