//! Job queue integration
//!
//! The producer publishes [`ConversionJob`](crate::models::ConversionJob)
//! messages; the worker pulls deliveries one at a time and settles each one
//! explicitly, either acknowledging it or rejecting it without requeue.

pub mod amqp;
pub mod mock;

pub use amqp::{AmqpConnection, AmqpJobSource, AmqpPublisher};
pub use mock::MockQueue;

use crate::models::ConversionJob;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Enqueue `job`. Does not retry.
    async fn publish(&self, job: &ConversionJob) -> Result<()>;
}

/// A received message awaiting settlement.
#[async_trait]
pub trait JobDelivery: Send + Sync {
    fn payload(&self) -> &[u8];
    async fn ack(&self) -> Result<()>;
    /// Reject without requeue.
    async fn reject(&self) -> Result<()>;
}

#[async_trait]
pub trait JobSource: Send {
    /// Next delivery, or `None` once the subscription has ended.
    async fn next_delivery(&mut self) -> Result<Option<Box<dyn JobDelivery>>>;
}

/// Bound a publish, broker confirm included, by `limit`.
pub(crate) async fn publish_within<F>(limit: Duration, publish: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::time::timeout(limit, publish)
        .await
        .map_err(|_| Error::PublishTimeout(limit.as_secs()))?
}
