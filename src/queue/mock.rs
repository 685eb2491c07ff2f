use super::{publish_within, JobDelivery, JobPublisher, JobSource};
use crate::models::ConversionJob;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory queue. Acts as the publisher and, through [`MockQueue::source`],
/// as the subscription. Settled payloads are kept for inspection.
#[derive(Clone)]
pub struct MockQueue {
    pending: Arc<Mutex<VecDeque<Vec<u8>>>>,
    published: Arc<Mutex<Vec<ConversionJob>>>,
    acked: Arc<Mutex<Vec<Vec<u8>>>>,
    rejected: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_publish: Arc<Mutex<bool>>,
    stall_publish: Arc<Mutex<bool>>,
    publish_timeout: Duration,
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            published: Arc::new(Mutex::new(Vec::new())),
            acked: Arc::new(Mutex::new(Vec::new())),
            rejected: Arc::new(Mutex::new(Vec::new())),
            fail_publish: Arc::new(Mutex::new(false)),
            stall_publish: Arc::new(Mutex::new(false)),
            publish_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_publish_failure(self, fail: bool) -> Self {
        *self.fail_publish.lock().unwrap() = fail;
        self
    }

    /// Publishes never get a broker confirm and run into the publish deadline.
    pub fn with_stalled_publish(self, stall: bool) -> Self {
        *self.stall_publish.lock().unwrap() = stall;
        self
    }

    /// Enqueue a raw message body, bypassing serialization.
    pub fn push_raw(&self, payload: Vec<u8>) {
        self.pending.lock().unwrap().push_back(payload);
    }

    pub fn source(&self) -> MockJobSource {
        MockJobSource {
            queue: self.clone(),
        }
    }

    pub fn get_published(&self) -> Vec<ConversionJob> {
        self.published.lock().unwrap().clone()
    }

    pub fn get_acked(&self) -> Vec<Vec<u8>> {
        self.acked.lock().unwrap().clone()
    }

    pub fn get_rejected(&self) -> Vec<Vec<u8>> {
        self.rejected.lock().unwrap().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobPublisher for MockQueue {
    async fn publish(&self, job: &ConversionJob) -> Result<()> {
        if *self.fail_publish.lock().unwrap() {
            return Err(Error::Queue("Mock broker unreachable".to_string()));
        }

        let stalled = *self.stall_publish.lock().unwrap();
        publish_within(self.publish_timeout, async {
            if stalled {
                std::future::pending::<()>().await;
            }
            self.push_raw(job.to_vec()?);
            self.published.lock().unwrap().push(job.clone());
            Ok::<_, Error>(())
        })
        .await
    }
}

/// Drains the queue and ends when it is empty.
pub struct MockJobSource {
    queue: MockQueue,
}

#[async_trait]
impl JobSource for MockJobSource {
    async fn next_delivery(&mut self) -> Result<Option<Box<dyn JobDelivery>>> {
        let next = self.queue.pending.lock().unwrap().pop_front();
        Ok(next.map(|payload| {
            Box::new(MockDelivery {
                payload,
                queue: self.queue.clone(),
            }) as Box<dyn JobDelivery>
        }))
    }
}

struct MockDelivery {
    payload: Vec<u8>,
    queue: MockQueue,
}

#[async_trait]
impl JobDelivery for MockDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<()> {
        self.queue.acked.lock().unwrap().push(self.payload.clone());
        Ok(())
    }

    async fn reject(&self) -> Result<()> {
        self.queue
            .rejected
            .lock()
            .unwrap()
            .push(self.payload.clone());
        Ok(())
    }
}
