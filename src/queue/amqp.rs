use super::{publish_within, JobDelivery, JobPublisher, JobSource};
use crate::models::{ConversionJob, QueueConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::time::Duration;
use tracing::info;

fn queue_error(context: &str, e: lapin::Error) -> Error {
    Error::Queue(format!("{}: {}", context, e))
}

fn check_confirmation(confirmation: Confirmation) -> Result<()> {
    match confirmation {
        Confirmation::Ack(_) => Ok(()),
        Confirmation::Nack(_) => Err(Error::Queue("Broker nacked job".to_string())),
        Confirmation::NotRequested => Err(Error::Queue(
            "Publisher confirms are not enabled on the channel".to_string(),
        )),
    }
}

/// Broker connection with the job queue declared on one channel.
pub struct AmqpConnection {
    connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl AmqpConnection {
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| queue_error("Failed to connect to broker", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| queue_error("Failed to open channel", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| queue_error("Failed to enable publisher confirms", e))?;

        // Non-durable, shared, kept when idle
        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| queue_error("Failed to declare queue", e))?;

        info!("Connected to broker, queue '{}' declared", config.queue_name);

        Ok(Self {
            connection,
            channel,
            queue_name: config.queue_name.clone(),
        })
    }

    pub fn publisher(&self, publish_timeout: Duration) -> AmqpPublisher {
        AmqpPublisher {
            channel: self.channel.clone(),
            queue_name: self.queue_name.clone(),
            publish_timeout,
        }
    }

    /// Subscribe with manual acknowledgement.
    pub async fn consume(&self, consumer_tag: &str) -> Result<AmqpJobSource> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| queue_error("Failed to start consumer", e))?;

        Ok(AmqpJobSource { consumer })
    }

    pub async fn close(&self) -> Result<()> {
        self.channel
            .close(200, "bye")
            .await
            .map_err(|e| queue_error("Failed to close channel", e))?;
        self.connection
            .close(200, "bye")
            .await
            .map_err(|e| queue_error("Failed to close connection", e))
    }
}

pub struct AmqpPublisher {
    channel: Channel,
    queue_name: String,
    publish_timeout: Duration,
}

#[async_trait]
impl JobPublisher for AmqpPublisher {
    async fn publish(&self, job: &ConversionJob) -> Result<()> {
        let payload = job.to_vec()?;

        let publish = async {
            let confirm = self
                .channel
                .basic_publish(
                    "",
                    &self.queue_name,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default().with_content_type("application/json".into()),
                )
                .await
                .map_err(|e| queue_error("Failed to publish job", e))?;
            let confirmation = confirm
                .await
                .map_err(|e| queue_error("Broker did not confirm job", e))?;
            check_confirmation(confirmation)
        };

        publish_within(self.publish_timeout, publish).await
    }
}

pub struct AmqpJobSource {
    consumer: Consumer,
}

#[async_trait]
impl JobSource for AmqpJobSource {
    async fn next_delivery(&mut self) -> Result<Option<Box<dyn JobDelivery>>> {
        match self.consumer.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(queue_error("Consumer stream failed", e)),
            Some(Ok(delivery)) => Ok(Some(Box::new(AmqpDelivery { delivery }))),
        }
    }
}

struct AmqpDelivery {
    delivery: Delivery,
}

#[async_trait]
impl JobDelivery for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(&self) -> Result<()> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| queue_error("Failed to ack delivery", e))
    }

    async fn reject(&self) -> Result<()> {
        self.delivery
            .acker
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|e| queue_error("Failed to reject delivery", e))
    }
}
