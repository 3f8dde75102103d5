use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use std::future::Future;
use tracing::{error, info, warn};

use domain::{
    error::{BookingError, BookingResult},
    repositories::event_bus::EventBus,
    value_objects::events::{OutboundMessage, POISONED_SUFFIX},
};

/// Redeliveries a message gets before it is routed to the poison queue.
const MAX_RETRIES: u32 = 3;

const RETRY_HEADER: &str = "x-retries";

/// Names the three queues of one consumer: the primary topic it feeds on,
/// the durable queue the handler reads, and the poison destination for
/// messages that keep failing.
#[derive(Debug, Clone)]
pub struct ConsumerRegistration {
    pub topic: String,
    pub queue: String,
    pub poison_topic: String,
}

impl ConsumerRegistration {
    pub fn for_topic(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            queue: format!("{topic}_handler"),
            poison_topic: format!("{topic}{POISONED_SUFFIX}"),
        }
    }
}

/// A message as delivered to a consumer handler.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Opaque unique id assigned at publish time; consumers may dedupe on
    /// it under at-least-once delivery.
    pub id: Option<String>,
    pub payload: Vec<u8>,
}

/// Durable publish/subscribe over an AMQP direct exchange.
pub struct AmqpEventBus {
    channel: Channel,
    exchange: String,
}

impl AmqpEventBus {
    pub async fn connect(uri: &str, exchange: &str) -> AnyResult<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .context("error connecting to message stream")?;
        let channel = connection
            .create_channel()
            .await
            .context("error opening channel")?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("error declaring exchange")?;

        info!(exchange, "message stream connection has been established");

        Ok(Self {
            channel,
            exchange: exchange.to_string(),
        })
    }

    async fn publish_raw(
        &self,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> AnyResult<()> {
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .context("error publishing message")?
            .await
            .context("error awaiting publish confirmation")?;
        Ok(())
    }

    /// Consume `registration.topic` forever, feeding each delivery to
    /// `handler`. A failed delivery is republished with a bumped retry
    /// header; once the count reaches the ceiling it goes to the poison
    /// queue instead. Every delivery is acked so redelivery stays under
    /// our control.
    pub async fn run_consumer<F, Fut>(
        &self,
        registration: ConsumerRegistration,
        handler: F,
    ) -> AnyResult<()>
    where
        F: Fn(InboundMessage) -> Fut,
        Fut: Future<Output = BookingResult<()>>,
    {
        for (queue, routing_key) in [
            (&registration.queue, &registration.topic),
            (&registration.poison_topic, &registration.poison_topic),
        ] {
            self.channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .context("error declaring queue")?;
            self.channel
                .queue_bind(
                    queue,
                    &self.exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .context("error binding queue")?;
        }

        let mut consumer = self
            .channel
            .basic_consume(
                &registration.queue,
                &format!("{}_consumer", registration.topic),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("error starting consumer")?;

        info!(topic = %registration.topic, queue = %registration.queue, "consumer started");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery.context("error receiving delivery")?;

            let message_id = delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.to_string());
            let retries = retry_count(delivery.properties.headers());

            let outcome = handler(InboundMessage {
                id: message_id.clone(),
                payload: delivery.data.clone(),
            })
            .await;

            if let Err(err) = outcome {
                if exceeds_retry_ceiling(retries + 1) {
                    error!(
                        topic = %registration.topic,
                        message_id = ?message_id,
                        retries,
                        %err,
                        "handler kept failing, routing message to poison queue"
                    );
                    self.publish_raw(
                        &registration.poison_topic,
                        &delivery.data,
                        delivery.properties.clone(),
                    )
                    .await?;
                } else {
                    warn!(
                        topic = %registration.topic,
                        message_id = ?message_id,
                        retries,
                        %err,
                        "handler failed, requeueing message"
                    );
                    let properties = with_retry_count(delivery.properties.clone(), retries + 1);
                    self.publish_raw(&registration.topic, &delivery.data, properties)
                        .await?;
                }
            }

            delivery
                .ack(BasicAckOptions::default())
                .await
                .context("error acking delivery")?;
        }

        Ok(())
    }
}

#[async_trait]
impl EventBus for AmqpEventBus {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> BookingResult<()> {
        let properties = BasicProperties::default()
            .with_message_id(message.id.to_string().into())
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        self.publish_raw(topic, &message.payload, properties)
            .await
            .map_err(BookingError::Internal)?;

        Ok(())
    }
}

fn retry_count(headers: &Option<FieldTable>) -> u32 {
    headers
        .as_ref()
        .and_then(|table| table.inner().get(RETRY_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

fn with_retry_count(properties: BasicProperties, retries: u32) -> BasicProperties {
    let mut headers = properties
        .headers()
        .clone()
        .unwrap_or_else(FieldTable::default);
    headers.insert(RETRY_HEADER.into(), AMQPValue::LongUInt(retries));
    properties.with_headers(headers)
}

fn exceeds_retry_ceiling(retries: u32) -> bool {
    retries >= MAX_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_foreign_headers_mean_first_delivery() {
        assert_eq!(retry_count(&None), 0);

        let mut table = FieldTable::default();
        table.insert("x-other".into(), AMQPValue::LongUInt(9));
        assert_eq!(retry_count(&Some(table)), 0);
    }

    #[test]
    fn retry_header_round_trips_through_properties() {
        let properties = with_retry_count(BasicProperties::default(), 2);
        assert_eq!(retry_count(properties.headers()), 2);
    }

    #[test]
    fn third_failure_goes_to_the_poison_queue() {
        assert!(!exceeds_retry_ceiling(1));
        assert!(!exceeds_retry_ceiling(2));
        assert!(exceeds_retry_ceiling(3));
    }
}
