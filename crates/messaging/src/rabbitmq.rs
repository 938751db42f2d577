//! RabbitMQ broker over lapin.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, acker::Acker, options::*,
    types::{AMQPValue, FieldTable},
};
use metrics::counter;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    Acknowledger, Declaration, Delivery, DeliveryStream, EventPublisher, ExchangeKind,
    MessageSource, MessagingError, ReceivedMessage, Result, Topology,
    publisher::check_publish_args,
};

/// RabbitMQ message broker.
///
/// Owns the connection. Publishing goes through one dedicated channel with
/// publisher confirms; every consumer gets its own channel for the
/// lifetime of its stream.
pub struct RabbitMqBroker {
    connection: Connection,
    publish_channel: Channel,
    exchange: String,
}

impl RabbitMqBroker {
    /// Connects and opens the publishing channel.
    pub async fn connect(url: &str, exchange: impl Into<String>) -> Result<Self> {
        let exchange = exchange.into();
        info!(exchange = %exchange, "Connecting to RabbitMQ");

        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let publish_channel = connection.create_channel().await?;
        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        info!("Connected to RabbitMQ");

        Ok(Self {
            connection,
            publish_channel,
            exchange,
        })
    }

    /// Declares every exchange, queue and binding on a short-lived channel.
    pub async fn declare_topology(&self, topology: &Topology) -> Result<()> {
        let channel = self.connection.create_channel().await?;

        for declaration in topology.declarations() {
            apply_declaration(&channel, &declaration).await?;
        }

        if let Err(e) = channel.close(200, "Topology declared").await {
            warn!(error = %e, "Error closing topology channel");
        }

        info!(exchange = %topology.exchange(), "Broker topology declared");
        Ok(())
    }

    /// Closes the connection and every channel on it.
    pub async fn close(&self) -> Result<()> {
        info!("Closing RabbitMQ connection");
        self.connection.close(200, "Normal shutdown").await?;
        Ok(())
    }

    async fn send(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        check_publish_args(routing_key, payload)?;

        if !self.connection.status().connected() {
            return Err(MessagingError::ConnectionClosed);
        }
        if !self.publish_channel.status().connected() {
            return Err(MessagingError::ChannelClosed);
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_timestamp(timestamp);

        let confirm = self
            .publish_channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| MessagingError::Publish(e.to_string()))?;

        let confirmation = confirm
            .await
            .map_err(|e| MessagingError::Publish(format!("publisher confirm failed: {e}")))?;

        if confirmation.is_nack() {
            return Err(MessagingError::Publish(format!(
                "broker rejected message for {routing_key}"
            )));
        }

        Ok(())
    }
}

async fn apply_declaration(channel: &Channel, declaration: &Declaration) -> Result<()> {
    match declaration {
        Declaration::Exchange { name, kind } => {
            channel
                .exchange_declare(
                    name,
                    lapin::ExchangeKind::from(*kind),
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        Declaration::Queue {
            name,
            dead_letter_exchange,
        } => {
            let mut arguments = FieldTable::default();
            if let Some(dlx) = dead_letter_exchange {
                arguments.insert(
                    "x-dead-letter-exchange".into(),
                    AMQPValue::LongString(dlx.as_str().into()),
                );
            }
            channel
                .queue_declare(
                    name,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    arguments,
                )
                .await?;
        }
        Declaration::Binding {
            queue,
            exchange,
            routing_key,
        } => {
            channel
                .queue_bind(
                    queue,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
    }

    debug!(?declaration, "Declared");
    Ok(())
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

#[async_trait]
impl EventPublisher for RabbitMqBroker {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        match self.send(routing_key, payload).await {
            Ok(()) => {
                counter!("events_published_total", "event_type" => routing_key.to_string())
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                counter!("events_publish_failed_total", "event_type" => routing_key.to_string())
                    .increment(1);
                error!(routing_key, error = %e, "Failed to publish message");
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}

#[async_trait]
impl MessageSource for RabbitMqBroker {
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream> {
        if !self.connection.status().connected() {
            return Err(MessagingError::ConnectionClosed);
        }

        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::Consume(e.to_string()))?;

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("{queue}-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Consume(e.to_string()))?;

        debug!(queue, consumer_tag = %consumer_tag, prefetch, "Consumer started");

        let owned_queue = queue.to_string();
        let deliveries = consumer.map(move |item| {
            item.map(|delivery| into_delivery(&owned_queue, delivery))
                .map_err(MessagingError::from)
        });

        Ok(Box::pin(ChannelStream {
            deliveries: Box::pin(deliveries),
            channel,
            queue: queue.to_string(),
        }))
    }
}

/// Delivery stream that closes its consumer channel once dropped.
///
/// Closing the channel cancels the consumer; anything still unacknowledged
/// on it goes back to the queue.
struct ChannelStream {
    deliveries: DeliveryStream,
    channel: Channel,
    queue: String,
}

impl Stream for ChannelStream {
    type Item = Result<Delivery>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.deliveries.poll_next_unpin(cx)
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        if !self.channel.status().connected() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(queue = %self.queue, "No runtime to close consumer channel on");
            return;
        };

        let channel = self.channel.clone();
        let queue = std::mem::take(&mut self.queue);
        runtime.spawn(async move {
            match channel.close(200, "Consumer stopped").await {
                Ok(()) => debug!(queue = %queue, "Consumer channel closed"),
                Err(e) => warn!(queue = %queue, error = %e, "Error closing consumer channel"),
            }
        });
    }
}

fn into_delivery(queue: &str, delivery: lapin::message::Delivery) -> Delivery {
    let message = ReceivedMessage {
        queue: queue.to_string(),
        routing_key: delivery.routing_key.as_str().to_string(),
        payload: delivery.data,
        redelivered: delivery.redelivered,
    };
    Delivery::new(message, Box::new(LapinAcker(delivery.acker)))
}

struct LapinAcker(Acker);

#[async_trait]
impl Acknowledger for LapinAcker {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::Ack(e.to_string()))
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.0
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::Ack(e.to_string()))
    }
}
