//! Customer notification channels.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Result, SagaError};

/// Recipient used until orders carry customer contact details.
pub const DEFAULT_RECIPIENT: &str = "customer@example.com";

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the notification tells the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    Cancellation,
}

impl NotificationKind {
    /// Channels each kind goes out on. Cancellations are urgent and use SMS.
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            NotificationKind::Confirmation => &[Channel::Email, Channel::Push],
            NotificationKind::Cancellation => &[Channel::Email, Channel::Sms],
        }
    }

    /// Subject line used by channels that have one.
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::Confirmation => "Order Confirmation",
            NotificationKind::Cancellation => "Order Cancellation",
        }
    }
}

/// A notification about one order.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub recipient: String,
    pub kind: NotificationKind,
    pub message: String,
}

impl NotificationRequest {
    pub fn confirmation(order_id: OrderId, product_id: ProductId) -> Self {
        let message = format!("Your order has been confirmed! Product: {product_id}");
        Self::new(order_id, product_id, NotificationKind::Confirmation, message)
    }

    pub fn cancellation(order_id: OrderId, product_id: ProductId) -> Self {
        let message = format!(
            "Your order has been cancelled due to insufficient stock. Product: {product_id}"
        );
        Self::new(order_id, product_id, NotificationKind::Cancellation, message)
    }

    fn new(
        order_id: OrderId,
        product_id: ProductId,
        kind: NotificationKind,
        message: String,
    ) -> Self {
        Self {
            order_id,
            product_id,
            recipient: DEFAULT_RECIPIENT.to_string(),
            kind,
            message,
        }
    }
}

/// Sends notifications over a single channel.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, channel: Channel, request: &NotificationRequest) -> Result<()>;
}

/// Extension trait for fanning a notification out over several channels.
#[async_trait]
pub trait NotificationServiceExt: NotificationService {
    /// Sends `request` on every channel, continuing past per-channel
    /// failures. Returns the number of channels that accepted it.
    async fn send_multi_channel(&self, request: &NotificationRequest, channels: &[Channel]) -> usize {
        let mut delivered = 0;
        for &channel in channels {
            match self.send(channel, request).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    order_id = %request.order_id,
                    channel = %channel,
                    error = %e,
                    "Failed to send notification"
                ),
            }
        }
        delivered
    }
}

impl<T: NotificationService + ?Sized> NotificationServiceExt for T {}

/// Writes notifications to the log instead of a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn send(&self, channel: Channel, request: &NotificationRequest) -> Result<()> {
        info!(
            channel = %channel,
            order_id = %request.order_id,
            product_id = %request.product_id,
            recipient = %request.recipient,
            subject = request.kind.subject(),
            message = %request.message,
            "Notification sent"
        );
        Ok(())
    }
}

/// Records notifications for assertions; individual channels can be made
/// to fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    sent: Arc<Mutex<Vec<(Channel, NotificationRequest)>>>,
    failing: Arc<Mutex<HashSet<Channel>>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `channel` fail until reset.
    pub async fn set_channel_failing(&self, channel: Channel, failing: bool) {
        let mut set = self.failing.lock().await;
        if failing {
            set.insert(channel);
        } else {
            set.remove(&channel);
        }
    }

    /// Every notification delivered so far, in order.
    pub async fn sent(&self) -> Vec<(Channel, NotificationRequest)> {
        self.sent.lock().await.clone()
    }

    /// Channels used for `order_id`, in order.
    pub async fn channels_for(&self, order_id: &OrderId) -> Vec<Channel> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(_, r)| &r.order_id == order_id)
            .map(|(c, _)| *c)
            .collect()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send(&self, channel: Channel, request: &NotificationRequest) -> Result<()> {
        if self.failing.lock().await.contains(&channel) {
            return Err(SagaError::NotificationService(format!(
                "{channel} provider unavailable"
            )));
        }
        self.sent.lock().await.push((channel, request.clone()));
        Ok(())
    }
}
