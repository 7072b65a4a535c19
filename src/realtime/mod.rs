pub mod chat;
pub mod publisher;
pub mod registry;
pub mod sse;

pub use publisher::NotificationPublisher;
pub use registry::{SubscriptionRegistry, Unsubscribe};

use crate::db::{ChatMessage, Notification};

/// Live notification channels keyed by recipient.
pub type NotificationHub = SubscriptionRegistry<Notification>;

/// Live chat channels keyed by room id.
pub type RoomHub = SubscriptionRegistry<ChatMessage>;
