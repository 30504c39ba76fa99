//! Notification Dispatcher (C6): fans a notification out across the
//! four delivery channels to every resolved subscriber.

pub mod channel;
pub mod dispatcher;
pub mod hub;

pub use channel::{ChannelError, EmailChannel, NotificationChannel, SystemLogChannel, WebhookChannel, WebsocketChannel};
pub use dispatcher::NotificationDispatcher;
pub use hub::NotificationHub;
