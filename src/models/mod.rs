pub mod event;
pub mod notification_topic;
pub mod webhook;
pub mod webhook_log;
