pub mod event_bus;
pub mod event_service;
pub mod rate_limit_service;
pub mod signature_service;
pub mod topic_service;
pub mod webhook_service;
