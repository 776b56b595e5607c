pub mod crypto;
pub mod http;
pub mod retry;
pub mod time;
