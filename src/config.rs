use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

pub const APP_NAME: &str = "mailhook";
pub const SNS_EVENT_PATH: &str = "/sns/events";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub redis_url: String,
    pub public_host: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub otp_generate_rate_limit: usize,
    pub otp_generate_rate_limit_window: u64,
    pub otp_verify_rate_limit: usize,
    pub otp_verify_rate_limit_window: u64,
    pub http_timeout_secs: u64,
    pub event_queue_capacity: usize,
    pub listener_workers: usize,
    pub sns_cert_host_suffix: Option<String>,
    pub webhook_redelivery_interval_secs: u64,
    pub webhook_max_retries: i32,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            redis_url: get_env("REDIS_URL")?,
            public_host: get_env("PUBLIC_HOST")?
                .trim_end_matches('/')
                .to_string(),
            aws_access_key_id: get_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: get_env("AWS_SECRET_ACCESS_KEY")?,
            otp_generate_rate_limit: get_env_or("OTP_GENERATE_RATE_LIMIT", 3)?,
            otp_generate_rate_limit_window: get_env_or("OTP_GENERATE_RATE_LIMIT_WINDOW", 7200)?,
            otp_verify_rate_limit: get_env_or("OTP_VERIFY_RATE_LIMIT", 5)?,
            otp_verify_rate_limit_window: get_env_or("OTP_VERIFY_RATE_LIMIT_WINDOW", 86400)?,
            http_timeout_secs: get_env_or("HTTP_TIMEOUT_SECS", 10)?,
            event_queue_capacity: get_env_or("EVENT_QUEUE_CAPACITY", 100)?,
            listener_workers: get_env_or("LISTENER_WORKERS", default_workers)?.max(1),
            sns_cert_host_suffix: match env::var("SNS_CERT_HOST_SUFFIX") {
                Ok(v) if v.is_empty() => None,
                Ok(v) => Some(v),
                Err(_) => Some(".amazonaws.com".to_string()),
            },
            webhook_redelivery_interval_secs: get_env_or("WEBHOOK_REDELIVERY_INTERVAL_SECS", 30)?,
            webhook_max_retries: get_env_or("WEBHOOK_MAX_RETRIES", 5)?,
        })
    }

    /// Public URL the transport pushes notifications to.
    pub fn sns_endpoint(&self) -> String {
        format!("{}{}", self.public_host, SNS_EVENT_PATH)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
