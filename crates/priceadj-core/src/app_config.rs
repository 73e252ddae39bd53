use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub directory_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Six-field cron expression (seconds first) for the daily processor run.
    pub run_cron: String,
    pub max_concurrent_items: usize,
    /// Days between the notification run and the effective date.
    pub notify_lead_days: u32,
    /// First day of the month on which customer pricing lines may be rebuilt.
    pub financial_cutoff_day: u32,
    pub mail_relay_url: Option<String>,
    pub mail_relay_token: Option<String>,
    pub mail_timeout_secs: u64,
    pub mail_max_retries: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("directory_path", &self.directory_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("run_cron", &self.run_cron)
            .field("max_concurrent_items", &self.max_concurrent_items)
            .field("notify_lead_days", &self.notify_lead_days)
            .field("financial_cutoff_day", &self.financial_cutoff_day)
            .field("mail_relay_url", &self.mail_relay_url)
            .field(
                "mail_relay_token",
                &self.mail_relay_token.as_ref().map(|_| "[redacted]"),
            )
            .field("mail_timeout_secs", &self.mail_timeout_secs)
            .field("mail_max_retries", &self.mail_max_retries)
            .finish()
    }
}
