use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation live here, decoupled from the process environment,
/// so tests can drive it with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("PRICEADJ_ENV", "development"))?;

    let bind_addr = parse("PRICEADJ_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("PRICEADJ_LOG_LEVEL", "info");
    let directory_path = PathBuf::from(or_default(
        "PRICEADJ_DIRECTORY_PATH",
        "./config/directory.yaml",
    ));

    let db_max_connections = parse_u32("PRICEADJ_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PRICEADJ_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "PRICEADJ_DB_MIN_CONNECTIONS",
            format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("PRICEADJ_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    // 16:00 UTC is 02:00 AEST.
    let run_cron = or_default("PRICEADJ_RUN_CRON", "0 0 16 * * *");
    if run_cron.split_whitespace().count() != 6 {
        return Err(invalid(
            "PRICEADJ_RUN_CRON",
            format!("expected 6 cron fields (sec min hour dom mon dow), got '{run_cron}'"),
        ));
    }

    let max_concurrent_items = parse_usize("PRICEADJ_MAX_CONCURRENT_ITEMS", "4")?;
    if max_concurrent_items == 0 {
        return Err(invalid(
            "PRICEADJ_MAX_CONCURRENT_ITEMS",
            "must be at least 1".to_string(),
        ));
    }

    let notify_lead_days = parse_u32("PRICEADJ_NOTIFY_LEAD_DAYS", "14")?;
    let financial_cutoff_day = parse_u32("PRICEADJ_FINANCIAL_CUTOFF_DAY", "15")?;
    if !(1..=31).contains(&financial_cutoff_day) {
        return Err(invalid(
            "PRICEADJ_FINANCIAL_CUTOFF_DAY",
            format!("day of month must be 1..=31, got {financial_cutoff_day}"),
        ));
    }

    let mail_relay_url = lookup("PRICEADJ_MAIL_RELAY_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let mail_relay_token = lookup("PRICEADJ_MAIL_RELAY_TOKEN")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let mail_timeout_secs = parse_u64("PRICEADJ_MAIL_TIMEOUT_SECS", "30")?;
    let mail_max_retries = parse_u32("PRICEADJ_MAIL_MAX_RETRIES", "3")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        directory_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        run_cron,
        max_concurrent_items,
        notify_lead_days,
        financial_cutoff_day,
        mail_relay_url,
        mail_relay_token,
        mail_timeout_secs,
        mail_max_retries,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRICEADJ_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
