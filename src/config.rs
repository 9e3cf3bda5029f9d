use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::rooms::EmptyRoomPolicy;

#[derive(Debug, Error)]
#[error("invalid {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    reason: String,
}

#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub session_inactivity: time::Duration,
    pub empty_room_policy: EmptyRoomPolicy,
    pub orphan_sweep_interval: Duration,
    pub cors_origin: Option<String>,
    /// Key shared with the upstream identity service for signing session tokens.
    pub auth_secret: String,
    pub auth_issuer: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let delete_empty_groups: bool = parse_var("DELETE_EMPTY_GROUPS", false)?;
        let db_max_connections = positive("DB_MAX_CONNECTIONS", parse_var("DB_MAX_CONNECTIONS", 16)?)?;
        let sweep_secs = positive("ORPHAN_SWEEP_SECS", parse_var("ORPHAN_SWEEP_SECS", 300)?)?;

        Ok(Config {
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            database_url: dotenv::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://kisschat.db?mode=rwc".to_owned()),
            db_max_connections,
            session_inactivity: time::Duration::minutes(parse_var("SESSION_INACTIVITY_MINUTES", 60)?),
            empty_room_policy: if delete_empty_groups {
                EmptyRoomPolicy::Delete
            } else {
                EmptyRoomPolicy::Keep
            },
            orphan_sweep_interval: Duration::from_secs(sweep_secs),
            cors_origin: dotenv::var("CORS_ORIGIN").ok().filter(|origin| !origin.is_empty()),
            auth_secret: required("AUTH_SHARED_SECRET")?,
            auth_issuer: dotenv::var("AUTH_ISSUER").unwrap_or_else(|_| "kisschat-auth".to_owned()),
        })
    }
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match dotenv::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            reason: format!("{raw:?}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match dotenv::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError { key, reason: "must be set".into() }),
    }
}

fn positive<T: Default + PartialEq>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError { key, reason: "must be greater than zero".into() });
    }
    Ok(value)
}
