// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::gateway::{GatewayConfig, YOOKASSA_API_BASE};
use crate::manual_transfer::ManualTransferConfig;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Engine settings shared by the HTTP state and the scheduler.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub scheduler: SchedulerConfig,
    pub manual_transfer: ManualTransferConfig,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,
    pub gateway: GatewayConfig,
    pub billing: BillingConfig,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn flag(name: &'static str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parsed_or("PORT", 8065u16)?;

        let gateway_timeout = Duration::from_secs(parsed_or("GATEWAY_TIMEOUT_SECS", 30u64)?);
        let gateway = GatewayConfig {
            api_base: env::var("YOOKASSA_API_BASE").unwrap_or_else(|_| YOOKASSA_API_BASE.to_string()),
            shop_id: required("YOOKASSA_SHOP_ID")?,
            api_key: required("YOOKASSA_API_KEY")?,
            timeout: gateway_timeout,
        };

        let max_concurrency = parsed_or("BILLING_MAX_CONCURRENCY", 8usize)?;
        if max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "BILLING_MAX_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        let defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            enabled: !flag("DISABLE_BILLING_SCHEDULER"),
            interval: Duration::from_secs(parsed_or(
                "BILLING_SWEEP_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            max_concurrency,
            charge_timeout: gateway_timeout,
            return_url: env::var("BILLING_RETURN_URL").unwrap_or(defaults.return_url),
        };
        if scheduler.interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "BILLING_SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let manual_transfer = ManualTransferConfig {
            min_amount: parsed_or("MANUAL_TRANSFER_MIN_AMOUNT", Decimal::new(100, 0))?,
            currency: env::var("BILLING_CURRENCY").unwrap_or_else(|_| "RUB".to_string()),
        };

        Ok(Self {
            database_url,
            bind_addr,
            port,
            gateway,
            billing: BillingConfig {
                scheduler,
                manual_transfer,
                webhook_secret: required("YOOKASSA_WEBHOOK_SECRET")?,
            },
        })
    }
}
