use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Where looked-up orders are kept between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis { url: String },
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub database_max_connections: u32,
    /// Comma-separated Kafka bootstrap servers
    pub kafka_brokers: String,
    pub orders_topic: String,
    /// Consumer group id, i.e. the durable subscription name
    pub durable_name: String,
    pub ack_wait: Duration,
    pub http_port: u16,
    pub cache_backend: CacheBackend,
    pub shutdown_grace: Duration,
}

impl Config {
    /// Load configuration from the process environment, after an optional `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cache_backend = match get("CACHE_BACKEND").as_deref() {
            None | Some("memory") => CacheBackend::Memory,
            Some("redis") => CacheBackend::Redis {
                url: get("REDIS_URL").ok_or(ConfigError::Missing("REDIS_URL"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "CACHE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parsed(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            kafka_brokers: get("KAFKA_BROKERS").unwrap_or_else(|| "127.0.0.1:9092".into()),
            orders_topic: get("ORDERS_TOPIC").unwrap_or_else(|| "orders".into()),
            durable_name: get("DURABLE_NAME").unwrap_or_else(|| "order-lookup-durable".into()),
            ack_wait: Duration::from_secs(parsed(&get, "ACK_WAIT_SECS", 30)?),
            http_port: parsed(&get, "HTTP_PORT", 8080)?,
            cache_backend,
            shutdown_grace: Duration::from_secs(parsed(&get, "SHUTDOWN_GRACE_SECS", 10)?),
        })
    }
}

fn parsed<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/orders")]).unwrap();

        assert_eq!(config.kafka_brokers, "127.0.0.1:9092");
        assert_eq!(config.orders_topic, "orders");
        assert_eq!(config.durable_name, "order-lookup-durable");
        assert_eq!(config.ack_wait, Duration::from_secs(30));
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
    }

    #[test]
    fn test_database_url_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
        assert_eq!(
            load(&[("DATABASE_URL", "  ")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn test_redis_backend_needs_url() {
        let base = ("DATABASE_URL", "postgres://localhost/orders");

        assert_eq!(
            load(&[base, ("CACHE_BACKEND", "redis")]).unwrap_err(),
            ConfigError::Missing("REDIS_URL")
        );

        let config = load(&[
            base,
            ("CACHE_BACKEND", "redis"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
        ])
        .unwrap();
        assert_eq!(
            config.cache_backend,
            CacheBackend::Redis { url: "redis://127.0.0.1:6379".into() }
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = ("DATABASE_URL", "postgres://localhost/orders");

        assert!(matches!(
            load(&[base, ("HTTP_PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "HTTP_PORT", .. })
        ));
        assert!(matches!(
            load(&[base, ("CACHE_BACKEND", "memcached")]),
            Err(ConfigError::Invalid { key: "CACHE_BACKEND", .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/orders"),
            ("KAFKA_BROKERS", "kafka-1:9092,kafka-2:9092"),
            ("ACK_WAIT_SECS", "5"),
            ("HTTP_PORT", "9000"),
        ])
        .unwrap();

        assert_eq!(config.kafka_brokers, "kafka-1:9092,kafka-2:9092");
        assert_eq!(config.ack_wait, Duration::from_secs(5));
        assert_eq!(config.http_port, 9000);
    }
}
