//! Connection pool settings and setup.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use flashdeck_core::{defaults, Error, Result};

/// Sizing of the pool shared by [`PgJobRepository`](crate::PgJobRepository)
/// and [`PgWorkQueue`](crate::PgWorkQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a query waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::DB_MAX_CONNECTIONS,
            min_connections: defaults::DB_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DB_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DB_MAX_CONNECTIONS` | `10` | Pool size ceiling |
    /// | `DB_MIN_CONNECTIONS` | `1` | Connections kept open while idle |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection |
    ///
    /// A set but malformed value is [`Error::Config`].
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_connections: parse_var(&var, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            min_connections: parse_var(&var, "DB_MIN_CONNECTIONS")?
                .unwrap_or(defaults.min_connections),
            acquire_timeout: parse_var(&var, "DB_ACQUIRE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn with_min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    /// Open the pool, failing fast if the database is unreachable.
    pub async fn connect(&self, database_url: &str) -> Result<PgPool> {
        self.validate()?;
        let start = Instant::now();

        info!(
            subsystem = "database",
            component = "pool",
            op = "create",
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            acquire_timeout_secs = self.acquire_timeout.as_secs(),
            "Creating database connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(database_url)
            .await?;

        info!(
            subsystem = "database",
            component = "pool",
            op = "established",
            pool_size = pool.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Database connection pool established"
        );
        Ok(pool)
    }
}

fn parse_var<F, T>(var: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} is not a valid number: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_unset_vars_use_defaults() {
        let config = PoolConfig::from_vars(lookup(&[])).unwrap();
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.max_connections, defaults::DB_MAX_CONNECTIONS);
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = PoolConfig::from_vars(lookup(&[
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_MIN_CONNECTIONS", "2"),
            ("DB_ACQUIRE_TIMEOUT_SECS", " 5 "),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_malformed_var_is_config_error() {
        let err = PoolConfig::from_vars(lookup(&[("DB_MAX_CONNECTIONS", "ten")])).unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("DB_MAX_CONNECTIONS")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_inconsistent_sizes_are_rejected() {
        assert!(matches!(
            PoolConfig::from_vars(lookup(&[("DB_MAX_CONNECTIONS", "0")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PoolConfig::from_vars(lookup(&[
                ("DB_MAX_CONNECTIONS", "2"),
                ("DB_MIN_CONNECTIONS", "3"),
            ])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = PoolConfig::default()
            .with_max_connections(20)
            .with_min_connections(5)
            .with_acquire_timeout(Duration::from_secs(60));
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
    }
}
