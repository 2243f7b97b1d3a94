//! Configuration management.
//!
//! Settings come from three layers, later layers winning: built-in defaults,
//! an optional TOML file (platform config dir, then `~/.config/polystore/`),
//! and environment variables (a `.env` file is honored via `dotenvy`).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::query::SearchPolicy;

/// Main configuration for polystore.
#[derive(Debug, Clone)]
pub struct PolystoreConfig {
    /// MongoDB connection settings.
    pub mongo: MongoConfig,
    /// Cassandra/Scylla connection settings.
    pub cassandra: CassandraConfig,
    /// Neo4j connection settings.
    pub neo4j: Neo4jConfig,
    /// Redis connection settings.
    pub redis: RedisConfig,
    /// First release year treated as a future release.
    pub future_cutoff_year: i32,
    /// Row cap for engines that scan candidates before in-process filtering.
    pub scan_fetch_cap: usize,
    /// Per-backend call timeout in seconds.
    pub op_timeout_secs: u64,
}

/// MongoDB connection settings.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// Connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
}

/// Cassandra/Scylla connection settings.
#[derive(Debug, Clone)]
pub struct CassandraConfig {
    /// Contact point, `host:port`.
    pub node: String,
    /// Keyspace holding the catalog tables.
    pub keyspace: String,
}

/// Neo4j connection settings.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Bolt URI.
    pub uri: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: String,
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL.
    pub url: String,
}

impl Default for PolystoreConfig {
    fn default() -> Self {
        Self {
            mongo: MongoConfig {
                uri: "mongodb://localhost:27017".to_string(),
                database: "catalog".to_string(),
            },
            cassandra: CassandraConfig {
                node: "127.0.0.1:9042".to_string(),
                keyspace: "catalog".to_string(),
            },
            neo4j: Neo4jConfig {
                uri: "bolt://localhost:7687".to_string(),
                user: "neo4j".to_string(),
                password: "neo4j".to_string(),
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            future_cutoff_year: 2025,
            scan_fetch_cap: 5000,
            op_timeout_secs: 10,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// MongoDB section.
    pub mongo: Option<ConfigFileMongo>,
    /// Cassandra section.
    pub cassandra: Option<ConfigFileCassandra>,
    /// Neo4j section.
    pub neo4j: Option<ConfigFileNeo4j>,
    /// Redis section.
    pub redis: Option<ConfigFileRedis>,
    /// Future-release cutoff year.
    pub future_cutoff_year: Option<i32>,
    /// Scan fetch cap.
    pub scan_fetch_cap: Option<usize>,
    /// Per-backend timeout in seconds.
    pub op_timeout_secs: Option<u64>,
}

/// MongoDB section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMongo {
    /// Connection URI.
    pub uri: Option<String>,
    /// Database name.
    pub database: Option<String>,
}

/// Cassandra section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCassandra {
    /// Contact point.
    pub node: Option<String>,
    /// Keyspace.
    pub keyspace: Option<String>,
}

/// Neo4j section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileNeo4j {
    /// Bolt URI.
    pub uri: Option<String>,
    /// Username.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
}

/// Redis section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRedis {
    /// Connection URL.
    pub url: Option<String>,
}

impl PolystoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The search policy derived from this configuration.
    #[must_use]
    pub const fn search_policy(&self) -> SearchPolicy {
        SearchPolicy::new(self.future_cutoff_year)
    }

    /// The per-backend call timeout.
    #[must_use]
    pub const fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::InvalidInput(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|e| {
            crate::Error::InvalidInput(format!("cannot parse config file {}: {e}", path.display()))
        })?;
        Ok(Self::default().merged_with(file).with_env_overrides())
    }

    /// Loads configuration from the default locations plus the environment.
    ///
    /// Checks the platform config dir, then `~/.config/polystore/`, and
    /// falls back to defaults. Environment variables always win.
    #[must_use]
    pub fn load_default() -> Self {
        let _ = dotenvy::dotenv();

        if let Some(base_dirs) = directories::BaseDirs::new() {
            let platform_config = base_dirs.config_dir().join("polystore").join("config.toml");
            if platform_config.exists() {
                if let Ok(config) = Self::load_from_file(&platform_config) {
                    return config;
                }
            }
            let xdg_config = base_dirs
                .home_dir()
                .join(".config")
                .join("polystore")
                .join("config.toml");
            if xdg_config.exists() {
                if let Ok(config) = Self::load_from_file(&xdg_config) {
                    return config;
                }
            }
        }

        Self::default().with_env_overrides()
    }

    /// Merges a parsed config file over this configuration.
    #[must_use]
    fn merged_with(mut self, file: ConfigFile) -> Self {
        if let Some(mongo) = file.mongo {
            if let Some(uri) = mongo.uri {
                self.mongo.uri = uri;
            }
            if let Some(database) = mongo.database {
                self.mongo.database = database;
            }
        }
        if let Some(cassandra) = file.cassandra {
            if let Some(node) = cassandra.node {
                self.cassandra.node = node;
            }
            if let Some(keyspace) = cassandra.keyspace {
                self.cassandra.keyspace = keyspace;
            }
        }
        if let Some(neo4j) = file.neo4j {
            if let Some(uri) = neo4j.uri {
                self.neo4j.uri = uri;
            }
            if let Some(user) = neo4j.user {
                self.neo4j.user = user;
            }
            if let Some(password) = neo4j.password {
                self.neo4j.password = password;
            }
        }
        if let Some(redis) = file.redis {
            if let Some(url) = redis.url {
                self.redis.url = url;
            }
        }
        if let Some(year) = file.future_cutoff_year {
            self.future_cutoff_year = year;
        }
        if let Some(cap) = file.scan_fetch_cap {
            self.scan_fetch_cap = cap;
        }
        if let Some(secs) = file.op_timeout_secs {
            self.op_timeout_secs = secs;
        }
        self
    }

    /// Applies environment variable overrides.
    #[must_use]
    fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = std::env::var("POLYSTORE_MONGO_URI") {
            self.mongo.uri = uri;
        }
        if let Ok(database) = std::env::var("POLYSTORE_MONGO_DB") {
            self.mongo.database = database;
        }
        if let Ok(node) = std::env::var("POLYSTORE_CASSANDRA_NODE") {
            self.cassandra.node = node;
        }
        if let Ok(keyspace) = std::env::var("POLYSTORE_CASSANDRA_KEYSPACE") {
            self.cassandra.keyspace = keyspace;
        }
        if let Ok(uri) = std::env::var("POLYSTORE_NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Ok(user) = std::env::var("POLYSTORE_NEO4J_USER") {
            self.neo4j.user = user;
        }
        if let Ok(password) = std::env::var("POLYSTORE_NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
        if let Ok(url) = std::env::var("POLYSTORE_REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(year) = std::env::var("POLYSTORE_FUTURE_CUTOFF_YEAR") {
            if let Ok(year) = year.parse() {
                self.future_cutoff_year = year;
            }
        }
        self
    }

    /// Sets the future-release cutoff year.
    #[must_use]
    pub const fn with_future_cutoff_year(mut self, year: i32) -> Self {
        self.future_cutoff_year = year;
        self
    }

    /// Sets the scan fetch cap.
    #[must_use]
    pub const fn with_scan_fetch_cap(mut self, cap: usize) -> Self {
        self.scan_fetch_cap = cap;
        self
    }

    /// Sets the per-backend call timeout.
    #[must_use]
    pub const fn with_op_timeout_secs(mut self, secs: u64) -> Self {
        self.op_timeout_secs = secs;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PolystoreConfig::default();
        assert_eq!(config.future_cutoff_year, 2025);
        assert_eq!(config.search_policy(), SearchPolicy::new(2025));
        assert_eq!(config.op_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_builders() {
        let config = PolystoreConfig::new()
            .with_future_cutoff_year(2030)
            .with_scan_fetch_cap(100)
            .with_op_timeout_secs(3);
        assert_eq!(config.search_policy(), SearchPolicy::new(2030));
        assert_eq!(config.scan_fetch_cap, 100);
        assert_eq!(config.op_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_file_merge() {
        let file: ConfigFile = toml::from_str(
            r#"
            future_cutoff_year = 2030
            scan_fetch_cap = 200

            [mongo]
            database = "demo"

            [neo4j]
            password = "secret"
            "#,
        )
        .unwrap();
        let config = PolystoreConfig::default().merged_with(file);
        assert_eq!(config.future_cutoff_year, 2030);
        assert_eq!(config.scan_fetch_cap, 200);
        assert_eq!(config.mongo.database, "demo");
        // Untouched fields keep their defaults.
        assert_eq!(config.mongo.uri, "mongodb://localhost:27017");
        assert_eq!(config.neo4j.password, "secret");
    }
}
