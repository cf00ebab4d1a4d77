use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

/// Chunk size used by the fast updater when nothing else is configured
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub mass_update: MassUpdateConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassUpdateConfig {
    /// Expose mass update on every registered model, not only on opted-in ones
    pub add_globally: bool,
    /// Number of ids per set-based UPDATE statement in the fast updater
    pub batch_size: usize,
    /// Optional YAML file with model registrations
    pub registry_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
    /// Table receiving change-log rows; log-only when unset
    pub change_log_table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Mass update overrides
        if let Ok(v) = env::var("MASS_UPDATE_ADD_GLOBALLY") {
            self.mass_update.add_globally = v.parse().unwrap_or(self.mass_update.add_globally);
        }
        if let Ok(v) = env::var("MASS_UPDATE_BATCH_SIZE") {
            self.mass_update.batch_size = v.parse().unwrap_or(self.mass_update.batch_size);
        }
        if let Ok(v) = env::var("MASS_UPDATE_REGISTRY") {
            self.mass_update.registry_path = Some(v);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }
        if let Ok(v) = env::var("MASS_UPDATE_LOG_TABLE") {
            self.database.change_log_table = if v.trim().is_empty() { None } else { Some(v) };
        }

        // API overrides
        if let Some(port) = env::var("MASS_UPDATE_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self.normalized()
    }

    /// A zero batch size would never advance the chunk loop
    fn normalized(mut self) -> Self {
        if self.mass_update.batch_size == 0 {
            tracing::warn!("MASS_UPDATE_BATCH_SIZE must be positive, using 1");
            self.mass_update.batch_size = 1;
        }
        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            mass_update: MassUpdateConfig {
                add_globally: true,
                batch_size: DEFAULT_BATCH_SIZE,
                registry_path: None,
            },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
                change_log_table: None,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                enable_cors: false,
                jwt_secret: "mass-update-development-secret".to_string(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            mass_update: MassUpdateConfig {
                add_globally: true,
                batch_size: DEFAULT_BATCH_SIZE,
                registry_path: None,
            },
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: false,
                change_log_table: Some("mass_update_log".to_string()),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                enable_cors: true,
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            mass_update: MassUpdateConfig {
                add_globally: false,
                batch_size: DEFAULT_BATCH_SIZE,
                registry_path: None,
            },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
                change_log_table: Some("mass_update_log".to_string()),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                enable_cors: true,
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.mass_update.add_globally);
        assert_eq!(config.mass_update.batch_size, 500);
        assert!(config.database.change_log_table.is_none());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(!config.mass_update.add_globally);
        assert_eq!(config.mass_update.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.security.jwt_secret.is_empty());
    }

    #[test]
    fn zero_batch_size_is_normalized() {
        let mut config = AppConfig::development();
        config.mass_update.batch_size = 0;
        assert_eq!(config.normalized().mass_update.batch_size, 1);
    }
}
