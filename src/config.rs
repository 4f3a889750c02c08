use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub contact: ContactConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    pub static_dir: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Rows live in process when unset
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Supabase,
    Memory,
}

impl std::str::FromStr for StorageProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StorageProvider::Supabase),
            "memory" => Ok(StorageProvider::Memory),
            other => bail!("Unknown STORAGE_PROVIDER: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub bucket: String,
    pub signed_url_ttl_secs: u64,
    /// Longest lifetime a caller may request for a signed URL
    pub max_signed_url_ttl_secs: u64,
    pub refresh_margin_secs: u64,
    pub sweep_interval_secs: u64,
}

impl StorageConfig {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn max_signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.max_signed_url_ttl_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactConfig {
    pub rate_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Daily rolling log files are written here when set
    pub dir: Option<String>,
}

/// Unset and blank variables are treated the same.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "public".to_string()),
                max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                    .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                    .parse()?,
            },
            database: DatabaseConfig {
                url: optional("DATABASE_URL"),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                run_migrations: env::var("RUN_MIGRATIONS")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
            },
            storage: StorageConfig {
                provider: env::var("STORAGE_PROVIDER")
                    .unwrap_or_else(|_| "supabase".to_string())
                    .parse()?,
                supabase_url: optional("SUPABASE_URL"),
                supabase_key: optional("SUPABASE_KEY"),
                bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "Portfolio".to_string()),
                signed_url_ttl_secs: env::var("SIGNED_URL_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
                max_signed_url_ttl_secs: env::var("SIGNED_URL_MAX_TTL_SECS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()?,
                refresh_margin_secs: env::var("SIGNED_URL_REFRESH_MARGIN_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()?,
                sweep_interval_secs: env::var("SIGNED_URL_SWEEP_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            },
            email: EmailConfig {
                smtp_host: optional("SMTP_HOST"),
                smtp_username: optional("SMTP_USERNAME"),
                smtp_password: optional("SMTP_PASSWORD"),
                from: optional("EMAIL_FROM"),
                to: optional("EMAIL_TO"),
            },
            contact: ContactConfig {
                rate_per_minute: env::var("CONTACT_RATE_PER_MINUTE")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            log: LogConfig {
                dir: optional("LOG_DIR"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.provider == StorageProvider::Supabase
            && (self.storage.supabase_url.is_none() || self.storage.supabase_key.is_none())
        {
            bail!("STORAGE_PROVIDER=supabase requires SUPABASE_URL and SUPABASE_KEY");
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("STORAGE_BUCKET must not be empty");
        }
        if self.storage.signed_url_ttl_secs == 0
            || self.storage.signed_url_ttl_secs > self.storage.max_signed_url_ttl_secs
        {
            bail!("SIGNED_URL_TTL_SECS must be between 1 and SIGNED_URL_MAX_TTL_SECS");
        }
        if self.contact.rate_per_minute == 0 {
            bail!("CONTACT_RATE_PER_MINUTE must be at least 1");
        }
        Ok(())
    }

    /// Defaults for local runs and tests: in-memory stores, no mail.
    pub fn local() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["http://localhost:3000".to_string()],
                static_dir: "public".to_string(),
                max_upload_bytes: 10 * 1024 * 1024,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 1,
                run_migrations: false,
            },
            storage: StorageConfig {
                provider: StorageProvider::Memory,
                supabase_url: None,
                supabase_key: None,
                bucket: "Portfolio".to_string(),
                signed_url_ttl_secs: 3600,
                max_signed_url_ttl_secs: 604_800,
                refresh_margin_secs: 600,
                sweep_interval_secs: 300,
            },
            email: EmailConfig {
                smtp_host: None,
                smtp_username: None,
                smtp_password: None,
                from: None,
                to: None,
            },
            contact: ContactConfig { rate_per_minute: 5 },
            log: LogConfig { dir: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Supabase".parse::<StorageProvider>().unwrap(), StorageProvider::Supabase);
        assert_eq!("memory".parse::<StorageProvider>().unwrap(), StorageProvider::Memory);
        assert!("s3".parse::<StorageProvider>().is_err());
    }

    #[test]
    fn test_supabase_requires_credentials() {
        let mut config = Config::local();
        assert!(config.validate().is_ok());

        config.storage.provider = StorageProvider::Supabase;
        assert!(config.validate().is_err());

        config.storage.supabase_url = Some("https://abc.supabase.co".into());
        config.storage.supabase_key = Some("key".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_ttl_must_fit_under_maximum() {
        let mut config = Config::local();
        config.storage.max_signed_url_ttl_secs = 1800;
        assert!(config.validate().is_err());

        config.storage.max_signed_url_ttl_secs = 3600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sweep_interval_is_never_zero() {
        let mut config = Config::local();
        config.storage.sweep_interval_secs = 0;
        assert_eq!(config.storage.sweep_interval(), Duration::from_secs(1));
    }
}
