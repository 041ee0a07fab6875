use std::{fmt, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub worker_threads: Option<usize>,
    /// Directory served for every non-API path.
    pub static_dir: String,
    pub data_dir: String,
    /// Access log file; defaults to `<data_dir>/server.log`.
    pub access_log: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            worker_threads: None,
            // Never the working directory: it holds `.env`, `config.toml` and `data/`.
            static_dir: "static".into(),
            data_dir: "data".into(),
            access_log: None,
        }
    }
}

/// Which storage adapter backs the map API.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Realtime,
    Firestore,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Realtime => "realtime",
            BackendKind::Firestore => "firestore",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" | "relational" => Ok(BackendKind::Sqlite),
            "realtime" | "firebase" | "rtdb" => Ok(BackendKind::Realtime),
            "firestore" => Ok(BackendKind::Firestore),
            "memory" => Ok(BackendKind::Memory),
            other => Err(anyhow!("unknown storage backend '{other}'")),
        }
    }
}

/// Granularity of the lock wrapped around backend calls.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    #[default]
    Global,
    PerId,
}

impl FromStr for LockScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(LockScope::Global),
            "per_id" | "per-id" => Ok(LockScope::PerId),
            other => Err(anyhow!("unknown lock scope '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub timeout_secs: u64,
    pub lock_scope: LockScope,
    pub database: DatabaseConfig,
    pub realtime: RealtimeConfig,
    pub firestore: FirestoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timeout_secs: 10,
            lock_scope: LockScope::default(),
            database: DatabaseConfig::default(),
            realtime: RealtimeConfig::default(),
            firestore: FirestoreConfig::default(),
        }
    }
}

impl StorageConfig {
    /// In-memory storage, mostly for tests.
    pub fn memory() -> Self {
        Self { backend: BackendKind::Memory, ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("storage.timeout_secs must be a positive number of seconds"));
        }
        match self.backend {
            BackendKind::Sqlite => self.database.validate(),
            BackendKind::Realtime => self.realtime.validate(),
            BackendKind::Firestore => self.firestore.validate(),
            BackendKind::Memory => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            // Filled from `server.data_dir` during normalization.
            url: String::new(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 3600,
            acquire_timeout_secs: 10,
            sqlx_logging: false,
        }
    }
}

impl DatabaseConfig {
    /// `sqlite://<data_dir>/maps.db?mode=rwc`
    pub fn default_url(data_dir: &str) -> String {
        format!("sqlite://{}/maps.db?mode=rwc", data_dir.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!(
                "storage.database.url is empty; set it in config.toml or DATABASE_URL"
            ));
        }
        if !self.url.to_lowercase().starts_with("sqlite:") {
            return Err(anyhow!("storage.database.url must start with sqlite:"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("storage.database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("storage.database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("storage.database timeouts must be positive seconds"));
        }
        Ok(())
    }
}

/// Firebase Realtime Database (tree database) settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeConfig {
    pub url: String,
    /// Legacy database secret, sent as the `auth` query parameter.
    pub secret: Option<String>,
    /// Service account file; used when no secret is configured.
    pub credentials_path: Option<String>,
}

impl RealtimeConfig {
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(anyhow!(
                "storage.realtime.url is empty; set it in config.toml or FIREBASE_DATABASE_URL"
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("storage.realtime.url must start with http:// or https://"));
        }
        Ok(())
    }
}

/// Cloud Firestore (document database) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    /// Falls back to the `project_id` of the credential file.
    pub project_id: Option<String>,
    pub credentials_path: Option<String>,
    pub base_url: String,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            credentials_path: None,
            base_url: "https://firestore.googleapis.com/v1/".into(),
        }
    }
}

impl FirestoreConfig {
    pub fn validate(&self) -> Result<()> {
        match self.credentials_path.as_deref() {
            Some(p) if !p.trim().is_empty() => {}
            _ => {
                return Err(anyhow!(
                    "storage.firestore.credentials_path is empty; set it in config.toml or GOOGLE_APPLICATION_CREDENTIALS"
                ))
            }
        }
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("storage.firestore.base_url is empty"));
        }
        Ok(())
    }
}

/// `CONFIG_PATH`, or `config.toml` in the working directory.
pub fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Config file (optional) + environment overrides, validated.
    pub fn load_and_validate() -> Result<Self> {
        let path = config_path();
        let mut cfg = if std::path::Path::new(&path).exists() {
            load_from_file(&path).with_context(|| format!("cannot load {path}"))?
        } else {
            AppConfig::default()
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Overlay environment variables; set, non-empty values win over the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v.trim().parse().with_context(|| format!("invalid PORT '{v}'"))?;
        }
        if let Some(v) = get("TOKIO_WORKER_THREADS") {
            self.server.worker_threads = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("invalid TOKIO_WORKER_THREADS '{v}'"))?,
            );
        }
        if let Some(v) = get("STATIC_DIR") {
            self.server.static_dir = v;
        }
        if let Some(v) = get("DATA_DIR") {
            self.server.data_dir = v;
        }
        if let Some(v) = get("ACCESS_LOG") {
            self.server.access_log = Some(v);
        }

        let storage = &mut self.storage;
        if let Some(v) = get("STORAGE_BACKEND") {
            storage.backend = v.parse()?;
        }
        if let Some(v) = get("STORAGE_TIMEOUT_SECS") {
            storage.timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("invalid STORAGE_TIMEOUT_SECS '{v}'"))?;
        }
        if let Some(v) = get("STORAGE_LOCK_SCOPE") {
            storage.lock_scope = v.parse()?;
        }
        if let Some(v) = get("DATABASE_URL") {
            storage.database.url = v;
        }
        if let Some(v) = get("FIREBASE_DATABASE_URL") {
            storage.realtime.url = v;
        }
        if let Some(v) = get("FIREBASE_DATABASE_SECRET") {
            storage.realtime.secret = Some(v);
        }
        if let Some(v) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            storage.realtime.credentials_path = Some(v.clone());
            storage.firestore.credentials_path = Some(v);
        }
        if let Some(v) = get("FIRESTORE_PROJECT_ID") {
            storage.firestore.project_id = Some(v);
        }
        if let Some(v) = get("FIRESTORE_BASE_URL") {
            storage.firestore.base_url = v;
        }
        Ok(())
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        if self.storage.database.url.trim().is_empty() {
            self.storage.database.url = DatabaseConfig::default_url(&self.server.data_dir);
        }
        self.storage.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "0.0.0.0".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        if self.worker_threads == Some(0) {
            self.worker_threads = None;
        }
        if self.data_dir.trim().is_empty() {
            self.data_dir = "data".to_string();
        }
        Ok(())
    }

    pub fn access_log_path(&self) -> String {
        match &self.access_log {
            Some(p) if !p.trim().is_empty() => p.clone(),
            _ => format!("{}/server.log", self.data_dir.trim_end_matches('/')),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_listen_on_all_interfaces_port_8000() -> Result<()> {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[]))?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.storage.backend, BackendKind::Sqlite);
        assert_eq!(cfg.storage.lock_scope, LockScope::Global);
        assert_eq!(cfg.server.access_log_path(), "data/server.log");
        assert_eq!(cfg.server.static_dir, "static");
        assert_eq!(cfg.storage.database.url, "sqlite://data/maps.db?mode=rwc");
        Ok(())
    }

    #[test]
    fn database_url_follows_data_dir() -> Result<()> {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[("DATA_DIR", "/var/lib/hexmap/")]))?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.storage.database.url, "sqlite:///var/lib/hexmap/maps.db?mode=rwc");
        assert_eq!(cfg.server.access_log_path(), "/var/lib/hexmap/server.log");

        let mut explicit = AppConfig::default();
        explicit.apply_env(env(&[("DATA_DIR", "/srv"), ("DATABASE_URL", "sqlite::memory:")]))?;
        explicit.normalize_and_validate()?;
        assert_eq!(explicit.storage.database.url, "sqlite::memory:");
        Ok(())
    }

    #[test]
    fn env_overrides_file_values() -> Result<()> {
        let mut cfg: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [storage]
            backend = "sqlite"
            "#,
        )?;
        cfg.apply_env(env(&[
            ("PORT", "8123"),
            ("STORAGE_BACKEND", "realtime"),
            ("FIREBASE_DATABASE_URL", "https://example.firebaseio.com"),
            ("FIREBASE_DATABASE_SECRET", "s3cret"),
            ("STORAGE_LOCK_SCOPE", "per_id"),
        ]))?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.server.port, 8123);
        assert_eq!(cfg.storage.backend, BackendKind::Realtime);
        assert_eq!(cfg.storage.realtime.secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.storage.lock_scope, LockScope::PerId);
        Ok(())
    }

    #[test]
    fn realtime_requires_url() {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = BackendKind::Realtime;
        let err = cfg.normalize_and_validate().unwrap_err();
        assert!(err.to_string().contains("FIREBASE_DATABASE_URL"));
    }

    #[test]
    fn firestore_requires_credentials() {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = BackendKind::Firestore;
        assert!(cfg.normalize_and_validate().is_err());

        cfg.apply_env(env(&[("GOOGLE_APPLICATION_CREDENTIALS", "/tmp/sa.json")])).unwrap();
        assert!(cfg.normalize_and_validate().is_ok());
    }

    #[test]
    fn sqlite_url_must_be_sqlite() {
        let mut cfg = AppConfig::default();
        cfg.storage.database.url = "postgres://localhost/maps".into();
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut cfg = AppConfig::default();
        assert!(cfg.apply_env(env(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("Firebase".parse::<BackendKind>().unwrap(), BackendKind::Realtime);
        assert_eq!("firestore".parse::<BackendKind>().unwrap(), BackendKind::Firestore);
        assert!("mongo".parse::<BackendKind>().is_err());
    }
}
