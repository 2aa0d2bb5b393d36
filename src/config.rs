//! 接続設定（stash.toml / 環境変数 / キー・値の組）
//!
//! `host` は必須。欠けている場合は構築時点で `StashError::Configuration` になる。

use crate::command::Operation;
use crate::error::{Result, StashError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Redisのデフォルトポート
pub const DEFAULT_PORT: u16 = 6379;

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Stashの接続設定
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StashConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// キーに付与するプレフィックス（`namespace:key`）
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// 明示的に無効化する操作名（例: "keys"）
    #[serde(default)]
    pub disabled_operations: Vec<String>,
}

impl StashConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            namespace: None,
            database: 0,
            password: None,
            connect_timeout_ms: None,
            disabled_operations: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn disable(mut self, operation: Operation) -> Self {
        self.disabled_operations.push(operation.name().to_string());
        self
    }

    /// TOML文字列から読み込む
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StashError::Configuration(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// stash.tomlを読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StashError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// キー・値の組から構築する
    ///
    /// キーは大文字小文字を区別せず、先頭の `:` は無視する（`:host` も `host` も可）。
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::new("");
        for (key, value) in pairs {
            let key = key.as_ref().trim_start_matches(':').to_ascii_lowercase();
            let value = value.as_ref();
            match key.as_str() {
                "host" => config.host = value.to_string(),
                "port" => config.port = parse_number(&key, value)?,
                "namespace" => config.namespace = Some(value.to_string()),
                "database" | "db" => config.database = parse_number(&key, value)?,
                "password" => config.password = Some(value.to_string()),
                "connect_timeout_ms" => config.connect_timeout_ms = Some(parse_number(&key, value)?),
                "disabled_operations" => {
                    config.disabled_operations = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                }
                _ => {
                    return Err(StashError::Configuration(format!(
                        "unknown config key '{}'",
                        key
                    )))
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// 環境変数から構築する
    ///
    /// STASH_HOST（必須）, STASH_PORT, STASH_NAMESPACE, STASH_DB, STASH_PASSWORD
    pub fn from_env() -> Result<Self> {
        const VARS: &[(&str, &str)] = &[
            ("STASH_HOST", "host"),
            ("STASH_PORT", "port"),
            ("STASH_NAMESPACE", "namespace"),
            ("STASH_DB", "database"),
            ("STASH_PASSWORD", "password"),
        ];
        let pairs: Vec<(&str, String)> = VARS
            .iter()
            .filter_map(|(var, key)| std::env::var(var).ok().map(|v| (*key, v)))
            .collect();
        Self::from_pairs(pairs)
    }

    /// 設定値を検証する
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StashError::Configuration("missing 'host' key".to_string()));
        }
        if self.port == 0 {
            return Err(StashError::Configuration("port must be non-zero".to_string()));
        }
        if matches!(self.namespace.as_deref(), Some(ns) if ns.is_empty()) {
            return Err(StashError::Configuration(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.database < 0 {
            return Err(StashError::Configuration(
                "database index must not be negative".to_string(),
            ));
        }
        self.disabled()?;
        Ok(())
    }

    /// 無効化された操作を解決する
    pub fn disabled(&self) -> Result<Vec<Operation>> {
        self.disabled_operations
            .iter()
            .map(|name| {
                Operation::from_name(name).ok_or_else(|| {
                    StashError::Configuration(format!("unknown operation '{}'", name))
                })
            })
            .collect()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// `redis://[:password@]host:port/db`
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        StashError::Configuration(format!("'{}' must be a number, got '{}'", key, value))
    })
}
