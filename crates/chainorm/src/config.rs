//! ORM configuration, loadable from TOML.
//!
//! ```toml
//! page_size = 20
//! slow_query_threshold_ms = 500
//!
//! [[databases]]
//! name = "shop"
//! url = "${DATABASE_URL}"
//! default = true
//!
//! [tables.audit_log]
//! raw = true
//! ```
//!
//! `${NAME}` references in string values are replaced from the environment at load time.

use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrmConfig {
    pub databases: Vec<DatabaseConfig>,
    /// Default page size for paginated finds.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Statements slower than this are logged at `WARN`.
    #[serde(default)]
    pub slow_query_threshold_ms: Option<u64>,
    /// Stop waiting for a statement after this long.
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
    /// Per-table chain defaults.
    #[serde(default)]
    pub tables: BTreeMap<String, ModelConfig>,
}

/// One named database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub default: bool,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            max_connections: default_max_connections(),
            default: false,
        }
    }
}

/// Per-chain options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Page size override for this table.
    #[serde(default)]
    pub page_size: Option<u64>,
    /// Return raw rows instead of records.
    #[serde(default)]
    pub raw: bool,
    /// Log the inlined SQL of every statement at `DEBUG`.
    #[serde(default)]
    pub debug: bool,
    /// Reading an unknown field from a record is an error.
    #[serde(default = "default_true")]
    pub strict: bool,
    /// Database name override.
    #[serde(default)]
    pub db: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            page_size: None,
            raw: false,
            debug: false,
            strict: true,
            db: None,
        }
    }
}

impl ModelConfig {
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn page_size(mut self, size: u64) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn db(mut self, name: impl Into<String>) -> Self {
        self.db = Some(name.into());
        self
    }
}

fn default_page_size() -> u64 {
    20
}

fn default_max_connections() -> usize {
    20
}

fn default_true() -> bool {
    true
}

impl OrmConfig {
    /// Configuration with a single database.
    pub fn single(database: DatabaseConfig) -> Self {
        Self {
            databases: vec![database],
            page_size: default_page_size(),
            slow_query_threshold_ms: None,
            query_timeout_ms: None,
            tables: BTreeMap::new(),
        }
    }

    /// Parse, expand `${ENV}` references and validate.
    pub fn from_toml_str(raw: &str) -> OrmResult<Self> {
        let mut cfg: OrmConfig = toml::from_str(raw)
            .map_err(|e| OrmError::Config(format!("failed to parse config: {e}")))?;
        cfg.expand_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a TOML file and load it with [`OrmConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    fn expand_env(&mut self) -> OrmResult<()> {
        for db in &mut self.databases {
            db.name = expand_env_vars(&db.name)?;
            db.url = expand_env_vars(&db.url)?;
        }
        for table in self.tables.values_mut() {
            if let Some(db) = table.db.as_mut() {
                *db = expand_env_vars(db)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.databases.is_empty() {
            return Err(OrmError::Config(
                "at least one [[databases]] entry is required".into(),
            ));
        }
        let mut seen = std::collections::HashSet::<&str>::new();
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(OrmError::Config("databases.name must not be empty".into()));
            }
            if !seen.insert(db.name.as_str()) {
                return Err(OrmError::Config(format!(
                    "duplicate databases.name: {}",
                    db.name
                )));
            }
            if db.url.trim().is_empty() {
                return Err(OrmError::Config(format!(
                    "databases.url must not be empty (database: {})",
                    db.name
                )));
            }
            if db.max_connections == 0 {
                return Err(OrmError::Config(format!(
                    "databases.max_connections must be positive (database: {})",
                    db.name
                )));
            }
        }
        if self.page_size == 0 {
            return Err(OrmError::Config("page_size must be positive".into()));
        }
        Ok(())
    }

    /// The first database marked `default`, else the first one listed.
    pub fn default_database(&self) -> OrmResult<&DatabaseConfig> {
        self.databases
            .iter()
            .find(|db| db.default)
            .or_else(|| self.databases.first())
            .ok_or_else(|| OrmError::Config("no database configured".into()))
    }

    /// Look up a database by name.
    pub fn database(&self, name: &str) -> OrmResult<&DatabaseConfig> {
        self.databases
            .iter()
            .find(|db| db.name == name)
            .ok_or_else(|| OrmError::Config(format!("unknown database: {name}")))
    }

    pub fn slow_query_threshold(&self) -> Option<Duration> {
        self.slow_query_threshold_ms.map(Duration::from_millis)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Chain defaults for `table`.
    pub fn model_config(&self, table: &str) -> ModelConfig {
        self.tables.get(table).cloned().unwrap_or_default()
    }
}

fn expand_env_vars(input: &str) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }
            if !closed {
                return Err(OrmError::Config(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(OrmError::Config("invalid env var reference: ${}".into()));
            }
            let v = std::env::var(&key).map_err(|_| {
                OrmError::Config(format!("missing env var for config expansion: {key}"))
            })?;
            out.push_str(&v);
            continue;
        }
        out.push(c);
    }
    Ok(out)
}
