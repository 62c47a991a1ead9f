use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub store: StoreConfig,
  pub server: ServerConfig,
  pub cache: CacheConfig,
  pub log: LogConfig,
}

/// Where content rows live.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
  /// Local SQLite file (defaults to the user data directory)
  Sqlite { path: Option<PathBuf> },
  /// Hosted Postgres through its PostgREST endpoint
  Postgrest { url: String },
}

impl Default for StoreConfig {
  fn default() -> Self {
    StoreConfig::Sqlite { path: None }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub bind: SocketAddr,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
    }
  }
}

/// Longest cache lifetime a config may ask for (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Cache lifetimes in seconds, per content domain.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DomainTtl {
  pub list_ttl_secs: u64,
  pub item_ttl_secs: u64,
  pub search_ttl_secs: u64,
}

impl DomainTtl {
  pub fn list(&self) -> Duration {
    seconds(self.list_ttl_secs)
  }

  pub fn item(&self) -> Duration {
    seconds(self.item_ttl_secs)
  }

  pub fn search(&self) -> Duration {
    seconds(self.search_ttl_secs)
  }

  fn validate(&self, domain: &str) -> Result<()> {
    for (field, secs) in [
      ("list_ttl_secs", self.list_ttl_secs),
      ("item_ttl_secs", self.item_ttl_secs),
      ("search_ttl_secs", self.search_ttl_secs),
    ] {
      if secs > MAX_TTL_SECS {
        return Err(eyre!(
          "cache.{}.{} is {}, must be at most {}",
          domain,
          field,
          secs,
          MAX_TTL_SECS
        ));
      }
    }
    Ok(())
  }

  pub fn credentials() -> Self {
    Self {
      list_ttl_secs: 300,
      item_ttl_secs: 900,
      search_ttl_secs: 30,
    }
  }

  pub fn insights() -> Self {
    Self {
      list_ttl_secs: 120,
      item_ttl_secs: 600,
      search_ttl_secs: 30,
    }
  }
}

// Values past the limit are refused at load time; clamp anyway for
// hand-built configs.
fn seconds(secs: u64) -> Duration {
  Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

impl Default for DomainTtl {
  fn default() -> Self {
    Self::credentials()
  }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  pub credentials: DomainTtl,
  pub insights: DomainTtl,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      credentials: DomainTtl::credentials(),
      insights: DomainTtl::insights(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Write daily rolling log files here instead of stderr
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./folio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/folio/config.yaml
  ///
  /// Defaults apply when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("folio.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("folio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to null; treat it as all defaults.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    let config: Self =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.cache.credentials.validate("credentials")?;
    config.cache.insights.validate("insights")?;
    Ok(config)
  }

  /// Get the store API key from environment variables.
  ///
  /// Checks FOLIO_STORE_KEY first, then SUPABASE_SERVICE_ROLE_KEY as fallback.
  pub fn get_store_key() -> Result<String> {
    std::env::var("FOLIO_STORE_KEY")
      .or_else(|_| std::env::var("SUPABASE_SERVICE_ROLE_KEY"))
      .map_err(|_| {
        eyre!(
          "Store API key not found. Set FOLIO_STORE_KEY or SUPABASE_SERVICE_ROLE_KEY environment variable."
        )
      })
  }
}
