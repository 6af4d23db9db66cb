use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::store::{SlideStore, SqliteSlideStore};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Where slide records live.
    pub store: StoreConfig,
    /// Publication loop pacing and channel name.
    pub publisher: PublisherOptions,
    /// Fan-out settings for display clients.
    pub broadcast: BroadcastConfig,
    /// Rules applied by the admin client before a slide is recorded.
    pub admin: AdminConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.publisher.validate()?;
        ensure!(
            self.broadcast.capacity > 0,
            "broadcast.capacity must be greater than zero"
        );
        ensure!(
            self.broadcast.request_timeout > Duration::ZERO,
            "broadcast.request-timeout must be positive"
        );
        let StoreConfig::Sqlite { path } = &self.store;
        ensure!(
            !path.as_os_str().is_empty(),
            "store.path must not be empty"
        );
        ensure!(
            !self.admin.valid_extensions.is_empty(),
            "admin.valid-extensions must list at least one extension"
        );
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            publisher: PublisherOptions::default(),
            broadcast: BroadcastConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Where slide records live. Only backends shared between processes are
/// deployable: `osmoctl` writes and `osmo` reads the same store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StoreConfig {
    Sqlite {
        #[serde(default = "StoreConfig::default_path")]
        path: PathBuf,
    },
}

impl StoreConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("osmo.db")
    }

    pub fn open(&self) -> Result<Arc<dyn SlideStore>> {
        let store: Arc<dyn SlideStore> = match self {
            Self::Sqlite { path } => Arc::new(
                SqliteSlideStore::open(path)
                    .with_context(|| format!("failed to open slide database {}", path.display()))?,
            ),
        };
        Ok(store)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PublisherOptions {
    /// Broadcast channel slide names are announced on.
    pub channel: String,
    /// Pause between polls while no slide is active.
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,
}

impl PublisherOptions {
    fn default_channel() -> String {
        "osmo".to_string()
    }

    const fn default_idle_interval() -> Duration {
        Duration::from_secs(5)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.channel.trim().is_empty(),
            "publisher.channel must not be empty"
        );
        ensure!(
            !self.channel.chars().any(char::is_whitespace),
            "publisher.channel must not contain whitespace"
        );
        ensure!(
            self.idle_interval > Duration::ZERO,
            "publisher.idle-interval must be positive"
        );
        Ok(())
    }
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            channel: Self::default_channel(),
            idle_interval: Self::default_idle_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BroadcastConfig {
    /// Messages buffered per subscriber before it starts losing the oldest.
    pub capacity: usize,
    /// Address the display subscriber server listens on; disabled when unset.
    pub listen: Option<SocketAddr>,
    /// How long a new connection may take to name its channel.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            listen: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdminConfig {
    pub valid_extensions: Vec<String>,
}

impl AdminConfig {
    pub fn allows(&self, name: &str) -> bool {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return false;
        };
        self.valid_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            valid_extensions: ["jpg", "jpeg", "png", "gif", "pdf"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
