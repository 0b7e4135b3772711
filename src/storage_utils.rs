use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// CONFIGURATION STRUCTS
// Every field has a default, so a partial (or absent) config file is fine.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,  // e.g., "https://api.coingecko.com/api/v3"
    pub timeout_secs: u64, // per request
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub rows: usize,          // rows printed in the plain table
    pub highlight_top: usize, // leading rows drawn highlighted
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            rows: 25,
            highlight_top: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RsiConfig {
    pub enabled: bool,
    pub max_tokens: usize, // one history request per token, top of the ranking first
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tokens: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub display: DisplayConfig,
    pub rsi: RsiConfig,
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path of the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Resolves `relative_path` against the directory of the running binary.
    /// Nothing is created on disk.
    pub fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;

        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Ok(Self::new(base_dir))
    }

    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    /// Reads `<base_dir>/<filename>.json` into `T`.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        load_json(&self.path_of(filename)).await
    }

    /// Like [`load`](Self::load), but a missing file is `Ok(None)`.
    pub async fn load_optional<T: DeserializeOwned>(
        &self,
        filename: &str,
    ) -> anyhow::Result<Option<T>> {
        if !fs::try_exists(self.path_of(filename)).await? {
            return Ok(None);
        }
        self.load(filename).await.map(Some)
    }
}

pub async fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    // Raw bytes straight into serde_json; no separate UTF-8 pass.
    let content = fs::read(path).await?;
    let data = serde_json::from_slice(&content)?;
    Ok(data)
}

/// Explicit path: the file must exist. Otherwise `storage/config.json` next
/// to the binary is used if present, else defaults.
pub async fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    use anyhow::Context;

    if let Some(path) = explicit {
        return load_json(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let storage = AsyncStorageManager::new_relative("storage")?;
    let config = storage
        .load_optional::<AppConfig>("config")
        .await
        .with_context(|| format!("Failed to load {}", storage.path_of("config").display()))?;
    Ok(config.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"display": {"rows": 50}, "rsi": {"enabled": true}}"#,
        )
        .unwrap();

        let storage = AsyncStorageManager::new(dir.path());
        let config: AppConfig = storage.load("config").await.unwrap();

        assert_eq!(config.display.rows, 50);
        assert_eq!(config.display.highlight_top, 3);
        assert!(config.rsi.enabled);
        assert_eq!(config.rsi.max_tokens, 10);
        assert_eq!(config.api, ApiConfig::default());
    }

    #[tokio::test]
    async fn missing_optional_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path());
        let config: Option<AppConfig> = storage.load_optional("config").await.unwrap();
        assert!(config.is_none());
    }

    #[tokio::test]
    async fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = load_config(Some(&missing)).await.unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }
}
