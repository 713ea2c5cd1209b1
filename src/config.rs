use crate::{
    auth::{TokenVerifier, DEFAULT_AUDIENCE},
    semantic::{SearchMode, DEFAULT_EMBEDDING_DIM},
};
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TOP_K: i64 = 5;

/// Where content records are kept
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// contents.csv + vectors.bin in the base directory
    #[default]
    Csv,
    /// Process memory only, lost on exit
    Memory,
}

/// Token verification settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret. The daemon refuses to start without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_audience")]
    pub audience: String,

    /// Serve the protected routes without tokens
    #[serde(default)]
    pub disabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            audience: DEFAULT_AUDIENCE.to_string(),
            disabled: false,
        }
    }
}

impl AuthConfig {
    /// Verifier guarding the protected routes. `None` only when `disabled` is set.
    pub fn verifier(&self) -> anyhow::Result<Option<TokenVerifier>> {
        if self.disabled {
            log::warn!("authentication is disabled, protected routes are open");
            return Ok(None);
        }

        match self.jwt_secret.as_deref() {
            Some(secret) => Ok(Some(TokenVerifier::new(secret, &self.audience))),
            None => bail!(
                "no jwt secret configured: set auth.jwt_secret or CONTENT_SEARCH_JWT_SECRET, \
                 or auth.disabled: true to serve without authentication"
            ),
        }
    }
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

/// A document of the fixed in-memory corpus
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Embedding length, fixed for the process lifetime
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[serde(default)]
    pub search_mode: SearchMode,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default = "default_top_k")]
    pub default_top_k: i64,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default = "default_corpus")]
    pub corpus: Vec<CorpusDocument>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            embedding_dim: default_embedding_dim(),
            search_mode: SearchMode::default(),
            storage: StorageKind::default(),
            default_top_k: default_top_k(),
            auth: AuthConfig::default(),
            corpus: default_corpus(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_embedding_dim() -> usize {
    DEFAULT_EMBEDDING_DIM
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}

fn default_corpus() -> Vec<CorpusDocument> {
    [
        (
            "doc-1",
            "Quarterly sales report",
            "Revenue grew twelve percent quarter over quarter, driven by enterprise renewals.",
        ),
        (
            "doc-2",
            "Onboarding checklist",
            "New employees should set up accounts, complete security training and meet their team.",
        ),
        (
            "doc-3",
            "Refund policy",
            "Customers may request a full refund within thirty days of purchase.",
        ),
    ]
    .into_iter()
    .map(|(id, title, body)| CorpusDocument {
        id: id.to_string(),
        title: Some(title.to_string()),
        body: body.to_string(),
    })
    .collect()
}

/// Data directory: `CONTENT_SEARCH_BASE_PATH` or `~/.local/share/content-search`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CONTENT_SEARCH_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .map_err(|err| anyhow!("couldnt resolve home dir: {err:?}"))?
        .context("couldnt find home dir")?;
    Ok(home.join(".local/share/content-search"))
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding_dim == 0 {
            bail!("embedding_dim must be greater than 0");
        }
        if self.embedding_dim > u16::MAX as usize {
            bail!(
                "embedding_dim must be at most {}, got {}",
                u16::MAX,
                self.embedding_dim
            );
        }
        if self.default_top_k < 0 {
            bail!("default_top_k must not be negative, got {}", self.default_top_k);
        }

        let mut seen = HashSet::new();
        for (idx, doc) in self.corpus.iter().enumerate() {
            let idx = idx + 1;
            if doc.id.trim().is_empty() {
                bail!("corpus document #{idx} has an empty id");
            }
            if doc.body.trim().is_empty() {
                bail!("corpus document '{}' has an empty body", doc.id);
            }
            if !seen.insert(doc.id.as_str()) {
                bail!("corpus document id '{}' is duplicated", doc.id);
            }
        }

        Ok(())
    }

    /// Apply `CONTENT_SEARCH_*` environment overrides.
    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("CONTENT_SEARCH_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(secret) = std::env::var("CONTENT_SEARCH_JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = Some(secret);
            }
        }
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        config.apply_env();

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        let temp_path = self.base_path.join(format!("{CONFIG_FILE}-tmp"));

        std::fs::write(&temp_path, serde_yml::to_string(&self)?)?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.embedding_dim, DEFAULT_EMBEDDING_DIM);
        assert_eq!(config.search_mode, SearchMode::Store);
        assert_eq!(config.storage, StorageKind::Csv);
        assert_eq!(config.default_top_k, 5);
        assert_eq!(config.auth.audience, "authenticated");
        assert_eq!(config.corpus.len(), 3);
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "embedding_dim: 8\nsearch_mode: memory\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.embedding_dim, 8);
        assert_eq!(config.search_mode, SearchMode::Memory);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);

        // upgraded on disk
        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("listen_addr"));
    }

    #[test]
    fn test_default_auth_has_no_verifier() {
        let auth = AuthConfig::default();
        assert!(!auth.disabled);
        assert!(auth.verifier().is_err());
    }

    #[test]
    fn test_auth_disabled_opt_in() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "auth:\n  disabled: true\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert!(config.auth.disabled);
        assert!(config.auth.verifier().unwrap().is_none());
    }

    #[test]
    fn test_auth_secret_builds_verifier() {
        let auth = AuthConfig {
            jwt_secret: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(auth.verifier().unwrap().is_some());
    }

    #[test]
    fn test_malformed_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "embedding_dim: [oops").unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_validate_zero_dim() {
        let config = Config {
            embedding_dim: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_oversized_dim() {
        let config = Config {
            embedding_dim: 70_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_negative_top_k() {
        let config = Config {
            default_top_k: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_corpus_ids() {
        let doc = CorpusDocument {
            id: "same".to_string(),
            title: None,
            body: "text".to_string(),
        };
        let config = Config {
            corpus: vec![doc.clone(), doc],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_corpus_body() {
        let config = Config {
            corpus: vec![CorpusDocument {
                id: "x".to_string(),
                title: None,
                body: "   ".to_string(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
