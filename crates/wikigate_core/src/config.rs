use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = concat!("wikigate/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_ARTICLE_PATH: &str = "/$1";
pub const DEFAULT_SUMMARY: &str = "Updated via wikigate";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
    pub article_path: Option<String>,
    pub user_agent: Option<String>,
    pub summary: Option<String>,
}

impl WikiConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > None.
    pub fn api_url_owned(&self) -> Option<String> {
        self.api_url_with_lookup(&env_lookup)
    }

    /// Resolve the wiki base URL: env WIKI_URL > config > derived from api_url.
    pub fn wiki_url(&self) -> Option<String> {
        self.wiki_url_with_lookup(&env_lookup)
    }

    /// Resolve article path: env WIKI_ARTICLE_PATH > config > DEFAULT_ARTICLE_PATH.
    pub fn article_path_owned(&self) -> String {
        self.article_path_with_lookup(&env_lookup)
    }

    pub fn article_path(&self) -> &str {
        self.wiki
            .article_path
            .as_deref()
            .unwrap_or(DEFAULT_ARTICLE_PATH)
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        self.user_agent_with_lookup(&env_lookup)
    }

    /// Resolve the default edit summary: env WIKI_SUMMARY > config > DEFAULT_SUMMARY.
    pub fn summary(&self) -> String {
        self.summary_with_lookup(&env_lookup)
    }

    pub(crate) fn api_url_with_lookup<F>(&self, lookup_env: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty_env(lookup_env, "WIKI_API_URL").or_else(|| self.wiki.api_url.clone())
    }

    pub(crate) fn wiki_url_with_lookup<F>(&self, lookup_env: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty_env(lookup_env, "WIKI_URL") {
            return Some(url);
        }
        if let Some(url) = &self.wiki.url {
            return Some(url.clone());
        }
        let derived = self
            .api_url_with_lookup(lookup_env)
            .and_then(|api| derive_wiki_url(&api));
        if let Some(url) = &derived {
            debug!(url = %url, "derived wiki url from api url");
        }
        derived
    }

    pub(crate) fn article_path_with_lookup<F>(&self, lookup_env: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty_env(lookup_env, "WIKI_ARTICLE_PATH")
            .unwrap_or_else(|| self.article_path().to_string())
    }

    pub(crate) fn user_agent_with_lookup<F>(&self, lookup_env: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty_env(lookup_env, "WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub(crate) fn summary_with_lookup<F>(&self, lookup_env: &F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty_env(lookup_env, "WIKI_SUMMARY")
            .or_else(|| self.wiki.summary.clone())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string())
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        debug!(path = %config_path.display(), "config file missing, using defaults");
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[derive(Debug, Clone, Default)]
pub struct WikiConfigPatch {
    pub set_url: Option<String>,
    pub set_api_url: Option<String>,
    pub set_article_path: Option<String>,
    pub set_summary: Option<String>,
}

impl WikiConfigPatch {
    fn is_empty(&self) -> bool {
        self.set_url.is_none()
            && self.set_api_url.is_none()
            && self.set_article_path.is_none()
            && self.set_summary.is_none()
    }
}

/// Update selected keys under `[wiki]` while preserving all other config sections.
/// Returns `true` when a write occurred.
pub fn patch_wiki_config(config_path: &Path, patch: &WikiConfigPatch) -> Result<bool> {
    if patch.is_empty() {
        return Ok(false);
    }
    if let Some(article_path) = &patch.set_article_path {
        crate::links::ensure_article_path(article_path)?;
    }

    let mut root = if config_path.exists() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        toml::from_str::<Value>(&content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    } else {
        Value::Table(Default::default())
    };
    let original = root.clone();

    let root_table = root.as_table_mut().ok_or_else(|| {
        anyhow::anyhow!(
            "top-level TOML must be a table in {}",
            config_path.display()
        )
    })?;
    let wiki_entry = root_table
        .entry("wiki".to_string())
        .or_insert_with(|| Value::Table(Default::default()));
    let wiki_table = wiki_entry
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("[wiki] must be a table in {}", config_path.display()))?;

    let updates = [
        ("url", &patch.set_url),
        ("api_url", &patch.set_api_url),
        ("article_path", &patch.set_article_path),
        ("summary", &patch.set_summary),
    ];
    for (key, value) in updates {
        if let Some(value) = value {
            wiki_table.insert(key.to_string(), Value::String(value.clone()));
        }
    }

    if root == original {
        return Ok(false);
    }

    let parent = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", config_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    let rendered = toml::to_string_pretty(&root).context("failed to serialize config TOML")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}

/// Derive wiki base URL from an API URL by stripping `/api.php` or `/w/api.php`.
pub fn derive_wiki_url(api_url: &str) -> Option<String> {
    let trimmed = api_url.trim();
    let stripped = trimmed
        .strip_suffix("/w/api.php")
        .or_else(|| trimmed.strip_suffix("/api.php"))
        .unwrap_or(trimmed);
    let result = stripped.trim_end_matches('/').to_string();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty_env<F>(lookup_env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_env(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| env.get(key).cloned()
    }

    #[test]
    fn default_config_has_no_urls() {
        let config = WikiConfig::default();
        assert!(config.wiki.url.is_none());
        assert!(config.wiki.api_url.is_none());
        assert!(config.wiki.summary.is_none());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.wiki.url.is_none());
    }

    #[test]
    fn load_config_parses_wiki_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
url = "https://example.wiki"
api_url = "https://example.wiki/api.php"
article_path = "/wiki/$1"
user_agent = "test-agent/1.0"
summary = "bot edit"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.wiki.url.as_deref(), Some("https://example.wiki"));
        assert_eq!(
            config.wiki.api_url.as_deref(),
            Some("https://example.wiki/api.php")
        );
        assert_eq!(config.wiki.article_path.as_deref(), Some("/wiki/$1"));
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.wiki.summary.as_deref(), Some("bot edit"));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[paths]\nproject_root = \"/foo\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.wiki.url.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\nurl = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn patch_wiki_config_preserves_other_tables() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[paths]\nproject_root = \"/repo\"\n").expect("write config");

        let wrote = patch_wiki_config(
            &config_path,
            &WikiConfigPatch {
                set_url: Some("https://wiki.example.org".to_string()),
                set_api_url: Some("https://wiki.example.org/w/api.php".to_string()),
                set_article_path: Some("/wiki/$1".to_string()),
                set_summary: None,
            },
        )
        .expect("patch");
        assert!(wrote);

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.wiki.url.as_deref(), Some("https://wiki.example.org"));
        assert_eq!(config.wiki.article_path.as_deref(), Some("/wiki/$1"));
        let raw = fs::read_to_string(&config_path).expect("read config");
        assert!(raw.contains("project_root"));
    }

    #[test]
    fn patch_wiki_config_skips_noop_writes() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        assert!(!patch_wiki_config(&config_path, &WikiConfigPatch::default()).expect("patch"));
        assert!(!config_path.exists());

        let patch = WikiConfigPatch {
            set_summary: Some("tidy".to_string()),
            ..WikiConfigPatch::default()
        };
        assert!(patch_wiki_config(&config_path, &patch).expect("first patch"));
        assert!(!patch_wiki_config(&config_path, &patch).expect("second patch"));
    }

    #[test]
    fn patch_wiki_config_rejects_article_path_without_placeholder() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        let error = patch_wiki_config(
            &config_path,
            &WikiConfigPatch {
                set_article_path: Some("/wiki/".to_string()),
                ..WikiConfigPatch::default()
            },
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("$1"));
        assert!(!config_path.exists());
    }

    #[test]
    fn derive_wiki_url_strips_api_php() {
        assert_eq!(
            derive_wiki_url("https://wiki.example.org/api.php"),
            Some("https://wiki.example.org".to_string())
        );
        assert_eq!(
            derive_wiki_url("https://wiki.example.org/w/api.php"),
            Some("https://wiki.example.org".to_string())
        );
        assert_eq!(derive_wiki_url("   "), None);
    }

    #[test]
    fn env_overrides_config_values() {
        let mut config = WikiConfig::default();
        config.wiki.url = Some("https://from-config.example".to_string());
        config.wiki.summary = Some("config summary".to_string());
        let env = lookup(&[
            ("WIKI_URL", " https://from-env.example "),
            ("WIKI_SUMMARY", ""),
            ("WIKI_ARTICLE_PATH", "/wiki/$1"),
        ]);

        assert_eq!(
            config.wiki_url_with_lookup(&env).as_deref(),
            Some("https://from-env.example")
        );
        assert_eq!(config.summary_with_lookup(&env), "config summary");
        assert_eq!(config.article_path_with_lookup(&env), "/wiki/$1");
    }

    #[test]
    fn wiki_url_falls_back_to_api_url() {
        let mut config = WikiConfig::default();
        config.wiki.api_url = Some("https://wiki.example.org/api.php".to_string());
        let env = lookup(&[]);
        assert_eq!(
            config.wiki_url_with_lookup(&env).as_deref(),
            Some("https://wiki.example.org")
        );
    }

    #[test]
    fn defaults_apply_without_config_or_env() {
        let config = WikiConfig::default();
        let env = lookup(&[]);
        assert_eq!(config.article_path(), "/$1");
        assert_eq!(config.article_path_with_lookup(&env), "/$1");
        assert!(config.user_agent_with_lookup(&env).starts_with("wikigate/"));
        assert_eq!(config.summary_with_lookup(&env), DEFAULT_SUMMARY);
        assert_eq!(config.wiki_url_with_lookup(&env), None);
    }
}
