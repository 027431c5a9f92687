use anyhow::{Context, Result, bail};
use tracing::{debug, warn};
use url::Url;

use crate::config::WikiConfig;
use crate::title::{uri_to_wiki, wiki_to_uri};

/// Stands for the URL-form title inside an article path such as `/wiki/$1`.
pub const TITLE_PLACEHOLDER: &str = "$1";

const TITLE_QUERY_KEY: &str = "title";

pub fn ensure_article_path(article_path: &str) -> Result<()> {
    if !article_path.contains(TITLE_PLACEHOLDER) {
        bail!("article path must contain the {TITLE_PLACEHOLDER} title placeholder: {article_path}");
    }
    Ok(())
}

/// Build the page URL for a wiki-form title.
///
/// `article_url("https://w.example", "/wiki/$1", "Getting there & away")`
/// yields `https://w.example/wiki/Getting_there_%26_away`.
pub fn article_url(base_url: &str, article_path: &str, title: &str) -> Result<String> {
    ensure_article_path(article_path)?;
    let base = base_url.trim().trim_end_matches('/');
    let encoded = wiki_to_uri(title);
    if encoded.split('/').any(|segment| segment == "." || segment == "..") {
        bail!("title has a relative path segment and cannot be linked: {title}");
    }
    let path = rooted(article_path).replacen(TITLE_PLACEHOLDER, &encoded, 1);
    let candidate = format!("{base}{path}");
    let parsed =
        Url::parse(&candidate).with_context(|| format!("invalid article URL: {candidate}"))?;
    if !parsed.has_host() {
        bail!("article URL has no host: {candidate}");
    }
    Ok(candidate)
}

/// Recover the wiki-form title from a page URL of the configured wiki.
///
/// Both pretty URLs matching the article path and `index.php?title=...`
/// URLs are understood, both under the wiki's base path. Returns `None` for
/// URLs on another origin (scheme, host or port) or outside the article path.
pub fn title_from_url(base_url: &str, article_path: &str, url: &str) -> Option<String> {
    let base = Url::parse(base_url.trim()).ok()?;
    let target = match Url::parse(url.trim()) {
        Ok(target) => target,
        Err(error) => {
            debug!(url, %error, "not a parseable URL");
            return None;
        }
    };
    if base.origin() != target.origin() {
        warn!(
            url,
            expected = %base.origin().ascii_serialization(),
            "URL points at a different origin"
        );
        return None;
    }

    let base_path = base.path().trim_end_matches('/');
    let within_base = target
        .path()
        .strip_prefix(base_path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
    if !within_base {
        debug!(url, base_path, "URL is outside the wiki base path");
        return None;
    }

    if let Some(raw) = raw_query_value(&target, TITLE_QUERY_KEY) {
        return non_empty_title(raw);
    }

    let article_path = rooted(article_path);
    let (prefix, suffix) = article_path.split_once(TITLE_PLACEHOLDER)?;
    let full_prefix = format!("{base_path}{prefix}");
    let raw = target
        .path()
        .strip_prefix(full_prefix.as_str())?
        .strip_suffix(suffix)?;
    non_empty_title(raw)
}

/// Article URL builder bound to one wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLinker {
    base_url: String,
    article_path: String,
}

impl ArticleLinker {
    pub fn new(base_url: impl Into<String>, article_path: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let article_path = article_path.into();
        let parsed =
            Url::parse(&base_url).with_context(|| format!("invalid wiki URL: {base_url}"))?;
        if !parsed.has_host() {
            bail!("wiki URL has no host: {base_url}");
        }
        ensure_article_path(&article_path)?;
        Ok(Self {
            base_url,
            article_path,
        })
    }

    pub fn from_config(config: &WikiConfig) -> Result<Self> {
        let base_url = config.wiki_url().ok_or_else(|| {
            anyhow::anyhow!("wiki URL is not configured; set WIKI_URL or [wiki].url")
        })?;
        Self::new(base_url, config.article_path_owned())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn article_path(&self) -> &str {
        &self.article_path
    }

    pub fn article_url(&self, title: &str) -> Result<String> {
        article_url(&self.base_url, &self.article_path, title)
    }

    pub fn title_from_url(&self, url: &str) -> Option<String> {
        title_from_url(&self.base_url, &self.article_path, url)
    }
}

fn rooted(article_path: &str) -> String {
    let trimmed = article_path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// The raw (still escaped) value, so `uri_to_wiki` decodes it exactly once.
fn raw_query_value<'a>(url: &'a Url, key: &str) -> Option<&'a str> {
    url.query()?.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key).then_some(value)
    })
}

fn non_empty_title(raw: &str) -> Option<String> {
    let title = uri_to_wiki(raw);
    if title.trim().is_empty() {
        None
    } else {
        Some(title)
    }
}
