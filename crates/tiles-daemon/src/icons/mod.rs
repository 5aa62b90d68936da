//! Favicon discovery for dashboard tiles.
//!
//! [`IconResolver::resolve`] walks an ordered list of [`IconSource`]s and
//! stores the first usable payload as `<domain>.png`:
//!
//!   1. the page's own `<link rel=...icon>` declaration
//!   2. `/favicon.ico` at the site root
//!   3. favicon-by-domain providers, in configured order
//!
//! Every fetch is bounded by the same timeout and any failure only moves on to
//! the next source. If nothing works the default icon path comes back; the
//! resolver never returns an error.

pub mod materialize;


use anyhow::Context;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tiles_proto::config::IconsConfig;
use tiles_proto::platform::DEFAULT_ICON;
use tracing::{debug, info, warn};
use url::Url;

pub use materialize::IconDir;

/// `rel` values accepted for a page-declared icon, best first.
const LINK_RELATIONS: [&str; 4] = ["icon", "shortcut icon", "apple-touch-icon", "mask-icon"];

/// One place an icon may be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSource {
    PageLink,
    FaviconIco,
    /// URL template; `{domain}` is replaced by the target's host.
    Provider(String),
}

/// A site URL after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconTarget {
    pub page: Url,
    /// Lower-cased host without credentials or port; names the stored file.
    pub domain: String,
}

impl IconTarget {
    /// Adds `http://` when no scheme is given. `None` when the result has no
    /// host to speak of.
    pub fn parse(site_url: &str) -> Option<Self> {
        let site_url = site_url.trim();
        let page = if has_scheme(site_url) {
            Url::parse(site_url).ok()?
        } else {
            Url::parse(&format!("http://{}", site_url)).ok()?
        };
        let domain = page.host_str()?.to_lowercase();
        if domain.is_empty() {
            return None;
        }
        Some(Self { page, domain })
    }

    fn icon_filename(&self) -> String {
        format!("{}.png", self.domain.trim_start_matches('[').trim_end_matches(']'))
    }
}

pub struct IconResolver {
    client: Client,
    icons: IconDir,
    sources: Vec<IconSource>,
}

impl IconResolver {
    pub fn new(config: &IconsConfig, icons: IconDir) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to build reqwest client for icon fetching")?;

        let mut sources = vec![IconSource::PageLink, IconSource::FaviconIco];
        sources.extend(config.providers.iter().cloned().map(IconSource::Provider));

        Ok(Self {
            client,
            icons,
            sources,
        })
    }

    pub fn sources(&self) -> &[IconSource] {
        &self.sources
    }

    pub fn icons(&self) -> &IconDir {
        &self.icons
    }

    /// Public path of an icon for `site_url`; the default icon when every
    /// source fails.
    pub async fn resolve(&self, site_url: &str) -> String {
        let Some(target) = IconTarget::parse(site_url) else {
            debug!("icons: cannot normalize {:?}, using default", site_url);
            return DEFAULT_ICON.to_string();
        };

        for source in &self.sources {
            let bytes = match self.try_source(source, &target).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    debug!("icons: {:?} failed for {}: {:#}", source, target.domain, e);
                    continue;
                }
            };

            match self.icons.store(bytes, target.icon_filename()).await {
                Ok(path) => {
                    info!("icons: resolved {} via {:?} -> {}", target.domain, source, path);
                    return path;
                }
                Err(e) => {
                    warn!("icons: could not store icon for {}: {:#}", target.domain, e);
                }
            }
        }

        info!("icons: no icon found for {}, using default", target.domain);
        DEFAULT_ICON.to_string()
    }

    /// One GET; `None` on any error, non-success status or empty body.
    pub async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        match self.fetch_bytes(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("icons: fetch {} failed: {:#}", url, e);
                None
            }
        }
    }

    async fn try_source(
        &self,
        source: &IconSource,
        target: &IconTarget,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        match source {
            IconSource::PageLink => {
                let html = self
                    .client
                    .get(target.page.clone())
                    .send()
                    .await
                    .context("page request failed")?
                    .text()
                    .await
                    .context("page body unreadable")?;

                let Some(href) = find_icon_href(&html) else {
                    return Ok(None);
                };
                let icon_url = target
                    .page
                    .join(&href)
                    .with_context(|| format!("bad icon href {:?}", href))?;
                self.fetch_bytes(icon_url.as_str()).await.map(Some)
            }
            IconSource::FaviconIco => {
                let favicon = target.page.join("/favicon.ico")?;
                self.fetch_bytes(favicon.as_str()).await.map(Some)
            }
            IconSource::Provider(template) => {
                let url = template.replace("{domain}", &target.domain);
                self.fetch_bytes(&url).await.map(Some)
            }
        }
    }

    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("{} returned status {}", url, response.status());
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            anyhow::bail!("{} returned an empty body", url);
        }
        Ok(bytes.to_vec())
    }
}

/// `href` of the best `<link>` icon declaration in `html`.
pub fn find_icon_href(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("link[rel][href]").ok()?;
    let links: Vec<(String, String)> = document
        .select(&selector)
        .filter_map(|el| {
            let rel = el.value().attr("rel")?;
            let href = el.value().attr("href")?.trim();
            if href.is_empty() {
                None
            } else {
                Some((rel.to_lowercase(), href.to_string()))
            }
        })
        .collect();

    LINK_RELATIONS.iter().find_map(|wanted| {
        links
            .iter()
            .find(|(rel, _)| rel_matches(rel, wanted))
            .map(|(_, href)| href.clone())
    })
}

/// Substring match on the lower-cased `rel`, so `icon` also accepts
/// `apple-touch-icon` or `fluid-icon` declared earlier in the document.
fn rel_matches(rel: &str, wanted: &str) -> bool {
    rel.contains(wanted)
}

/// Whether `url` starts with `scheme://`. A `://` later in the string (say in
/// a query parameter) does not count.
pub fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
