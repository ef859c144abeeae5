//! Resolvers turn a source page into downloadable variants
//!
//! The engine never depends on how resolution works; it only consumes
//! `ResolvedMedia`. `StaticResolver` is the built-in offline resolver.

use crate::error::ResolveError;
use async_trait::async_trait;
use mediadl_types::{MediaVariant, ResolvedMedia};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Hosts and path fragments that suggest a page carries a video
const VIDEO_HINTS: &[&str] = &["youtube", "tiktok", "vimeo", "watch", "video"];

const SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Resolve a source identifier into media metadata
#[async_trait]
pub trait Resolver: Send + Sync {
    /// `Ok(None)` means the source has nothing to download
    async fn resolve(&self, source: &str) -> Result<Option<ResolvedMedia>, ResolveError>;
}

/// Turn free-form input into a URL; anything not starting with `http`
/// becomes a web search
pub fn normalize_input(input: &str) -> String {
    let input = input.trim();
    if input.starts_with("http") {
        input.to_string()
    } else {
        format!("{}{}", SEARCH_URL, urlencoding::encode(input))
    }
}

/// Cheap check for pages worth resolving
pub fn looks_like_video(url: &str) -> bool {
    let url = url.to_lowercase();
    VIDEO_HINTS.iter().any(|hint| url.contains(hint))
}

/// Offline resolver that offers a fixed set of variants for any video page
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    /// Simulated page-load time
    latency: Duration,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn default_variants() -> Vec<MediaVariant> {
        vec![
            MediaVariant::new("1080p", "120 MB", "mp4"),
            MediaVariant::new("720p", "65 MB", "mp4"),
            MediaVariant::new("Audio", "4 MB", "mp3"),
        ]
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, source: &str) -> Result<Option<ResolvedMedia>, ResolveError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let url = Url::parse(source)
            .map_err(|e| ResolveError::InvalidSource(format!("{}: {}", source, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ResolveError::InvalidSource(format!("{}: missing host", source)))?
            .to_string();

        if !looks_like_video(source) {
            debug!(source = %source, "No video detected");
            return Ok(None);
        }

        Ok(Some(ResolvedMedia {
            title: title_from_url(&url),
            thumbnail: format!("https://picsum.photos/seed/{}/400/225", source.len()),
            source: host,
            variants: Self::default_variants(),
        }))
    }
}

/// Derive a readable title from the last path segment
fn title_from_url(url: &Url) -> String {
    let slug = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .filter(|s| !s.eq_ignore_ascii_case("watch"))
        .map(|s| s.rsplit_once('.').map_or(s, |(stem, _)| stem));

    match slug {
        Some(slug) if !slug.is_empty() => slug
            .split(['-', '_', '+'])
            .filter(|w| !w.is_empty())
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
        _ => "Sample Detected Video".to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
