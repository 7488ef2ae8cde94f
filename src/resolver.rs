use std::fmt;

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::config::ResolverConfig;
use crate::extractors::filemoon::Filemoon;
use crate::extractors::vidplay::Vidplay;
use crate::extractors::{ProviderFamily, ProviderSession, ResolvedSourceSet};
use crate::keys::{KeySource, KeyStore};
use crate::{cipher, http, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        })
    }
}

/// A title on the aggregator, identified by its IMDb or TMDB id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub kind: MediaKind,
    pub id: String,
    pub episode: Option<(u32, u32)>,
}

impl MediaRequest {
    pub fn movie(id: impl Into<String>) -> Self {
        MediaRequest {
            kind: MediaKind::Movie,
            id: id.into(),
            episode: None,
        }
    }

    pub fn episode(id: impl Into<String>, season: u32, episode: u32) -> Self {
        MediaRequest {
            kind: MediaKind::Tv,
            id: id.into(),
            episode: Some((season, episode)),
        }
    }
}

/// One entry of the aggregator's source list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    pub title: String,
}

#[derive(Deserialize)]
struct SourceListResponse {
    result: Vec<SourceEntry>,
}

#[derive(Deserialize)]
struct SourceResponse {
    result: SourceUrl,
}

#[derive(Deserialize)]
struct SourceUrl {
    url: String,
}

pub fn extract_data_id(embed_page: &str) -> Result<String, Error> {
    static DATA_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<a\b[^>]*?\bdata-id\s*=\s*["']([^"']+)["']"#).unwrap());

    DATA_ID_REGEX
        .captures(embed_page)
        .map(|captures| captures[1].to_string())
        .ok_or_else(|| Error::malformed("embed page", "no element with a data-id attribute"))
}

/// Looks up a provider by label, ignoring ASCII case.
pub fn find_source<'a>(sources: &'a [SourceEntry], provider: &str) -> Result<&'a SourceEntry, Error> {
    sources
        .iter()
        .find(|source| source.title.eq_ignore_ascii_case(provider))
        .ok_or_else(|| Error::ProviderNotOffered {
            requested: provider.to_string(),
            available: sources.iter().map(|source| source.title.clone()).collect(),
        })
}

pub fn decode_provider_url(source_key: &str, encrypted: &str) -> Result<Url, Error> {
    let decoded = cipher::open_text(source_key, encrypted)?;
    Url::parse(&decoded).map_err(|err| Error::invalid_url(decoded.as_str(), err))
}

/// Walks one title from the aggregator's embed page down to the streams of a
/// single provider.
#[derive(Debug)]
pub struct SourceResolver {
    config: ResolverConfig,
    key_store: KeyStore,
    key_source: KeySource,
}

impl SourceResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let key_store = KeyStore::new(config.cache_keys).user_agent(config.user_agent.clone());
        let key_source = config.get_key_source();

        SourceResolver {
            config,
            key_store,
            key_source,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn embed_url(&self, media: &MediaRequest) -> Result<Url, Error> {
        let kind = media.kind.to_string();
        let episode = media
            .episode
            .map(|(season, episode)| (season.to_string(), episode.to_string()));
        let mut path = vec!["embed", kind.as_str(), media.id.as_str()];

        if let Some((season, episode)) = &episode {
            path.push(season);
            path.push(episode);
        }

        self.aggregator_url(&path)
    }

    pub async fn fetch_data_id(&self, media: &MediaRequest) -> Result<String, Error> {
        let embed_url = self.embed_url(media)?;
        log::debug!("Fetching embed page {}", embed_url);

        let embed_page = http::get_page_text(embed_url.as_str(), self.user_agent(), None, None).await?;
        let data_id = extract_data_id(&embed_page)?;
        log::debug!("Embed page fetched, data id: {}", data_id);

        Ok(data_id)
    }

    pub async fn fetch_source_list(&self, data_id: &str) -> Result<Vec<SourceEntry>, Error> {
        let url = self.aggregator_url(&["ajax", "embed", "episode", data_id, "sources"])?;
        let response: SourceListResponse = http::get_page_json(url.as_str(), self.user_agent(), None, None).await?;
        log::debug!(
            "Source list fetched: {}",
            response
                .result
                .iter()
                .map(|source| source.title.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(response.result)
    }

    pub async fn fetch_provider_url(&self, source_id: &str) -> Result<Url, Error> {
        let url = self.aggregator_url(&["ajax", "embed", "source", source_id])?;
        let response: SourceResponse = http::get_page_json(url.as_str(), self.user_agent(), None, None).await?;
        let provider_url = decode_provider_url(&self.config.source_key, &response.result.url)?;
        log::debug!("Provider url decoded: {}", provider_url);

        Ok(provider_url)
    }

    /// Resolves the streams offered by `provider` for an already fetched
    /// data id. Each call is an independent session.
    pub async fn resolve(&self, data_id: &str, provider: &str) -> Result<ResolvedSourceSet, Error> {
        let sources = self.fetch_source_list(data_id).await?;
        let source = find_source(&sources, provider)?;
        log::debug!("Provider selected: {} ({})", source.title, source.id);

        let provider_url = self.fetch_provider_url(&source.id).await?;
        let family = ProviderFamily::classify(provider_url.as_str())?;
        let session = ProviderSession::new(provider_url, self.config.provider_url.clone())?;
        log::info!("{}: resolving {}", family.display_name(), session.media_id);

        let resolved = match family {
            ProviderFamily::Vidplay => {
                Vidplay::new(&self.key_store, &self.key_source, self.config.protocol)
                    .user_agent(self.user_agent())
                    .fetch_subtitles(self.config.fetch_subtitles)
                    .resolve(&session)
                    .await?
            }
            ProviderFamily::Filemoon => Filemoon::new(self.user_agent()).resolve(&session).await?,
        };
        log::debug!("{}: streams resolved", family.display_name());

        Ok(resolved)
    }

    fn user_agent(&self) -> Option<&str> {
        self.config.user_agent.as_deref()
    }

    fn aggregator_url(&self, path: &[&str]) -> Result<Url, Error> {
        let mut url = self.config.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| Error::invalid_url(self.config.base_url.as_str(), "base url cannot have a path"))?
            .pop_if_empty()
            .extend(path);

        Ok(url)
    }
}
