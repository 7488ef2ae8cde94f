use std::borrow::Cow;
use std::collections::BTreeMap;

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderName;
use serde::Deserialize;
use url::Url;

use super::{ProviderSession, ResolvedSourceSet};
use crate::cipher::{self, StreamCipher};
use crate::error::KeyRole;
use crate::keys::{KeyMaterial, KeySource, KeyStore, EMBEDDED_KEYS_URL, PLAIN_KEYS_URL};
use crate::{http, Error};

/// Handshake generations of the Vidplay/F2Cloud media-info endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProtocolVersion {
    /// Role-keyed material, embed id and `h` parameter each sealed once
    #[default]
    #[value(name = "a", alias = "single-key")]
    SingleKey,
    /// Two positional keys applied one after the other
    #[value(name = "b", alias = "double-envelope")]
    DoubleEnvelope,
    /// Double envelope mixed with a per-session key from `/futoken`
    #[value(name = "c", alias = "futoken")]
    Futoken,
}

impl ProtocolVersion {
    pub fn default_key_source(self) -> KeySource {
        match self {
            ProtocolVersion::SingleKey => KeySource::Embedded(EMBEDDED_KEYS_URL.to_string()),
            ProtocolVersion::DoubleEnvelope | ProtocolVersion::Futoken => KeySource::Plain(PLAIN_KEYS_URL.to_string()),
        }
    }
}

/// Token placed in the media-info path, tagged by the handshake that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedToken {
    SingleKey { encoded_id: String, h: String },
    DoubleEnvelope { encoded_id: String },
    Futoken { futoken: String },
}

impl DerivedToken {
    pub fn mediainfo_url(&self, provider_url: &Url, query: Option<&str>) -> Result<Url, Error> {
        let (token, extra) = match self {
            DerivedToken::SingleKey { encoded_id, h } => (encoded_id, format!("h={h}&autostart=true&ads=0")),
            DerivedToken::DoubleEnvelope { encoded_id } => (encoded_id, "autostart=true".to_string()),
            DerivedToken::Futoken { futoken } => (futoken, "autostart=true".to_string()),
        };

        let mut mediainfo_url = provider_url
            .join(&format!("/mediainfo/{token}"))
            .map_err(|err| Error::invalid_url(provider_url.as_str(), err))?;
        let query = match query {
            Some(query) => format!("{query}&{extra}"),
            None => extra,
        };
        mediainfo_url.set_query(Some(&query));

        Ok(mediainfo_url)
    }
}

/// Variant A: `encrypt[1]` seals the embed id, `encrypt[2]` the `h` parameter.
pub fn encode_single_key(keys: &KeyMaterial, media_id: &str) -> Result<DerivedToken, Error> {
    let embed_key = keys.key(KeyRole::Encrypt, 1)?;
    let h_key = keys.key(KeyRole::Encrypt, 2)?;

    Ok(DerivedToken::SingleKey {
        encoded_id: cipher::seal(embed_key, media_id)?,
        h: cipher::seal(h_key, media_id)?,
    })
}

/// Variants B and C: the id goes through the first two keys in order.
pub fn encode_double_envelope(keys: &KeyMaterial, media_id: &str) -> Result<String, Error> {
    let first_key = keys.key(KeyRole::Encrypt, 0)?;
    let second_key = keys.key(KeyRole::Encrypt, 1)?;

    let inner = StreamCipher::new(first_key.as_bytes())?.apply(media_id)?;
    let outer = StreamCipher::new(second_key.as_bytes())?.apply(&inner)?;

    Ok(cipher::encode_base64_url(outer))
}

/// Pulls the session key out of the `/futoken` script (`var k='...'`).
pub fn extract_futoken_key(futoken_text: &str) -> Result<&str, Error> {
    static FUTOKEN_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bk\s*=\s*'([^']+)'"#).unwrap());

    FUTOKEN_KEY_REGEX
        .captures(futoken_text)
        .and_then(|captures| captures.get(1))
        .map(|futoken_key| futoken_key.as_str())
        .ok_or_else(|| Error::malformed("futoken script", "no session key assignment"))
}

/// `fu_key` followed by `code(fu_key[i % len]) + code(key[i])` for every `i`.
pub fn derive_futoken(fu_key: &str, key: &str) -> Result<String, Error> {
    let fu_codes = fu_key.chars().map(u32::from).collect::<Vec<_>>();

    if fu_codes.is_empty() {
        return Err(Error::EmptyKey);
    }

    let mut parts = Vec::with_capacity(key.len() + 1);
    parts.push(fu_key.to_string());

    for (index, code) in key.chars().map(u32::from).enumerate() {
        parts.push((fu_codes[index % fu_codes.len()] + code).to_string());
    }

    Ok(parts.join(","))
}

#[derive(Debug, Deserialize)]
struct MediaInfoResponse {
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    sources: Option<Vec<MediaSource>>,
}

#[derive(Debug, Deserialize)]
struct MediaSource {
    file: String,
}

#[derive(Debug, Deserialize)]
struct Subtitle {
    label: String,
    file: String,
}

/// Decodes a media-info body into stream urls.
///
/// Current endpoints wrap `result` into an envelope opened with `decrypt[1]`,
/// older ones return the object as is.
pub fn decode_mediainfo(body: &str, keys: &KeyMaterial) -> Result<Vec<String>, Error> {
    let response = serde_json::from_str::<MediaInfoResponse>(body).map_err(|err| Error::malformed("mediainfo", err))?;

    let media_info = match response.result {
        serde_json::Value::String(encoded) => {
            let decrypt_key = keys.key(KeyRole::Decrypt, 1)?;
            let decoded = cipher::open_text(decrypt_key, &encoded)?;
            serde_json::from_str::<MediaInfo>(&decoded).map_err(|err| Error::malformed("mediainfo result", err))?
        }
        object @ serde_json::Value::Object(_) => {
            serde_json::from_value::<MediaInfo>(object).map_err(|err| Error::malformed("mediainfo result", err))?
        }
        _ => return Err(Error::NoSourcesFound),
    };

    let streams = media_info
        .sources
        .unwrap_or_default()
        .into_iter()
        .map(|source| source.file)
        .collect::<Vec<_>>();

    if streams.is_empty() {
        return Err(Error::NoSourcesFound);
    }

    Ok(streams)
}

/// Subtitle list url carried in the `info=` (or `sub.info=`) query parameter.
pub fn subtitles_url(embed_url: &Url) -> Option<String> {
    static INFO_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[&.])info=([^&]+)").unwrap());

    let query = embed_url.query()?;
    let encoded = INFO_REGEX.captures(query)?.get(1)?.as_str();

    urlencoding::decode(encoded).ok().map(Cow::into_owned)
}

/// Maps a `[{label, file}]` document to label -> url. Later labels win.
pub fn parse_subtitles(body: &str) -> Result<BTreeMap<String, String>, Error> {
    serde_json::from_str::<Vec<Subtitle>>(body)
        .map(|subtitles| {
            subtitles
                .into_iter()
                .map(|subtitle| (subtitle.label, subtitle.file))
                .collect()
        })
        .map_err(|err| Error::malformed("subtitle list", err))
}

pub struct Vidplay<'a> {
    key_store: &'a KeyStore,
    key_source: &'a KeySource,
    protocol: ProtocolVersion,
    user_agent: Option<&'a str>,
    fetch_subtitles: bool,
}

impl<'a> Vidplay<'a> {
    pub fn new(key_store: &'a KeyStore, key_source: &'a KeySource, protocol: ProtocolVersion) -> Self {
        Vidplay {
            key_store,
            key_source,
            protocol,
            user_agent: None,
            fetch_subtitles: false,
        }
    }

    pub fn user_agent(mut self, user_agent: Option<&'a str>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn fetch_subtitles(mut self, fetch_subtitles: bool) -> Self {
        self.fetch_subtitles = fetch_subtitles;
        self
    }

    pub async fn resolve(&self, session: &ProviderSession) -> Result<ResolvedSourceSet, Error> {
        let keys = self.key_store.fetch(self.key_source).await?;
        let token = self.derive_token(session, &keys).await?;
        let mediainfo_url = token.mediainfo_url(&session.provider_url, session.query())?;
        log::debug!("Vidplay/F2Cloud: requesting media info {}", mediainfo_url);

        let mediainfo_extra_headers = [
            (
                reqwest::header::ACCEPT,
                "application/json, text/javascript, */*; q=0.01",
            ),
            (HeaderName::from_static("x-requested-with"), "XMLHttpRequest"),
        ];
        let mediainfo_text = http::get_page_text(
            mediainfo_url.as_str(),
            self.user_agent,
            Some(session.referer()),
            Some(&mediainfo_extra_headers),
        )
        .await?;
        let streams = decode_mediainfo(&mediainfo_text, &keys)?;

        let subtitles = if self.fetch_subtitles {
            self.get_subtitles(&session.embed_url).await
        } else {
            BTreeMap::new()
        };

        Ok(ResolvedSourceSet {
            streams,
            subtitles,
            referer: Some(session.referer().to_string()),
        })
    }

    pub async fn derive_token(&self, session: &ProviderSession, keys: &KeyMaterial) -> Result<DerivedToken, Error> {
        log::debug!("Vidplay/F2Cloud: deriving {:?} token for {}", self.protocol, session.media_id);

        match self.protocol {
            ProtocolVersion::SingleKey => encode_single_key(keys, &session.media_id),
            ProtocolVersion::DoubleEnvelope => Ok(DerivedToken::DoubleEnvelope {
                encoded_id: encode_double_envelope(keys, &session.media_id)?,
            }),
            ProtocolVersion::Futoken => {
                let key = encode_double_envelope(keys, &session.media_id)?;
                let futoken_url = session
                    .provider_url
                    .join("/futoken")
                    .map_err(|err| Error::invalid_url(session.provider_url.as_str(), err))?;
                let futoken_text =
                    http::get_page_text(futoken_url.as_str(), self.user_agent, Some(session.referer()), None).await?;
                let fu_key = extract_futoken_key(&futoken_text)?;

                Ok(DerivedToken::Futoken {
                    futoken: derive_futoken(fu_key, &key)?,
                })
            }
        }
    }

    async fn get_subtitles(&self, embed_url: &Url) -> BTreeMap<String, String> {
        let Some(subtitles_url) = subtitles_url(embed_url) else {
            log::debug!("Vidplay/F2Cloud: embed url carries no subtitle list");
            return BTreeMap::new();
        };

        let subtitles = match http::get_page_text(&subtitles_url, self.user_agent, None, None).await {
            Ok(body) => parse_subtitles(&body),
            Err(err) => Err(err),
        };

        subtitles.unwrap_or_else(|err| {
            log::warn!("Vidplay/F2Cloud: failed to get subtitles: {:#}", anyhow::Error::from(err));
            BTreeMap::new()
        })
    }
}
