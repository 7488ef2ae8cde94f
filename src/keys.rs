use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::KeyRole;
use crate::{http, Error};

pub const EMBEDDED_KEYS_URL: &str = "https://github.com/Ciarands/vidsrc-keys/blob/main/keys.json";
pub const PLAIN_KEYS_URL: &str = "https://raw.githubusercontent.com/KillerDogeEmpire/vidplay-keys/keys/keys.json";

/// Where key material is published, and in which shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySource {
    /// An HTML page carrying the JSON document inside its `"rawLines"` array.
    Embedded(String),
    /// A bare JSON array of keys.
    Plain(String),
}

impl KeySource {
    pub fn url(&self) -> &str {
        match self {
            KeySource::Embedded(url) | KeySource::Plain(url) => url,
        }
    }
}

/// Cipher keys indexed by role and position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyMaterial {
    encrypt: Vec<String>,
    decrypt: Vec<String>,
}

impl KeyMaterial {
    pub fn new(encrypt: Vec<String>, decrypt: Vec<String>) -> Self {
        KeyMaterial { encrypt, decrypt }
    }

    /// Keys published without roles serve both of them in publication order.
    pub fn positional(keys: Vec<String>) -> Self {
        KeyMaterial {
            encrypt: keys.clone(),
            decrypt: keys,
        }
    }

    pub fn key(&self, role: KeyRole, index: usize) -> Result<&str, Error> {
        let keys = match role {
            KeyRole::Encrypt => &self.encrypt,
            KeyRole::Decrypt => &self.decrypt,
        };

        keys.get(index)
            .map(String::as_str)
            .ok_or(Error::MissingKey { role, index })
    }

    pub fn keys(&self, role: KeyRole) -> &[String] {
        match role {
            KeyRole::Encrypt => &self.encrypt,
            KeyRole::Decrypt => &self.decrypt,
        }
    }
}

/// Extracts key material from the `"rawLines"` array of a rendered page.
///
/// The embedded document is either role-keyed (`{"encrypt": [..], "decrypt":
/// [..]}`) or, in older pages, a positional list of keys.
pub fn parse_embedded(page: &str) -> Result<KeyMaterial, Error> {
    static RAW_LINES_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#""rawLines":\s*\["((?:[^"\\]|\\.)*)"\]"#).unwrap());

    let raw = RAW_LINES_REGEX
        .captures(page)
        .and_then(|captures| captures.get(1))
        .map(|raw| raw.as_str())
        .ok_or_else(|| Error::KeyParse("page has no rawLines array".to_string()))?;
    let document = serde_json::from_str::<String>(&format!("\"{raw}\""))
        .map_err(|err| Error::KeyParse(format!("rawLines entry: {err}")))?;

    match document.trim_start().as_bytes().first() {
        Some(b'{') => serde_json::from_str::<KeyMaterial>(&document)
            .map_err(|err| Error::KeyParse(format!("role-keyed document: {err}")))
            .and_then(reject_empty_keys),
        Some(b'[') => parse_key_list(&document),
        _ => Err(Error::KeyParse(
            "embedded document is neither an object nor an array".to_string(),
        )),
    }
}

/// Parses a bare JSON array of keys.
pub fn parse_plain(body: &str) -> Result<KeyMaterial, Error> {
    parse_key_list(body.trim())
}

fn parse_key_list(document: &str) -> Result<KeyMaterial, Error> {
    let keys = serde_json::from_str::<Vec<String>>(document)
        .map_err(|err| Error::KeyParse(format!("key list: {err}")))?;

    if keys.is_empty() {
        return Err(Error::KeyParse("key list is empty".to_string()));
    }

    reject_empty_keys(KeyMaterial::positional(keys))
}

/// An empty key cannot seed the cipher, so it is a broken key document.
fn reject_empty_keys(material: KeyMaterial) -> Result<KeyMaterial, Error> {
    if material.encrypt.iter().chain(&material.decrypt).any(String::is_empty) {
        return Err(Error::KeyParse("key list contains an empty key".to_string()));
    }

    Ok(material)
}

/// Fetches key material, optionally caching it for the lifetime of the store.
#[derive(Debug, Default)]
pub struct KeyStore {
    cache: Option<Mutex<HashMap<KeySource, Arc<KeyMaterial>>>>,
    user_agent: Option<String>,
}

impl KeyStore {
    pub fn new(cache: bool) -> Self {
        KeyStore {
            cache: cache.then(Mutex::default),
            user_agent: None,
        }
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub async fn fetch(&self, source: &KeySource) -> Result<Arc<KeyMaterial>, Error> {
        if let Some(cached) = self.cached(source) {
            log::trace!("Using cached key material from {}", source.url());
            return Ok(cached);
        }

        let material = Arc::new(match source {
            KeySource::Embedded(url) => self.fetch_embedded(url).await?,
            KeySource::Plain(url) => self.fetch_plain(url).await?,
        });

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(source.clone(), material.clone());
        }

        Ok(material)
    }

    pub async fn fetch_embedded(&self, url: &str) -> Result<KeyMaterial, Error> {
        parse_embedded(&self.fetch_text(url).await?)
    }

    pub async fn fetch_plain(&self, url: &str) -> Result<KeyMaterial, Error> {
        parse_plain(&self.fetch_text(url).await?)
    }

    #[cfg(test)]
    fn insert_cached(&self, source: KeySource, material: KeyMaterial) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(source, Arc::new(material));
        }
    }

    fn cached(&self, source: &KeySource) -> Option<Arc<KeyMaterial>> {
        self.cache
            .as_ref()?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    async fn fetch_text(&self, url: &str) -> Result<String, Error> {
        log::debug!("Fetching key material from {}", url);

        http::get_page_text(url, self.user_agent.as_deref(), None, None)
            .await
            .map_err(|err| Error::KeyFetch {
                url: url.to_string(),
                source: Box::new(err),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{parse_embedded, parse_plain, KeyMaterial, KeySource, KeyStore};
    use crate::error::KeyRole;
    use crate::Error;

    #[test]
    fn test_parse_embedded_roles() {
        let page = r#"<script type="application/json" data-target="react-app.embeddedData">{"payload":{"blob":{"rawLines":["{\"encrypt\":[\"k0\",\"k1\",\"k2\"],\"decrypt\":[\"d0\",\"d1\",\"d2\"]}"],"stylingDirectives":[[]]}}}</script>"#;
        let material = parse_embedded(page).unwrap();

        assert_eq!(material.key(KeyRole::Encrypt, 1).unwrap(), "k1");
        assert_eq!(material.key(KeyRole::Encrypt, 2).unwrap(), "k2");
        assert_eq!(material.key(KeyRole::Decrypt, 1).unwrap(), "d1");
        assert!(matches!(
            material.key(KeyRole::Decrypt, 3),
            Err(Error::MissingKey {
                role: KeyRole::Decrypt,
                index: 3
            })
        ));
    }

    #[test]
    fn test_parse_embedded_positional() {
        let page = r#"{"rawLines":["[\"oAPS7zX11zIzXFNi\",\"cWezD5NltrSMF7CG\"]"],"stylingDirectives":[]}"#;
        let material = parse_embedded(page).unwrap();

        assert_eq!(
            material,
            KeyMaterial::positional(vec!["oAPS7zX11zIzXFNi".to_string(), "cWezD5NltrSMF7CG".to_string()])
        );
        assert_eq!(material.key(KeyRole::Decrypt, 1).unwrap(), "cWezD5NltrSMF7CG");
    }

    #[test]
    fn test_parse_embedded_missing_marker() {
        assert!(matches!(parse_embedded("<html>404</html>"), Err(Error::KeyParse(_))));
        assert!(matches!(
            parse_embedded(r#""rawLines":["not json"]"#),
            Err(Error::KeyParse(_))
        ));
    }

    #[test]
    fn test_parse_plain() {
        let material = parse_plain("[\"oAPS7zX11zIzXFNi\", \"cWezD5NltrSMF7CG\"]\n").unwrap();
        assert_eq!(
            material.keys(KeyRole::Encrypt),
            ["oAPS7zX11zIzXFNi".to_string(), "cWezD5NltrSMF7CG".to_string()]
        );

        assert!(matches!(parse_plain("[]"), Err(Error::KeyParse(_))));
        assert!(matches!(parse_plain("{\"keys\": 1}"), Err(Error::KeyParse(_))));
    }

    #[test]
    fn test_empty_keys_rejected() {
        assert!(matches!(
            parse_plain(r#"["", "cWezD5NltrSMF7CG"]"#),
            Err(Error::KeyParse(_))
        ));

        let page = r#"{"rawLines":["{\"encrypt\":[\"\",\"k1\",\"k2\"],\"decrypt\":[\"d0\",\"d1\"]}"]}"#;
        assert!(matches!(parse_embedded(page), Err(Error::KeyParse(_))));

        let page = r#"{"rawLines":["[\"oAPS7zX11zIzXFNi\",\"\"]"]}"#;
        assert!(matches!(parse_embedded(page), Err(Error::KeyParse(_))));
    }

    #[tokio::test]
    async fn test_fetch_uses_cache() {
        let store = KeyStore::new(true);
        // Nothing listens there, only a cache hit can succeed
        let source = KeySource::Plain("http://127.0.0.1:9/keys.json".to_string());
        let material = KeyMaterial::positional(vec!["k0".to_string(), "k1".to_string()]);
        store.insert_cached(source.clone(), material.clone());

        let fetched = store.fetch(&source).await.unwrap();
        assert_eq!(*fetched, material);
        assert!(Arc::ptr_eq(&fetched, &store.fetch(&source).await.unwrap()));
    }
}
