use std::fmt::Display;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Encrypt,
    Decrypt,
}

impl Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRole::Encrypt => write!(f, "encrypt"),
            KeyRole::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// Every way a single resolution attempt can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to fetch key material from {url}")]
    KeyFetch {
        url: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to parse key material: {0}")]
    KeyParse(String),

    #[error("key material has no {role} key at index {index}")]
    MissingKey { role: KeyRole, index: usize },

    #[error("cipher key is empty")]
    EmptyKey,

    #[error("unsupported cipher input: character {character:?} at position {position} is not a byte value")]
    UnsupportedInputKind { character: char, position: usize },

    #[error("no packed payload found")]
    NoPackedPayloadFound,

    #[error("malformed packed payload: {0}")]
    MalformedPackedPayload(String),

    #[error("provider \"{requested}\" is not offered, available: {}", available.join(", "))]
    ProviderNotOffered { requested: String, available: Vec<String> },

    #[error("unsupported provider url: {0}")]
    UnsupportedProvider(String),

    #[error("no sources found")]
    NoSourcesFound,

    #[error("malformed {what}: {reason}")]
    MalformedResponse { what: &'static str, reason: String },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to request {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to read response body of {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("more than 10 redirects starting at {url}")]
    TooManyRedirects { url: String },
}

impl Error {
    /// Contract violations abort the whole resolution instead of moving on to
    /// the next provider.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnsupportedInputKind { .. } | Error::EmptyKey)
    }

    pub(crate) fn malformed(what: &'static str, reason: impl Display) -> Self {
        Error::MalformedResponse {
            what,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Display) -> Self {
        Error::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, KeyRole};

    #[test]
    fn test_fatal_errors() {
        assert!(Error::EmptyKey.is_fatal());
        assert!(Error::UnsupportedInputKind {
            character: '€',
            position: 3
        }
        .is_fatal());
        assert!(!Error::NoSourcesFound.is_fatal());
        assert!(!Error::NoPackedPayloadFound.is_fatal());
        assert!(!Error::MissingKey {
            role: KeyRole::Encrypt,
            index: 2
        }
        .is_fatal());
    }

    #[test]
    fn test_provider_not_offered_message() {
        let err = Error::ProviderNotOffered {
            requested: "Vidplay".to_string(),
            available: vec!["Filemoon".to_string(), "Doodstream".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "provider \"Vidplay\" is not offered, available: Filemoon, Doodstream"
        );
    }
}
