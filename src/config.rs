use url::Url;

use crate::extractors::vidplay::ProtocolVersion;
use crate::keys::KeySource;
use crate::selector::SupportedProviderList;

pub const DEFAULT_BASE_URL: &str = "https://vidsrc.to";
pub const DEFAULT_PROVIDER_URL: &str = "https://vidplay.online";
/// Key of the envelope around `result.url` of the aggregator's source endpoint.
pub const DEFAULT_SOURCE_KEY: &str = "8z5Ag5wgagfsOuhz";

/// Static configuration of a [SourceResolver](crate::resolver::SourceResolver).
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub(crate) base_url: Url,
    pub(crate) source_key: String,
    pub(crate) provider_url: Url,
    pub(crate) protocol: ProtocolVersion,
    pub(crate) key_source: Option<KeySource>,
    pub(crate) fetch_subtitles: bool,
    pub(crate) cache_keys: bool,
    pub(crate) user_agent: Option<String>,
    pub(crate) providers: SupportedProviderList,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            base_url: Url::parse(DEFAULT_BASE_URL).unwrap(),
            source_key: DEFAULT_SOURCE_KEY.to_string(),
            provider_url: Url::parse(DEFAULT_PROVIDER_URL).unwrap(),
            protocol: ProtocolVersion::default(),
            key_source: None,
            fetch_subtitles: false,
            cache_keys: true,
            user_agent: None,
            providers: SupportedProviderList::default(),
        }
    }
}

impl ResolverConfig {
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn source_key(mut self, source_key: String) -> Self {
        self.source_key = source_key;
        self
    }

    pub fn provider_url(mut self, provider_url: Url) -> Self {
        self.provider_url = provider_url;
        self
    }

    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Overrides where key material comes from. `None` picks the source
    /// matching the protocol version.
    pub fn key_source(mut self, key_source: Option<KeySource>) -> Self {
        self.key_source = key_source;
        self
    }

    pub fn fetch_subtitles(mut self, fetch_subtitles: bool) -> Self {
        self.fetch_subtitles = fetch_subtitles;
        self
    }

    pub fn cache_keys(mut self, cache_keys: bool) -> Self {
        self.cache_keys = cache_keys;
        self
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn providers(mut self, providers: SupportedProviderList) -> Self {
        self.providers = providers;
        self
    }

    pub fn get_key_source(&self) -> KeySource {
        self.key_source
            .clone()
            .unwrap_or_else(|| self.protocol.default_key_source())
    }

    pub fn get_providers(&self) -> &SupportedProviderList {
        &self.providers
    }
}
