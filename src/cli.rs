use clap::Parser;
use url::Url;
use vidsrc::config::{ResolverConfig, DEFAULT_BASE_URL, DEFAULT_PROVIDER_URL, DEFAULT_SOURCE_KEY};
use vidsrc::extractors::vidplay::ProtocolVersion;
use vidsrc::keys::KeySource;
use vidsrc::resolver::{MediaKind, MediaRequest};

#[derive(Parser, Debug)]
#[command(version)]
/// Resolve playable streams of a movie or episode on vidsrc
pub(crate) struct Args {
    /// Media type
    #[arg(value_enum, ignore_case = true)]
    pub(crate) media_type: MediaKind,

    /// IMDb or TMDB id
    pub(crate) media_id: String,

    /// Season number
    #[arg(short = 'S', long, required_if_eq("media_type", "tv"))]
    pub(crate) season: Option<u32>,

    /// Episode number
    #[arg(short = 'E', long, required_if_eq("media_type", "tv"))]
    pub(crate) episode: Option<u32>,

    /// Provider to try first
    #[arg(short, long, default_value = "Vidplay")]
    pub(crate) source: String,

    /// Fetch subtitles
    #[arg(long)]
    pub(crate) fetch_subtitles: bool,

    /// Subtitle label passed to mpv, implies --fetch-subtitles
    #[arg(short = 'l', long, value_name = "LABEL")]
    pub(crate) default_subtitles: Option<String>,

    /// Handshake version of the Vidplay media-info endpoint
    #[arg(value_enum, short, long, ignore_case = true, default_value_t = ProtocolVersion::SingleKey)]
    pub(crate) protocol: ProtocolVersion,

    /// Aggregator base url
    #[arg(long, default_value = DEFAULT_BASE_URL, value_name = "URL")]
    pub(crate) base_url: Url,

    /// Vidplay base url used for the media-info and futoken endpoints
    #[arg(long, default_value = DEFAULT_PROVIDER_URL, value_name = "URL")]
    pub(crate) provider_url: Url,

    /// Key of the envelope around decoded provider urls
    #[arg(long, default_value = DEFAULT_SOURCE_KEY, hide_default_value = true, value_name = "KEY")]
    pub(crate) source_key: String,

    /// Fetch key material from this url instead of the protocol's default
    #[arg(long, value_name = "URL")]
    pub(crate) key_url: Option<Url>,

    /// Key url serves plain JSON rather than an embedded GitHub page
    #[arg(long, requires = "key_url")]
    pub(crate) plain_keys: bool,

    /// Fetch key material again for every attempt
    #[arg(long)]
    pub(crate) no_key_cache: bool,

    /// Play the first stream in mpv
    #[arg(long)]
    pub(crate) mpv: bool,

    /// Do not start mpv in fullscreen
    #[arg(long, requires = "mpv")]
    pub(crate) no_fullscreen: bool,

    /// Show ffmpeg errors from mpv
    #[arg(long, requires = "mpv")]
    pub(crate) log_ffmpeg_errors: bool,

    /// Enable debug mode
    #[arg(short, long)]
    pub(crate) debug: bool,
}

impl Args {
    pub(crate) fn get_media_request(&self) -> MediaRequest {
        match (self.media_type, self.season, self.episode) {
            (MediaKind::Tv, Some(season), Some(episode)) => MediaRequest::episode(&self.media_id, season, episode),
            (kind, _, _) => MediaRequest {
                kind,
                id: self.media_id.clone(),
                episode: None,
            },
        }
    }

    pub(crate) fn get_resolver_config(&self) -> ResolverConfig {
        let key_source = self.key_url.as_ref().map(|url| {
            if self.plain_keys {
                KeySource::Plain(url.to_string())
            } else {
                KeySource::Embedded(url.to_string())
            }
        });

        ResolverConfig::default()
            .base_url(self.base_url.clone())
            .provider_url(self.provider_url.clone())
            .source_key(self.source_key.clone())
            .protocol(self.protocol)
            .key_source(key_source)
            .fetch_subtitles(self.fetch_subtitles || self.default_subtitles.is_some())
            .cache_keys(!self.no_key_cache)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use vidsrc::extractors::vidplay::ProtocolVersion;
    use vidsrc::keys::KeySource;
    use vidsrc::resolver::MediaRequest;

    use super::Args;

    #[test]
    fn test_parse_episode() {
        let args = Args::try_parse_from(["vidsrc", "tv", "1396", "-S", "1", "-E", "2", "-p", "futoken"]).unwrap();

        assert_eq!(args.get_media_request(), MediaRequest::episode("1396", 1, 2));
        assert_eq!(args.protocol, ProtocolVersion::Futoken);
        assert_eq!(args.source, "Vidplay");
    }

    #[test]
    fn test_tv_requires_episode() {
        assert!(Args::try_parse_from(["vidsrc", "tv", "1396", "-S", "1"]).is_err());
        assert!(Args::try_parse_from(["vidsrc", "movie", "tt1877830"]).is_ok());
    }

    #[test]
    fn test_resolver_config() {
        let args = Args::try_parse_from([
            "vidsrc",
            "movie",
            "tt1877830",
            "--key-url",
            "https://example.com/keys.json",
            "--plain-keys",
            "-l",
            "English",
        ])
        .unwrap();
        let config = args.get_resolver_config();

        assert_eq!(
            config.get_key_source(),
            KeySource::Plain("https://example.com/keys.json".to_string())
        );
    }
}
