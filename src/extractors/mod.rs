use std::collections::BTreeMap;

use enum_iterator::Sequence;
use url::Url;

use crate::Error;

pub mod filemoon;
pub mod vidplay;

/// Hosting backend families this crate knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum ProviderFamily {
    Vidplay,
    Filemoon,
}

impl ProviderFamily {
    pub const fn display_name(self) -> &'static str {
        match self {
            ProviderFamily::Vidplay => "Vidplay/F2Cloud",
            ProviderFamily::Filemoon => "Filemoon",
        }
    }

    /// Host fragments identifying the family inside a decoded provider url.
    pub const fn host_fragments(self) -> &'static [&'static str] {
        match self {
            ProviderFamily::Vidplay => &["vidplay", "mcloud", "f2cloud", "vid2faf"],
            ProviderFamily::Filemoon => &["filemoon", "keraproxy", "kerapoxy"],
        }
    }

    /// Classifies a decoded provider url by substring match.
    pub fn classify(url: &str) -> Result<ProviderFamily, Error> {
        let lowercase = url.to_ascii_lowercase();

        enum_iterator::all::<ProviderFamily>()
            .find(|family| {
                family
                    .host_fragments()
                    .iter()
                    .any(|fragment| lowercase.contains(fragment))
            })
            .ok_or_else(|| Error::UnsupportedProvider(url.to_string()))
    }
}

/// Candidate streams in upstream order plus subtitles by label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSourceSet {
    pub streams: Vec<String>,
    pub subtitles: BTreeMap<String, String>,
    pub referer: Option<String>,
}

/// State of one resolution attempt against one provider. Never reused.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub media_id: String,
    pub provider_url: Url,
    pub embed_url: Url,
}

impl ProviderSession {
    /// The media id is the last path segment of the embed url, e.g.
    /// `https://vidplay.online/e/48YZZWELRY2X?t=...` has `48YZZWELRY2X`.
    pub fn new(embed_url: Url, provider_url: Url) -> Result<Self, Error> {
        let media_id = embed_url
            .path_segments()
            .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_url(embed_url.as_str(), "embed url has no media id"))?;

        Ok(ProviderSession {
            media_id,
            provider_url,
            embed_url,
        })
    }

    /// Query of the embed url, forwarded verbatim to the media-info request.
    pub fn query(&self) -> Option<&str> {
        self.embed_url.query().filter(|query| !query.is_empty())
    }

    pub fn referer(&self) -> &str {
        self.embed_url.as_str()
    }
}

pub mod utils {
    use std::num::NonZeroUsize;

    use once_cell::sync::Lazy;
    use regex::Regex;

    use crate::Error;

    const BASE_N_TABLE: &[u8; 64] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ+/";

    /// Encodes `num` with the first `base` symbols of `0-9a-zA-Z+/`.
    pub fn encode_base_n(mut num: usize, base: NonZeroUsize) -> Option<String> {
        let table = BASE_N_TABLE.get(..base.get())?;

        if base.get() < 2 {
            return None;
        }

        if num == 0 {
            return Some((table[0] as char).to_string());
        }

        let mut digits = Vec::new();
        let base = table.len();

        while num > 0 {
            digits.push(table[num % base]);
            num /= base;
        }

        digits.reverse();
        String::from_utf8(digits).ok()
    }

    /// Reverses the packer's symbol substitution.
    ///
    /// Symbols are replaced from the highest index down, each as a whole word,
    /// so an encoded `1` never matches inside `10` or `a1`. Encodings using
    /// `+` or `/` (radix above 62) only match a run of word, `+` and `/`
    /// characters that equals them exactly.
    pub fn unpack(payload: &str, radix: usize, symbol_count: usize, dictionary: &[&str]) -> Result<String, Error> {
        static WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());
        static WIDE_WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w+/]+").unwrap());

        let base = NonZeroUsize::new(radix)
            .filter(|base| (2..=BASE_N_TABLE.len()).contains(&base.get()))
            .ok_or_else(|| Error::MalformedPackedPayload(format!("unsupported radix {radix}")))?;
        let mut unpacked = payload.to_string();

        for index in (0..symbol_count).rev() {
            let Some(symbol) = dictionary.get(index).filter(|symbol| !symbol.is_empty()) else {
                continue;
            };
            let encoded = encode_base_n(index, base)
                .ok_or_else(|| Error::MalformedPackedPayload(format!("cannot encode {index} in base {radix}")))?;

            if !unpacked.contains(encoded.as_str()) {
                continue;
            }

            let word_regex = if encoded.contains(['+', '/']) {
                &WIDE_WORD_REGEX
            } else {
                &WORD_REGEX
            };

            unpacked = word_regex
                .replace_all(&unpacked, |captures: &regex::Captures| {
                    let word = &captures[0];
                    if word == encoded {
                        symbol.to_string()
                    } else {
                        word.to_string()
                    }
                })
                .into_owned();
        }

        Ok(unpacked)
    }

    /// Arguments of an `eval(function(p,a,c,k,e,d){...}(...))` invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PackedScript<'a> {
        pub payload: String,
        pub radix: usize,
        pub symbol_count: usize,
        pub dictionary: Vec<&'a str>,
    }

    impl<'a> PackedScript<'a> {
        /// Finds the first packed script in `source`.
        pub fn find(source: &'a str) -> Result<Self, Error> {
            static PACKED_CODES_REGEX: Lazy<Regex> = Lazy::new(|| {
                Regex::new(r"(?s)eval\(function\(p,a,c,k,e,[a-z]\).*?\}\('(.+?)',(\d+),(\d+),'([^']*)'\.split\('\|'\)")
                    .unwrap()
            });

            let captures = PACKED_CODES_REGEX
                .captures(source)
                .ok_or(Error::NoPackedPayloadFound)?;
            let radix = captures[2]
                .parse::<usize>()
                .map_err(|err| Error::MalformedPackedPayload(format!("radix: {err}")))?;
            let symbol_count = captures[3]
                .parse::<usize>()
                .map_err(|err| Error::MalformedPackedPayload(format!("symbol count: {err}")))?;
            let payload = captures[1].replace("\\\\", "\\").replace("\\'", "'");
            let dictionary = captures
                .get(4)
                .map(|dictionary| dictionary.as_str().split('|').collect())
                .unwrap_or_default();

            Ok(PackedScript {
                payload,
                radix,
                symbol_count,
                dictionary,
            })
        }

        pub fn unpack(&self) -> Result<String, Error> {
            unpack(&self.payload, self.radix, self.symbol_count, &self.dictionary)
        }
    }

}
