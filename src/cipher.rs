//! RC4-compatible stream cipher and the base64url "envelope" built on top of it.
//!
//! Decoding and encoding are the same operation: XOR-ing the keystream derived
//! from a key against either the plaintext or the ciphertext recovers the other.

use std::borrow::Cow;

use arc4::Arc4;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::Error;

/// Standard base64 with `-`/`_` in place of `+`/`/`, padded on output and
/// lenient about padding on input.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Data fed into the cipher, either raw bytes or the character codes of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherInput<'a> {
    Bytes(&'a [u8]),
    Text(&'a str),
}

impl<'a> CipherInput<'a> {
    /// Byte value of every element. Characters outside `0..=255` have no byte
    /// value and are rejected.
    pub fn code_units(&self) -> Result<Cow<'a, [u8]>, Error> {
        match *self {
            CipherInput::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            CipherInput::Text(text) if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            CipherInput::Text(text) => text
                .chars()
                .enumerate()
                .map(|(position, character)| {
                    u8::try_from(u32::from(character))
                        .map_err(|_| Error::UnsupportedInputKind { character, position })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Cow::Owned),
        }
    }
}

impl<'a> From<&'a [u8]> for CipherInput<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        CipherInput::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for CipherInput<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        CipherInput::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for CipherInput<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        CipherInput::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for CipherInput<'a> {
    fn from(text: &'a str) -> Self {
        CipherInput::Text(text)
    }
}

impl<'a> From<&'a String> for CipherInput<'a> {
    fn from(text: &'a String) -> Self {
        CipherInput::Text(text)
    }
}

/// Keystream state. Lives for one key and is never shared between callers.
pub struct StreamCipher<'k> {
    rc4: Arc4<'k>,
}

impl<'k> StreamCipher<'k> {
    pub fn new(key: &'k [u8]) -> Result<Self, Error> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        Ok(StreamCipher {
            rc4: Arc4::with_key(key),
        })
    }

    /// XORs the next `data.len()` keystream bytes into a copy of `data`.
    pub fn apply<'a>(&mut self, data: impl Into<CipherInput<'a>>) -> Result<Vec<u8>, Error> {
        let mut buffer = data.into().code_units()?.into_owned();
        self.rc4.encrypt(&mut buffer);
        Ok(buffer)
    }
}

impl std::fmt::Debug for StreamCipher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipher").finish_non_exhaustive()
    }
}

/// Runs `data` through a fresh cipher keyed with `key`.
pub fn transform<'a>(key: &str, data: impl Into<CipherInput<'a>>) -> Result<Vec<u8>, Error> {
    StreamCipher::new(key.as_bytes())?.apply(data)
}

pub fn encode_base64_url(data: impl AsRef<[u8]>) -> String {
    let mut output = String::with_capacity(data.as_ref().len() * 4 / 3 + 4);
    BASE64_URL.encode_string(data, &mut output);
    output
}

pub fn decode_base64_url(encoded: &str) -> Result<Vec<u8>, Error> {
    BASE64_URL
        .decode(encoded.trim())
        .map_err(|err| Error::malformed("base64url payload", err))
}

/// Wraps `data` into an envelope: cipher, then base64url.
pub fn seal<'a>(key: &str, data: impl Into<CipherInput<'a>>) -> Result<String, Error> {
    transform(key, data).map(encode_base64_url)
}

/// Opens an envelope produced by [seal] with the same key.
pub fn open(key: &str, encoded: &str) -> Result<Vec<u8>, Error> {
    transform(key, &decode_base64_url(encoded)?)
}

/// Opens an envelope whose plaintext is a percent-encoded UTF-8 string.
pub fn open_text(key: &str, encoded: &str) -> Result<String, Error> {
    let decoded = open(key, encoded)?;
    let text = String::from_utf8(decoded).map_err(|err| Error::malformed("envelope plaintext", err))?;

    urlencoding::decode(&text)
        .map(Cow::into_owned)
        .map_err(|err| Error::malformed("envelope plaintext", err))
}
