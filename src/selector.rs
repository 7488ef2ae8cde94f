use std::future::Future;

use thiserror::Error;

use crate::extractors::ResolvedSourceSet;

/// Provider labels in fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedProviderList(Vec<String>);

impl SupportedProviderList {
    /// Duplicate labels (ignoring ASCII case) keep their first position.
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();

        for provider in providers {
            let provider = provider.into();
            if !list.iter().any(|existing| existing.eq_ignore_ascii_case(&provider)) {
                list.push(provider);
            }
        }

        SupportedProviderList(list)
    }

    pub fn position(&self, provider: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|supported| supported.eq_ignore_ascii_case(provider))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Every provider exactly once, starting at `start` and wrapping around.
    pub fn cyclic_from(&self, start: usize) -> impl Iterator<Item = &str> {
        let len = self.0.len();
        (0..len).map(move |offset| self.0[(start + offset) % len].as_str())
    }
}

impl Default for SupportedProviderList {
    fn default() -> Self {
        SupportedProviderList::new(["Vidplay", "Filemoon"])
    }
}

#[derive(Debug)]
pub struct Resolved {
    pub provider: String,
    pub sources: ResolvedSourceSet,
}

#[derive(Debug)]
pub struct FailedAttempt {
    pub provider: String,
    pub error: crate::Error,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("provider \"{requested}\" is not supported, supported: {}", supported.join(", "))]
    UnknownProvider { requested: String, supported: Vec<String> },

    #[error("{provider}: resolution aborted")]
    Fatal {
        provider: String,
        #[source]
        source: crate::Error,
    },

    #[error("no sources found, tried {}", format_attempts(attempts))]
    NoSourcesFound { attempts: Vec<FailedAttempt> },
}

fn format_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{} ({})", attempt.provider, attempt.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tries providers one at a time, starting with the requested one, until one
/// yields streams.
#[derive(Debug, Clone, Default)]
pub struct ProviderSelector {
    providers: SupportedProviderList,
}

impl ProviderSelector {
    pub fn new(providers: SupportedProviderList) -> Self {
        ProviderSelector { providers }
    }

    pub fn providers(&self) -> &SupportedProviderList {
        &self.providers
    }

    pub async fn select<'p, F, Fut>(&'p self, requested: &str, mut attempt: F) -> Result<Resolved, SelectionError>
    where
        F: FnMut(&'p str) -> Fut,
        Fut: Future<Output = Result<ResolvedSourceSet, crate::Error>>,
    {
        let start = self
            .providers
            .position(requested)
            .ok_or_else(|| SelectionError::UnknownProvider {
                requested: requested.to_string(),
                supported: self.providers.iter().map(str::to_string).collect(),
            })?;
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in self.providers.cyclic_from(start) {
            if !attempts.is_empty() {
                log::info!("Trying next provider: {}", provider);
            }

            let error = match attempt(provider).await {
                Ok(sources) if !sources.streams.is_empty() => {
                    log::info!("{}: found {} stream(s)", provider, sources.streams.len());

                    return Ok(Resolved {
                        provider: provider.to_string(),
                        sources,
                    });
                }
                Ok(_) => crate::Error::NoSourcesFound,
                Err(err) if err.is_fatal() => {
                    return Err(SelectionError::Fatal {
                        provider: provider.to_string(),
                        source: err,
                    })
                }
                Err(err) => err,
            };

            log::warn!("{}: {}", provider, error_chain(&error));
            attempts.push(FailedAttempt {
                provider: provider.to_string(),
                error,
            });
        }

        Err(SelectionError::NoSourcesFound { attempts })
    }
}

fn error_chain(error: &crate::Error) -> String {
    use std::error::Error as _;

    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }

    message
}
