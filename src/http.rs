use std::ops::Deref;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::header::HeaderName;
use reqwest::redirect::Policy;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoffBuilder;
use reqwest_retry::RetryTransientMiddleware;
use serde::de::DeserializeOwned;
use url::Url;

use crate::Error;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

const MAX_REDIRECTS: u32 = 10;

static DEFAULT_RETRY_CLIENT_NO_REDIRECT: Lazy<ClientWithMiddleware> = Lazy::new(|| {
    let client = reqwest::Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .connect_timeout(Duration::from_secs(20))
        .timeout(Duration::from_secs(30))
        .redirect(Policy::none()) // redirects handled in get_response
        .build()
        .unwrap();

    reqwest_middleware::ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy_and_strategy(
            ExponentialBackoffBuilder::default()
                .retry_bounds(Duration::from_secs(1), Duration::from_secs(10))
                .build_with_max_retries(3),
            retry::strategy::CustomRetryStrategy,
        ))
        .build()
});

pub(crate) async fn get_response(
    url: &str,
    user_agent: Option<&str>,
    referer: Option<&str>,
    extra_headers: Option<&[(HeaderName, &str)]>,
) -> Result<reqwest::Response, Error> {
    // We need to handle redirects ourself, because reqwest changes the Referer
    // header on redirection
    let client = DEFAULT_RETRY_CLIENT_NO_REDIRECT.deref();
    let mut last_url = Url::parse(url).map_err(|err| Error::invalid_url(url, err))?;
    let mut redirect_count = 0u32;

    loop {
        let mut request = client.get(last_url.clone());

        if let Some(user_agent) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        request = request.header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5");

        if let Some(referer) = referer {
            request = request.header(reqwest::header::REFERER, referer);
        }

        if let Some(extra_headers) = extra_headers {
            for (header, value) in extra_headers {
                request = request.header(header, *value);
            }
        }

        log::trace!("GET {}", last_url);

        let response = request.send().await.map_err(|source| Error::Request {
            url: last_url.to_string(),
            source,
        })?;

        let status = response.status();
        let location_header = response.headers().get(reqwest::header::LOCATION);

        match (status.is_redirection(), location_header) {
            (true, Some(redirect_url)) => {
                if redirect_count >= MAX_REDIRECTS {
                    return Err(Error::TooManyRedirects { url: url.to_string() });
                }

                redirect_count += 1;
                let redirect_url = redirect_url
                    .to_str()
                    .map_err(|err| Error::invalid_url(last_url.as_str(), err))?;
                last_url = last_url
                    .join(redirect_url)
                    .map_err(|err| Error::invalid_url(redirect_url, err))?;
            }
            _ if !status.is_success() => {
                return Err(Error::Status {
                    url: last_url.to_string(),
                    status,
                })
            }
            _ => return Ok(response),
        }
    }
}

pub(crate) async fn get_page_text(
    url: &str,
    user_agent: Option<&str>,
    referer: Option<&str>,
    extra_headers: Option<&[(HeaderName, &str)]>,
) -> Result<String, Error> {
    get_response(url, user_agent, referer, extra_headers)
        .await?
        .text()
        .await
        .map_err(|source| Error::Body {
            url: url.to_string(),
            source,
        })
}

pub(crate) async fn get_page_json<T: DeserializeOwned>(
    url: &str,
    user_agent: Option<&str>,
    referer: Option<&str>,
    extra_headers: Option<&[(HeaderName, &str)]>,
) -> Result<T, Error> {
    get_response(url, user_agent, referer, extra_headers)
        .await?
        .json()
        .await
        .map_err(|source| Error::Body {
            url: url.to_string(),
            source,
        })
}

mod retry {
    // Adapted from reqwest_retry::DefaultRetryableStrategy
    pub(crate) mod strategy {
        use reqwest::StatusCode;
        use reqwest_retry::{Retryable, RetryableStrategy};

        pub struct CustomRetryStrategy;

        impl RetryableStrategy for CustomRetryStrategy {
            fn handle(&self, res: &Result<reqwest::Response, reqwest_middleware::Error>) -> Option<Retryable> {
                match res {
                    Ok(success) => on_request_success(success.status()),
                    Err(error) => on_request_failure(error),
                }
            }
        }

        /// Retries 5XX, 408 and 429. Redirects are passed through untouched,
        /// everything else is fatal.
        pub(crate) fn on_request_success(status: StatusCode) -> Option<Retryable> {
            if status.is_server_error()
                || status == StatusCode::REQUEST_TIMEOUT
                || status == StatusCode::TOO_MANY_REQUESTS
            {
                Some(Retryable::Transient)
            } else if status.is_success() || status.is_redirection() {
                None
            } else {
                Some(Retryable::Fatal)
            }
        }

        /// Only network level hiccups are worth another try.
        pub(crate) fn on_request_failure(error: &reqwest_middleware::Error) -> Option<Retryable> {
            match error {
                reqwest_middleware::Error::Middleware(_) => Some(Retryable::Fatal),
                reqwest_middleware::Error::Reqwest(error) => {
                    if error.is_timeout() || error.is_connect() {
                        Some(Retryable::Transient)
                    } else {
                        Some(Retryable::Fatal)
                    }
                }
            }
        }

    }
}
