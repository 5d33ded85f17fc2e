use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::redirect::Policy;
use reqwest::Client;

const APP_USER_AGENT: &str = concat!("AngelLauncher/", env!("CARGO_PKG_VERSION"));

/// Redirect hops followed before a download is abandoned.
const MAX_REDIRECTS: usize = 10;

/// Shared client for manifests, libraries and the players API.
///
/// Only the connect phase is bounded here; body reads are bounded per chunk
/// by the downloader and per request by callers, so large archives are not
/// cut off by a whole-request deadline.
pub fn build_http_client(connect_timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(connect_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .build()
}
