//! Blocking HTTP client shared by the overlay renderer and the remote WFS source.

use std::time::Duration;

use bytes::Bytes;
use reqwest::blocking::Client;
use tracing::debug;

use crate::application::repos::RepoError;
use crate::infra::error::InfraError;

const USER_AGENT: &str = concat!("kmlmap/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeout: Duration) -> Result<Client, InfraError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| InfraError::http(format!("failed to create HTTP client: {err}")))
}

/// GET `url` and return the body of a successful response.
pub fn fetch(client: &Client, url: &str) -> Result<Bytes, RepoError> {
    debug!(target = "infra::client::fetch", url, "requesting");
    let response = client
        .get(url)
        .send()
        .map_err(|err| RepoError::unavailable(url, format!("request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RepoError::unavailable(url, format!("HTTP {status}")));
    }

    response
        .bytes()
        .map_err(|err| RepoError::unavailable(url, format!("failed to read response: {err}")))
}
