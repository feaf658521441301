//! Developer API-key resolution (spec §4.2).
//!
//! Limited accounts never have a key and are never even asked (checked by the caller in
//! [`crate::web::client::WebClient::api_key`]); everyone else is scraped, and registered
//! automatically if the scrape shows no key yet, mirroring the teacher's tolerant
//! scrape-then-fallback flow in `scrapers/polymarket_gamma.rs`.

use std::sync::Weak;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cacheable::Resolve;
use crate::web::client::{Host, SessionMode, WebClient};

/// Outcome of a single API-key page scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyState {
    Error,
    Timeout,
    Registered,
    NotRegisteredYet,
    AccessDenied,
}

fn classify(body: &str) -> ApiKeyState {
    if body.contains("You have been granted access") && body.contains("Access Denied") {
        return ApiKeyState::AccessDenied;
    }
    if body.contains("Key: ") {
        return ApiKeyState::Registered;
    }
    if body.contains("Register for a new key") || body.contains("register_new_key") {
        return ApiKeyState::NotRegisteredYet;
    }
    ApiKeyState::Error
}

fn extract_key(body: &str) -> Option<String> {
    let marker = "Key: ";
    let start = body.find(marker)? + marker.len();
    let rest = &body[start..];
    let end = rest.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(rest.len());
    let key = &rest[..end];
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// [`Resolve`] implementation backing [`WebClient`]'s `api_key` [`crate::cacheable::Cacheable`].
/// Holds a non-owning [`Weak`] reference so the cache doesn't keep the client alive (spec §9).
pub struct ApiKeyResolver {
    client: Weak<WebClient>,
}

impl ApiKeyResolver {
    pub fn new(client: Weak<WebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Resolve<String> for ApiKeyResolver {
    async fn resolve(&self) -> anyhow::Result<String> {
        let client = self
            .client
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("web client dropped before api key could resolve"))?;

        let body = client.get_html(Host::Community, "/dev/apikey").await?;
        match classify(&body) {
            ApiKeyState::Registered => extract_key(&body)
                .ok_or_else(|| anyhow::anyhow!("api key page claimed Registered but had no key")),
            ApiKeyState::AccessDenied => {
                warn!("api key access denied for this account");
                Ok(String::new())
            }
            ApiKeyState::NotRegisteredYet => {
                debug!("no api key registered yet, registering one");
                register(&client).await
            }
            ApiKeyState::Timeout => Err(anyhow::anyhow!("api key page scrape timed out")),
            ApiKeyState::Error => Err(anyhow::anyhow!("could not parse api key page")),
        }
    }
}

async fn register(client: &WebClient) -> anyhow::Result<String> {
    let form = vec![
        ("domain".to_string(), "localhost".to_string()),
        ("agreeToTerms".to_string(), "agreed".to_string()),
        ("Submit".to_string(), "Register".to_string()),
    ];
    client
        .post_form(
            Host::Community,
            "/dev/registerkey",
            &form,
            SessionMode::Attach(crate::web::client::SessionFormField::Lowercase),
        )
        .await?;

    let body = client.get_html(Host::Community, "/dev/apikey").await?;
    match classify(&body) {
        ApiKeyState::Registered => extract_key(&body)
            .ok_or_else(|| anyhow::anyhow!("registered but still could not parse the new key")),
        other => Err(anyhow::anyhow!("key registration did not take effect: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_registered_page() {
        let body = "blah blah Key: 1A2B3C4D blah";
        assert_eq!(classify(body), ApiKeyState::Registered);
        assert_eq!(extract_key(body), Some("1A2B3C4D".to_string()));
    }

    #[test]
    fn classifies_not_registered_page() {
        let body = "<form>register_new_key</form>";
        assert_eq!(classify(body), ApiKeyState::NotRegisteredYet);
    }

    #[test]
    fn classifies_access_denied_page() {
        let body = "Access Denied. You have been granted access in error.";
        assert_eq!(classify(body), ApiKeyState::AccessDenied);
    }

    #[test]
    fn unrecognized_page_is_an_error() {
        assert_eq!(classify("<html>???</html>"), ApiKeyState::Error);
    }
}
