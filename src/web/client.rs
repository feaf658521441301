//! Core request machinery: session tokens, expiry detection, refresh, retry-on-anomaly
//! (spec §4.2).

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cacheable::{Cacheable, FallbackPolicy};
use crate::collaborators::AccountHandle;
use crate::config::GlobalConfig;
use crate::error::WebError;
use crate::rate_limiter::RateLimiterRegistry;
use crate::web::apikey::ApiKeyResolver;

/// The three primary hosts plus the Web-API host (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Host {
    Community,
    Store,
    Help,
    WebApi,
}

impl Host {
    pub fn as_str(&self) -> &'static str {
        match self {
            Host::Community => "community",
            Host::Store => "store",
            Host::Help => "help",
            Host::WebApi => "webapi",
        }
    }
}

/// Base URLs for each host, injected rather than hardcoded — the actual platform endpoints are
/// an external deployment detail (spec §6 calls for bit-exact *paths*, not a specific origin
/// baked into the library).
#[derive(Debug, Clone)]
pub struct HostUrls {
    pub community: String,
    pub store: String,
    pub help: String,
    pub web_api: String,
    /// A response whose host equals this is always treated as session-expired (spec §4.2).
    pub fallback_login_host: String,
}

impl Default for HostUrls {
    fn default() -> Self {
        Self {
            community: "https://community.platform.example".to_string(),
            store: "https://store.platform.example".to_string(),
            help: "https://help.platform.example".to_string(),
            web_api: "https://api.platform.example".to_string(),
            fallback_login_host: "login.platform.example".to_string(),
        }
    }
}

impl HostUrls {
    fn base_for(&self, host: Host) -> &str {
        match host {
            Host::Community => &self.community,
            Host::Store => &self.store,
            Host::Help => &self.help,
            Host::WebApi => &self.web_api,
        }
    }
}

/// The session form-field name a POST should attach `sessionid` under (spec §4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFormField {
    Lowercase,
    Camel,
    Pascal,
}

impl SessionFormField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionFormField::Lowercase => "sessionid",
            SessionFormField::Camel => "sessionID",
            SessionFormField::Pascal => "SessionID",
        }
    }
}

/// Whether (and how) a request should attach the session cookie as a form field (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    None,
    Attach(SessionFormField),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct HostCookies {
    pub sessionid: Option<String>,
    pub steam_login: Option<String>,
    pub steam_login_secure: Option<String>,
    pub timezone_offset: Option<String>,
}

pub(crate) struct RawResponse {
    pub final_url: reqwest::Url,
    pub status: StatusCode,
    pub bytes: Vec<u8>,
}

/// The session-aware HTTP client (spec §4.2).
pub struct WebClient {
    pub(crate) http: reqwest::Client,
    pub(crate) urls: HostUrls,
    pub(crate) rate_limiter: Arc<RateLimiterRegistry>,
    pub(crate) account: Arc<dyn AccountHandle>,
    pub(crate) connection_timeout: Duration,
    pub(crate) session_validity_window: Duration,
    pub(crate) cookies: RwLock<HashMap<Host, HostCookies>>,
    pub(crate) last_session_check: RwLock<DateTime<Utc>>,
    pub(crate) last_session_refresh: RwLock<DateTime<Utc>>,
    pub(crate) refresh_guard: AsyncMutex<()>,
    pub(crate) inventory_semaphore: Arc<Semaphore>,
    pub(crate) inventory_limiter_delay: Duration,
    pub(crate) max_tries: u32,
    pub(crate) api_key: Cacheable<String, ApiKeyResolver>,
}

impl WebClient {
    /// Construct a new client. Returns `Arc<Self>` because the API-key resolver holds a
    /// non-owning [`Weak`] back-reference to the client (spec §9: "the web client holds a
    /// non-owning handle for callbacks"), the same cyclic-ownership fix the teacher's
    /// `EdgeReceiverClient::new` applies by returning `Arc<Self>` up front.
    pub fn new(
        config: &GlobalConfig,
        urls: HostUrls,
        account: Arc<dyn AccountHandle>,
        rate_limiter: Arc<RateLimiterRegistry>,
        inventory_semaphore: Arc<Semaphore>,
    ) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(false) // cookies are managed explicitly per host (spec §4.2)
            .timeout(config.connection_timeout)
            .build()
            .expect("failed to build reqwest client");

        Arc::new_cyclic(|weak: &Weak<WebClient>| {
            let api_key = Cacheable::new(ApiKeyResolver::new(weak.clone()), None);
            WebClient {
                http,
                urls,
                rate_limiter,
                account,
                connection_timeout: config.connection_timeout,
                session_validity_window: config.session_validity_window(),
                cookies: RwLock::new(HashMap::new()),
                last_session_check: RwLock::new(DateTime::<Utc>::MIN_UTC),
                last_session_refresh: RwLock::new(DateTime::<Utc>::MIN_UTC),
                refresh_guard: AsyncMutex::new(()),
                inventory_semaphore,
                inventory_limiter_delay: config.inventory_limiter_delay,
                max_tries: crate::config::constants::DEFAULT_MAX_TRIES,
                api_key,
            }
        })
    }

    /// "session is expired" predicate (spec §4.2): true once a probe observed a session state
    /// different from the last *valid* observation.
    pub fn session_expired(&self) -> bool {
        *self.last_session_check.read() != *self.last_session_refresh.read()
    }

    fn is_session_expired_url(&self, url: &reqwest::Url) -> bool {
        url.path().starts_with("/login") || url.host_str() == Some(&self.urls.fallback_login_host)
    }

    fn is_own_profile_url(&self, url: &reqwest::Url) -> bool {
        url.path() == format!("/profiles/{}", self.account.account_id())
    }

    fn cookie_header_for(&self, host: Host) -> Option<String> {
        let cookies = self.cookies.read();
        let c = cookies.get(&host)?;
        let mut parts = Vec::new();
        if let Some(v) = &c.sessionid {
            parts.push(format!("sessionid={v}"));
        }
        if let Some(v) = &c.steam_login {
            parts.push(format!("steamLogin={v}"));
        }
        if let Some(v) = &c.steam_login_secure {
            parts.push(format!("steamLoginSecure={v}"));
        }
        if let Some(v) = &c.timezone_offset {
            parts.push(format!("timezoneOffset={v}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    fn sessionid_for(&self, host: Host) -> Option<String> {
        self.cookies.read().get(&host)?.sessionid.clone()
    }

    /// Plant tokens across the three primary hosts after session init or refresh (spec §4.2).
    pub(crate) fn plant_tokens(&self, sessionid: String, steam_login: String, steam_login_secure: String) {
        let mut cookies = self.cookies.write();
        for host in [Host::Community, Host::Store, Host::Help] {
            let entry = cookies.entry(host).or_default();
            entry.sessionid = Some(sessionid.clone());
            entry.steam_login = Some(steam_login.clone());
            entry.steam_login_secure = Some(steam_login_secure.clone());
        }
    }

    /// Refresh protocol (spec §4.2). Exclusive/single-flight via `refresh_guard`.
    pub async fn refresh(&self) -> Result<(), WebError> {
        if !self.account.is_connected_and_logged_on() {
            return Err(WebError::Validation(
                "cannot refresh session: account not connected".into(),
            ));
        }

        let window = chrono::Duration::from_std(self.session_validity_window)
            .unwrap_or_else(|_| chrono::Duration::zero());

        if Utc::now() < *self.last_session_refresh.read() + window {
            return Ok(());
        }

        let _guard = self.refresh_guard.lock().await;

        // Re-check: another caller may have refreshed while we waited for the guard.
        if Utc::now() < *self.last_session_refresh.read() + window {
            return Ok(());
        }

        let tokens = self
            .account
            .refresh_session()
            .await
            .map_err(|e| WebError::RefreshFailed(e.to_string()))?;

        let sessionid = self.sessionid_for(Host::Community).unwrap_or_default();
        self.plant_tokens(sessionid, tokens.steam_login, tokens.steam_login_secure);

        let refreshed_at = Utc::now();
        *self.last_session_check.write() = refreshed_at;
        *self.last_session_refresh.write() = refreshed_at;
        Ok(())
    }

    /// Preemptive validity probe: cheap HEAD to a stable path, cached for
    /// `session_validity_window` (spec §4.2).
    pub async fn preemptive_check(&self) -> Result<(), WebError> {
        let window = chrono::Duration::from_std(self.session_validity_window)
            .unwrap_or_else(|_| chrono::Duration::zero());
        if Utc::now() < *self.last_session_check.read() + window {
            return Ok(());
        }

        let probe = self.send_once(Method::HEAD, Host::Community, "/my/profile", None, SessionMode::None).await;
        let now = Utc::now();
        *self.last_session_check.write() = now;

        match probe {
            Ok(resp) if !self.is_session_expired_url(&resp.final_url) => {
                *self.last_session_refresh.write() = now;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(_) => Ok(()), // a failed probe just leaves session_expired() true; not fatal here
        }
    }

    /// Single request attempt with no retry/refresh handling — used by the probe and as the
    /// inner primitive for [`Self::request`].
    async fn send_once(
        &self,
        method: Method,
        host: Host,
        path: &str,
        form: Option<&[(String, String)]>,
        session_mode: SessionMode,
    ) -> Result<RawResponse, WebError> {
        let _permit = self.rate_limiter.acquire(host.as_str()).await;

        let url = format!("{}{}", self.urls.base_for(host), path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .timeout(self.connection_timeout);

        if let Some(cookie_header) = self.cookie_header_for(host) {
            builder = builder.header(reqwest::header::COOKIE, cookie_header);
        }

        if method == Method::POST {
            let mut fields: Vec<(String, String)> = form.map(|f| f.to_vec()).unwrap_or_default();
            if let SessionMode::Attach(field) = session_mode {
                let sessionid = self.sessionid_for(host).ok_or_else(|| {
                    WebError::Validation("no sessionid cookie to attach to form".into())
                })?;
                fields.push((field.as_str().to_string(), sessionid));
            }
            builder = builder.form(&fields);
        }

        let response = builder.send().await?;
        let final_url = response.url().clone();
        let status = response.status();
        let bytes = response.bytes().await?.to_vec();

        Ok(RawResponse {
            final_url,
            status,
            bytes,
        })
    }

    /// Full request with session-expiry/profile-redirect retry handling (spec §4.2 retry-on-anomaly).
    pub(crate) async fn request(
        &self,
        method: Method,
        host: Host,
        path: &str,
        form: Option<&[(String, String)]>,
        session_mode: SessionMode,
    ) -> Result<RawResponse, WebError> {
        if session_mode != SessionMode::None {
            self.preemptive_check().await?;
        }

        let mut tries_left = self.max_tries;
        loop {
            let response = self
                .send_once(method.clone(), host, path, form, session_mode)
                .await?;

            if self.is_session_expired_url(&response.final_url) {
                if tries_left == 0 {
                    return Err(WebError::RetriesExhausted("session expired"));
                }
                tries_left -= 1;
                debug!(url = %response.final_url, "session expired, refreshing and retrying");
                self.refresh().await?;
                continue;
            }

            if self.is_own_profile_url(&response.final_url) {
                if tries_left == 0 {
                    return Err(WebError::RetriesExhausted("profile redirect anomaly"));
                }
                tries_left -= 1;
                warn!(url = %response.final_url, "profile-redirect anomaly, retrying without refresh");
                continue;
            }

            if response.status.is_client_error() {
                return Err(WebError::ClientError4xx {
                    status: response.status.as_u16(),
                    url: response.final_url.to_string(),
                });
            }

            return Ok(response);
        }
    }

    pub(crate) async fn get_bytes(&self, host: Host, path: &str) -> Result<Vec<u8>, WebError> {
        Ok(self.request(Method::GET, host, path, None, SessionMode::None).await?.bytes)
    }

    pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        host: Host,
        path: &str,
    ) -> Result<T, WebError> {
        let bytes = self.get_bytes(host, path).await?;
        serde_json::from_slice(&bytes).map_err(|e| WebError::Decode(e.to_string()))
    }

    pub(crate) async fn get_html(&self, host: Host, path: &str) -> Result<String, WebError> {
        let bytes = self.get_bytes(host, path).await?;
        String::from_utf8(bytes).map_err(|e| WebError::Decode(e.to_string()))
    }

    pub(crate) async fn post_form(
        &self,
        host: Host,
        path: &str,
        form: &[(String, String)],
        session_mode: SessionMode,
    ) -> Result<Vec<u8>, WebError> {
        Ok(self
            .request(Method::POST, host, path, Some(form), session_mode)
            .await?
            .bytes)
    }

    pub(crate) async fn post_form_json<T: serde::de::DeserializeOwned>(
        &self,
        host: Host,
        path: &str,
        form: &[(String, String)],
        session_mode: SessionMode,
    ) -> Result<T, WebError> {
        let bytes = self.post_form(host, path, form, session_mode).await?;
        serde_json::from_slice(&bytes).map_err(|e| WebError::Decode(e.to_string()))
    }

    /// Resolved API key, wrapped in a [`Cacheable`] (spec §4.2 API-key resolution).
    pub async fn api_key(&self) -> (bool, String) {
        if self.account.is_limited_account() {
            return (true, String::new());
        }
        self.api_key.get(FallbackPolicy::SuccessPreviously).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expired_url_matches_login_path_or_fallback_host() {
        let urls = HostUrls::default();
        let account = Arc::new(crate::collaborators::tests::FakeAccount::default());
        let rl = Arc::new(RateLimiterRegistry::new(4, Duration::from_millis(0)));
        let sem = Arc::new(Semaphore::new(1));
        let config = GlobalConfig::default();
        let client = WebClient::new(&config, urls.clone(), account, rl, sem);

        let login_url = reqwest::Url::parse(&format!("{}/login/home", urls.community)).unwrap();
        assert!(client.is_session_expired_url(&login_url));

        let fallback_url =
            reqwest::Url::parse(&format!("https://{}/", urls.fallback_login_host)).unwrap();
        assert!(client.is_session_expired_url(&fallback_url));

        let ok_url = reqwest::Url::parse(&format!("{}/my/profile", urls.community)).unwrap();
        assert!(!client.is_session_expired_url(&ok_url));
    }

    #[test]
    fn session_expired_predicate_tracks_check_vs_refresh_timestamps() {
        let urls = HostUrls::default();
        let account = Arc::new(crate::collaborators::tests::FakeAccount::default());
        let rl = Arc::new(RateLimiterRegistry::new(4, Duration::from_millis(0)));
        let sem = Arc::new(Semaphore::new(1));
        let config = GlobalConfig::default();
        let client = WebClient::new(&config, urls, account, rl, sem);

        // Never checked: both at MIN_UTC, so not expired by this predicate's definition.
        assert!(!client.session_expired());

        *client.last_session_check.write() = Utc::now();
        assert!(client.session_expired());

        *client.last_session_refresh.write() = *client.last_session_check.read();
        assert!(!client.session_expired());
    }
}
