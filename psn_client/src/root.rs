use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use dotenv::dotenv;
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, COOKIE, LOCATION};
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

const AUTH_BASE: &str = "https://ca.account.sony.com/api/authz/v3/oauth";
const PROFILE_BASE: &str = "https://us-prof.np.community.playstation.net/userProfile/v1";
const TROPHY_BASE: &str = "https://m.np.playstation.com/api/trophy/v1";
const GAME_LIST_BASE: &str = "https://m.np.playstation.com/api/gamelist/v2";
const GRAPHQL_BASE: &str = "https://web.np.playstation.com/api/graphql/v1";

// Mobile-app OAuth client. The token endpoint authenticates the client itself
// with these fixed basic-auth credentials; the user is carried by the code or
// refresh token in the form body.
const MOBILE_CLIENT_ID: &str = "09515159-7237-4370-9b40-3806e67c0891";
const MOBILE_CLIENT_BASIC: &str =
    "Basic MDk1MTUxNTktNzIzNy00MzcwLTliNDAtMzgwNmU2N2MwODkxOnVjUGprYTV0bnRCMktxc1A=";
const MOBILE_REDIRECT_URI: &str = "com.scee.psxandroid.scecompcall://redirect";
const MOBILE_SCOPE: &str = "psn:mobile.v2.core psn:clientapp";

#[derive(Clone, Debug)]
pub struct PsnConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub rps: u32,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub purchased_page_size: u32,
    pub purchased_page_delay_ms: u64,
    pub trophy_title_limit: u32,
    pub played_categories: String,
    pub played_limit: u32,
    pub extra_headers: HashMap<String, String>,
}

impl Default for PsnConfig {
    fn default() -> Self {
        dotenv().ok();
        let rps = std::env::var("PSN_RPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let retry_attempts = std::env::var("PSN_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let retry_base_delay_ms = std::env::var("PSN_RETRY_BASE_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);
        let purchased_page_size = std::env::var("PSN_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);
        let purchased_page_delay_ms = std::env::var("PSN_PAGE_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);
        let trophy_title_limit = std::env::var("PSN_TROPHY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(800);
        let played_categories = std::env::var("PSN_PLAYED_CATEGORIES")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "ps4_game,ps5_native_game".to_string());
        let played_limit = std::env::var("PSN_PLAYED_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);
        let user_agent = std::env::var("PSN_UA").unwrap_or_else(|_| {
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0 Safari/537.36".to_string()
        });
        let accept_language =
            std::env::var("PSN_ACCEPT_LANGUAGE").unwrap_or_else(|_| "en-US".to_string());

        Self {
            user_agent,
            accept_language,
            rps,
            retry_attempts,
            retry_base_delay_ms,
            purchased_page_size,
            purchased_page_delay_ms,
            trophy_title_limit,
            played_categories,
            played_limit,
            extra_headers: HashMap::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PsnError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("auth: {0}")]
    Auth(String),
    #[error("other: {0}")]
    Other(String),
}

/// Auth token pair as persisted in the local config file. Field names match the
/// on-disk camelCase format so older config files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<i64>,
    /// Epoch milliseconds at which this pair was fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<i64>,
}

// Wire shape of the token endpoint response (snake_case OAuth fields).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token_expires_in: Option<i64>,
}

impl Tokens {
    fn from_response(resp: TokenResponse) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_in: resp.expires_in,
            refresh_token_expires_in: resp.refresh_token_expires_in,
            last_fetched: Some(Utc::now().timestamp_millis()),
        }
    }

    /// Epoch ms at which the access token lapses; 0 when the pair carries no
    /// fetch timestamp or lifetime, so incomplete pairs always read as expired.
    pub fn access_expires_at(&self) -> i64 {
        match (self.last_fetched, self.expires_in) {
            (Some(fetched), Some(ttl)) => fetched + ttl * 1000,
            _ => 0,
        }
    }

    pub fn refresh_expires_at(&self) -> i64 {
        match (self.last_fetched, self.refresh_token_expires_in) {
            (Some(fetched), Some(ttl)) => fetched + ttl * 1000,
            _ => 0,
        }
    }

    pub fn is_access_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.access_expires_at()
    }

    pub fn is_refresh_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.refresh_expires_at()
    }

    pub fn is_access_expired(&self) -> bool {
        self.is_access_expired_at(Utc::now().timestamp_millis())
    }

    pub fn is_refresh_expired(&self) -> bool {
        self.is_refresh_expired_at(Utc::now().timestamp_millis())
    }
}

/// Pull the `code` query parameter out of an OAuth redirect Location header.
pub fn access_code_from_location(location: &str) -> Option<String> {
    location
        .split(|c| c == '?' || c == '&')
        .find_map(|part| part.strip_prefix("code="))
        .filter(|code| !code.is_empty())
        .map(|code| code.to_string())
}

fn persisted_hash_for(op: &str) -> String {
    // Allow per-operation overrides so a hash rotation upstream does not need
    // a rebuild: PSN_PERSISTED_HASH_getPurchasedGameList=<sha256>.
    if let Ok(v) = std::env::var(format!("PSN_PERSISTED_HASH_{op}")) {
        let v = v.trim().to_string();
        if !v.is_empty() {
            return v;
        }
    }
    static_hash_fallback(op).to_string()
}

fn static_hash_fallback(op: &str) -> &'static str {
    match op {
        "getPurchasedGameList" => {
            "2c045408b0a4d0264bb5a3edfed4efd49fb4749cf8d216be9043768adff905e2"
        }
        _ => "",
    }
}

#[derive(Clone)]
pub struct PsnClient {
    http: Client,
    // Separate client with redirects disabled: the authorize endpoint answers
    // with a 302 to an app-scheme URI and the code lives in that Location.
    auth_http: Client,
    cfg: Arc<PsnConfig>,
    limiter: Arc<RateLimiter<String, DashMapStateStore<String>, DefaultClock>>,
}

impl PsnClient {
    pub fn new(cfg: PsnConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&cfg.accept_language)
                .unwrap_or_else(|_| HeaderValue::from_static("en-US")),
        );
        headers.insert(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_str(&cfg.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("Mozilla/5.0")),
        );
        for (k, v) in &cfg.extra_headers {
            let name = HeaderName::from_bytes(k.as_bytes()).expect("valid header name");
            let val = HeaderValue::from_str(v).expect("valid header value");
            headers.insert(name, val);
        }

        let http = Client::builder()
            .default_headers(headers.clone())
            .gzip(true)
            .brotli(true)
            .pool_idle_timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(20)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");

        let auth_http = Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .build()
            .expect("failed to build auth client");

        let limiter = RateLimiter::keyed(Quota::per_second(
            std::num::NonZeroU32::new(cfg.rps.max(1)).unwrap(),
        ));

        Self {
            http,
            auth_http,
            cfg: Arc::new(cfg),
            limiter: Arc::new(limiter),
        }
    }

    pub fn config(&self) -> &PsnConfig {
        &self.cfg
    }

    fn limiter_key(url: &str) -> String {
        reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url.to_string())
    }

    /// Authenticated GET with per-host rate limiting and a bounded retry loop
    /// on 429/5xx/network errors.
    async fn get_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<Value, PsnError> {
        let key = Self::limiter_key(url);
        let mut attempt: u32 = 0;
        loop {
            self.limiter.until_key_ready(&key).await;

            let mut req = self.http.get(url);
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(token) = bearer {
                req = req.bearer_auth(token);
            }

            let last_try = attempt + 1 >= self.cfg.retry_attempts.max(1);
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let bytes = resp.bytes().await?;
                    if status.is_success() {
                        return Ok(serde_json::from_slice(&bytes)?);
                    }
                    let body = String::from_utf8_lossy(&bytes).into_owned();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || last_try {
                        return Err(PsnError::Http {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    warn!(url = %url, status = %status, attempt, "retryable http failure");
                }
                Err(err) => {
                    if last_try {
                        return Err(err.into());
                    }
                    warn!(url = %url, error = %err, attempt, "network error, retrying");
                }
            }

            let delay = self
                .cfg
                .retry_base_delay_ms
                .saturating_mul(1u64 << attempt.min(6));
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    /// Exchange an NPSSO cookie for a one-shot authorization code.
    pub async fn exchange_npsso_for_access_code(&self, npsso: &str) -> Result<String, PsnError> {
        let url = format!("{AUTH_BASE}/authorize");
        let query = [
            ("access_type", "offline"),
            ("client_id", MOBILE_CLIENT_ID),
            ("redirect_uri", MOBILE_REDIRECT_URI),
            ("response_type", "code"),
            ("scope", MOBILE_SCOPE),
        ];
        let resp = self
            .auth_http
            .get(&url)
            .query(&query)
            .header(COOKIE, format!("npsso={npsso}"))
            .send()
            .await?;

        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        debug!(status = %resp.status(), "authorize redirect received");

        access_code_from_location(location).ok_or_else(|| {
            PsnError::Auth(
                "authorize did not redirect with an access code; the NPSSO is likely stale".into(),
            )
        })
    }

    pub async fn exchange_access_code_for_tokens(&self, code: &str) -> Result<Tokens, PsnError> {
        let params = [
            ("code", code),
            ("redirect_uri", MOBILE_REDIRECT_URI),
            ("grant_type", "authorization_code"),
            ("token_format", "jwt"),
        ];
        self.token_request(&params).await
    }

    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Tokens, PsnError> {
        let params = [
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", MOBILE_SCOPE),
            ("token_format", "jwt"),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<Tokens, PsnError> {
        let url = format!("{AUTH_BASE}/token");
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, MOBILE_CLIENT_BASIC)
            .form(params)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(PsnError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let parsed: TokenResponse = serde_json::from_slice(&bytes)?;
        info!("token exchange succeeded");
        Ok(Tokens::from_response(parsed))
    }

    /// Refresh an expired access token. Returns `None` when the current pair is
    /// still live; errors with `Auth` when re-login is the only way forward.
    pub async fn refresh_if_expired(&self, tokens: &Tokens) -> Result<Option<Tokens>, PsnError> {
        if !tokens.is_access_expired() {
            return Ok(None);
        }
        info!("access token expired, attempting refresh");
        let refresh = tokens
            .refresh_token
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                PsnError::Auth("no refresh token stored; log in again with a fresh NPSSO".into())
            })?;
        if tokens.is_refresh_expired() {
            return Err(PsnError::Auth(
                "refresh token expired; log in again with a fresh NPSSO".into(),
            ));
        }
        let refreshed = self.exchange_refresh_token(refresh).await?;
        Ok(Some(refreshed))
    }

    /// Public profile for an online id; callers read `profile.accountId`.
    pub async fn profile(&self, tokens: &Tokens, online_id: &str) -> Result<Value, PsnError> {
        let url = format!("{PROFILE_BASE}/users/{online_id}/profile2");
        self.get_json(
            &url,
            Some(&tokens.access_token),
            &[("fields", "accountId,onlineId,currentOnlineId".to_string())],
        )
        .await
    }

    /// One page of the purchased-games GraphQL persisted query. Entitlements
    /// are scoped to the authenticated account; `start` is a running offset.
    pub async fn purchased_page(
        &self,
        tokens: &Tokens,
        start: u32,
        size: u32,
    ) -> Result<Value, PsnError> {
        let vars = serde_json::json!({
            "isActive": true,
            "platform": ["ps4", "ps5"],
            "size": size,
            "start": start,
            "sortBy": "productName",
            "sortDirection": "asc",
            "subscriptionService": "NONE"
        });
        self.op_get("getPurchasedGameList", &vars, &tokens.access_token)
            .await
    }

    /// Trophy-title list for an account (single capped fetch).
    pub async fn user_titles(&self, tokens: &Tokens, account_id: &str) -> Result<Value, PsnError> {
        let url = format!("{TROPHY_BASE}/users/{account_id}/trophyTitles");
        self.get_json(
            &url,
            Some(&tokens.access_token),
            &[("limit", self.cfg.trophy_title_limit.to_string())],
        )
        .await
    }

    /// Play-history list for an account. The response shape varies (bare array
    /// or an object exposing `titles`/`items`); callers normalize it.
    pub async fn played_games(&self, tokens: &Tokens, account_id: &str) -> Result<Value, PsnError> {
        let url = format!("{GAME_LIST_BASE}/users/{account_id}/titles");
        self.get_json(
            &url,
            Some(&tokens.access_token),
            &[
                ("categories", self.cfg.played_categories.clone()),
                ("limit", self.cfg.played_limit.to_string()),
                ("offset", "0".to_string()),
            ],
        )
        .await
    }

    /// Call a GraphQL persisted operation by name with variables and known
    /// sha256 hash, mirroring the web store's GET encoding.
    async fn op_get(
        &self,
        operation_name: &str,
        variables: &Value,
        bearer: &str,
    ) -> Result<Value, PsnError> {
        let sha = persisted_hash_for(operation_name);
        if sha.is_empty() {
            return Err(PsnError::Other(format!(
                "no persisted-query hash known for {operation_name}"
            )));
        }
        let vars_encoded = urlencoding::encode(&variables.to_string()).into_owned();
        let extensions =
            format!("{{\"persistedQuery\":{{\"version\":1,\"sha256Hash\":\"{sha}\"}}}}");
        let url = format!(
            "{GRAPHQL_BASE}/op?operationName={}&variables={}&extensions={}",
            operation_name,
            vars_encoded,
            urlencoding::encode(&extensions)
        );
        self.get_json(&url, Some(bearer), &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(fetched: Option<i64>, ttl: Option<i64>, refresh_ttl: Option<i64>) -> Tokens {
        Tokens {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_in: ttl,
            refresh_token_expires_in: refresh_ttl,
            last_fetched: fetched,
        }
    }

    #[test]
    fn access_expiry_is_fetch_time_plus_ttl() {
        let t = tokens(Some(1_000_000), Some(3600), Some(86_400));
        assert_eq!(t.access_expires_at(), 1_000_000 + 3600 * 1000);
        assert!(!t.is_access_expired_at(1_000_000));
        assert!(t.is_access_expired_at(1_000_000 + 3600 * 1000));
    }

    #[test]
    fn incomplete_token_pair_reads_as_expired() {
        assert!(tokens(None, Some(3600), None).is_access_expired_at(0));
        assert!(tokens(Some(1_000), None, None).is_access_expired_at(0));
        assert!(tokens(Some(1_000), Some(60), None).is_refresh_expired_at(0));
    }

    #[test]
    fn access_code_parsed_from_redirect_location() {
        let loc = "com.scee.psxandroid.scecompcall://redirect?code=v3.AbCdEf&cid=0001";
        assert_eq!(
            access_code_from_location(loc).as_deref(),
            Some("v3.AbCdEf")
        );
        assert_eq!(access_code_from_location("https://example.com/?error=login_required"), None);
        assert_eq!(access_code_from_location(""), None);
    }

    #[test]
    fn tokens_persist_in_camel_case() {
        let t = tokens(Some(5), Some(10), Some(20));
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["accessToken"], "at");
        assert_eq!(json["refreshTokenExpiresIn"], 20);
        let back: Tokens = serde_json::from_value(json).unwrap();
        assert_eq!(back.last_fetched, Some(5));
    }
}
