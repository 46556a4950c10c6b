use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Method, RequestBuilder, Response, Url};
use std::sync::Mutex;
use std::time::Duration;

use super::types::{WatcherAuthResponse, WatcherLoginRequest};
use super::{
    AlertFilters, ConnectionHealth, DecisionFilters, DecisionStream, DeleteDecisionResponse,
    HealthError, LapiAlert, LapiApi, LapiDecision, StreamOptions,
};
use crate::error::{DashboardError, Result};
use crate::observability::LAPI_REQUESTS;

const USER_AGENT: &str = concat!("crowdsec-dashboard/", env!("CARGO_PKG_VERSION"));

/// Seconds before expiry at which the watcher token is renewed
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Bouncer API key. Signs read-only requests.
#[derive(Clone)]
struct BouncerKey(String);

impl BouncerKey {
    fn sign(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-Api-Key", &self.0)
    }
}

#[derive(Debug, Clone)]
struct WatcherToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl WatcherToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS)
    }
}

/// Machine credentials plus the cached JWT. Signs alert and mutating requests.
struct WatcherSession {
    machine_id: String,
    password: String,
    token: Mutex<Option<WatcherToken>>,
}

impl WatcherSession {
    fn cached(&self, now: DateTime<Utc>) -> Option<String> {
        let guard = self.token.lock().ok()?;
        guard
            .as_ref()
            .filter(|t| t.is_fresh(now))
            .map(|t| t.token.clone())
    }

    fn store(&self, token: WatcherToken) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token);
        }
    }

    fn sign(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.bearer_auth(token)
    }
}

/// HTTP client for the CrowdSec Local API.
///
/// Read-only endpoints are signed with the bouncer key (`X-Api-Key`).
/// Alert and delete endpoints need a watcher JWT, obtained lazily from
/// `/v1/watchers/login` and renewed shortly before it expires. Concurrent
/// callers may both log in when the token lapses; the last token wins.
pub struct LapiClient {
    http: reqwest::Client,
    base_url: String,
    bouncer: BouncerKey,
    watcher: Option<WatcherSession>,
}

impl std::fmt::Debug for LapiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LapiClient")
            .field("base_url", &self.base_url)
            .field("watcher", &self.watcher.is_some())
            .finish()
    }
}

impl LapiClient {
    pub fn new(url: &str, bouncer_api_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| DashboardError::InvalidLapiConfig(format!("url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DashboardError::InvalidLapiConfig(format!(
                "url '{}' must use http or https",
                url
            )));
        }
        if bouncer_api_key.trim().is_empty() {
            return Err(DashboardError::InvalidLapiConfig(
                "bouncer API key is empty".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            bouncer: BouncerKey(bouncer_api_key.to_string()),
            watcher: None,
        })
    }

    /// Enable watcher-authenticated endpoints
    pub fn with_watcher(mut self, machine_id: &str, password: &str) -> Self {
        self.watcher = Some(WatcherSession {
            machine_id: machine_id.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        });
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Content-Type", "application/json")
    }

    fn bouncer_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.bouncer.sign(self.request(method, path))
    }

    async fn watcher_request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let session = self
            .watcher
            .as_ref()
            .ok_or(DashboardError::WatcherCredentialsMissing)?;
        let token = self.watcher_token(session).await?;
        Ok(session.sign(self.request(method, path), &token))
    }

    async fn watcher_token(&self, session: &WatcherSession) -> Result<String> {
        if let Some(token) = session.cached(Utc::now()) {
            return Ok(token);
        }

        let response = self
            .request(Method::POST, "/v1/watchers/login")
            .json(&WatcherLoginRequest {
                machine_id: &session.machine_id,
                password: &session.password,
            })
            .send()
            .await?;
        record("watchers_login", response.status().as_u16());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DashboardError::WatcherLogin { status, body });
        }

        let auth: WatcherAuthResponse = response.json().await?;
        tracing::debug!(expires_at = %auth.expire, "watcher login succeeded");
        session.store(WatcherToken {
            token: auth.token.clone(),
            expires_at: auth.expire,
        });
        Ok(auth.token)
    }
}

fn record(endpoint: &str, status: u16) {
    LAPI_REQUESTS
        .with_label_values(&[endpoint, &status.to_string()])
        .inc();
}

/// Turn a non-2xx response into `LapiStatus` carrying the body
async fn ensure_success(response: Response, context: String) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DashboardError::LapiStatus {
        context,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LapiApi for LapiClient {
    async fn check_connection_health(&self) -> ConnectionHealth {
        match self.bouncer_request(Method::HEAD, "/v1/decisions").send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                record("decisions_head", status);
                ConnectionHealth::from_status(status)
            }
            Err(e) => {
                tracing::error!(error = %e, url = %self.base_url, "error connecting to LAPI");
                record("decisions_head", 0);
                ConnectionHealth::error(HealthError::SecurityEngineUnreachable)
            }
        }
    }

    async fn get_decisions(&self, filters: &DecisionFilters) -> Result<Vec<LapiDecision>> {
        let response = self
            .bouncer_request(Method::GET, "/v1/decisions")
            .query(filters)
            .send()
            .await?;
        record("decisions", response.status().as_u16());
        let response = ensure_success(response, "failed to fetch decisions".into()).await?;

        // LAPI answers `null` when there is nothing to report
        let decisions: Option<Vec<LapiDecision>> = response.json().await?;
        Ok(decisions.unwrap_or_default())
    }

    async fn get_decision_stream(&self, options: &StreamOptions) -> Result<DecisionStream> {
        let mut query: Vec<(&str, String)> = vec![("startup", options.startup.to_string())];
        if let Some(origins) = options.origins.as_deref().filter(|s| !s.is_empty()) {
            query.push(("origins", origins.to_string()));
        }
        if let Some(scopes) = options.scopes.as_deref().filter(|s| !s.is_empty()) {
            query.push(("scopes", scopes.to_string()));
        }

        let response = self
            .bouncer_request(Method::GET, "/v1/decisions/stream")
            .query(&query)
            .send()
            .await?;
        record("decisions_stream", response.status().as_u16());
        let response = ensure_success(response, "failed to fetch decision stream".into()).await?;

        let stream: Option<DecisionStream> = response.json().await?;
        Ok(stream.unwrap_or_default())
    }

    async fn get_alerts(&self, filters: &AlertFilters) -> Result<Vec<LapiAlert>> {
        let response = self
            .watcher_request(Method::GET, "/v1/alerts")
            .await?
            .query(filters)
            .send()
            .await?;
        record("alerts", response.status().as_u16());
        let response = ensure_success(response, "failed to fetch alerts".into()).await?;

        let alerts: Option<Vec<LapiAlert>> = response.json().await?;
        Ok(alerts.unwrap_or_default())
    }

    async fn delete_decision_by_id(&self, id: i64) -> Result<DeleteDecisionResponse> {
        tracing::info!(decision_id = id, url = %self.base_url, "deleting decision in LAPI");

        let response = self
            .watcher_request(Method::DELETE, &format!("/v1/decisions/{}", id))
            .await?
            .send()
            .await?;
        let status = response.status().as_u16();
        record("decisions_delete", status);

        let response = match ensure_success(response, format!("failed to delete decision {}", id))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(decision_id = id, status, error = %e, "LAPI delete failed");
                return Err(e);
            }
        };

        let result: DeleteDecisionResponse = response.json().await?;
        tracing::info!(decision_id = id, nb_deleted = %result.nb_deleted, "LAPI delete result");

        if result.deleted_count() == 0 {
            return Err(DashboardError::DecisionNotFound(id));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_are_stripped() {
        let client =
            LapiClient::new("http://127.0.0.1:8080///", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            LapiClient::new("not a url", "key", Duration::from_secs(5)),
            Err(DashboardError::InvalidLapiConfig(_))
        ));
        assert!(matches!(
            LapiClient::new("ftp://lapi", "key", Duration::from_secs(5)),
            Err(DashboardError::InvalidLapiConfig(_))
        ));
        assert!(matches!(
            LapiClient::new("http://lapi:8080", "  ", Duration::from_secs(5)),
            Err(DashboardError::InvalidLapiConfig(_))
        ));
    }

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let token = WatcherToken {
            token: "t".into(),
            expires_at: now + ChronoDuration::seconds(59),
        };
        assert!(!token.is_fresh(now));

        let token = WatcherToken {
            token: "t".into(),
            expires_at: now + ChronoDuration::minutes(10),
        };
        assert!(token.is_fresh(now));
    }

    #[tokio::test]
    async fn test_alerts_require_watcher_credentials() {
        let client =
            LapiClient::new("http://127.0.0.1:9", "key", Duration::from_secs(1)).unwrap();
        let err = client.get_alerts(&AlertFilters::default()).await.unwrap_err();
        assert!(matches!(err, DashboardError::WatcherCredentialsMissing));
    }
}
