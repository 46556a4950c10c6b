#![allow(dead_code)]

use axum::response::Response;
use chrono::Utc;
use std::sync::Arc;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

use crowdsec_dashboard::AppState;
use crowdsec_dashboard::config::{AuthMode, Settings};
use crowdsec_dashboard::db::{MockRepository, Repository, RepositoryTrait, init_postgres_pool};
use crowdsec_dashboard::domain::{DecisionOrigin, DecisionType};
use crowdsec_dashboard::lapi::{
    AlertDecisionRef, AlertEvent, AlertSource, LapiAlert, LapiApi, LapiDecision, MetaEntry,
    MockLapi,
};
use crowdsec_dashboard::sync::{NoCountryLookup, Reconciler, SyncEngine, SyncOptions};
use crowdsec_dashboard::ws::Broadcaster;

pub const TEST_TOKEN: &str = "test-secret-token-123";

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.http.listen = "127.0.0.1:0".to_string();
    settings.lapi.url = Some("http://127.0.0.1:8080".to_string());
    settings.lapi.bouncer_api_key = Some("bouncer-key".to_string());
    settings
}

pub fn bearer_settings() -> Settings {
    let mut settings = test_settings();
    settings.http.auth.mode = AuthMode::Bearer;
    settings.http.auth.token = Some(TEST_TOKEN.to_string());
    settings
}

/// App wired to the in-memory LAPI and repository
pub struct MockApp {
    pub state: Arc<AppState>,
    pub lapi: Arc<MockLapi>,
    pub repo: Arc<MockRepository>,
    pub engine: Arc<SyncEngine>,
}

impl MockApp {
    pub fn new(settings: Settings) -> Self {
        let lapi = Arc::new(MockLapi::new());
        let repo = Arc::new(MockRepository::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let engine = Arc::new(SyncEngine::new(
            lapi.clone(),
            repo.clone(),
            Reconciler::new(repo.clone(), Arc::new(NoCountryLookup), 500),
            broadcaster.clone(),
            SyncOptions::default(),
        ));
        let lapi_dyn: Arc<dyn LapiApi> = lapi.clone();
        let state = AppState::new(
            settings,
            repo.clone(),
            Some(lapi_dyn),
            Some(engine.clone()),
            broadcaster,
            None,
        );
        Self {
            state,
            lapi,
            repo,
            engine,
        }
    }

    /// No LAPI configured: polling disabled, LAPI endpoints answer 503
    pub fn without_lapi() -> Arc<AppState> {
        let mut settings = test_settings();
        settings.lapi.url = None;
        AppState::new(
            settings,
            Arc::new(MockRepository::new()),
            None,
            None,
            Arc::new(Broadcaster::new()),
            None,
        )
    }

    pub fn router(&self) -> axum::Router {
        crowdsec_dashboard::api::create_test_router(self.state.clone())
    }
}

/// App backed by a throwaway PostgreSQL container
pub struct TestContext {
    pub repo: Arc<dyn RepositoryTrait>,
    pub pool: sqlx::PgPool,
    _container: ContainerAsync<Postgres>,
}

impl TestContext {
    pub async fn new() -> Self {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .expect("Failed to start Postgres container");

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        let connection_string = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let pool = init_postgres_pool(&connection_string, 5)
            .await
            .expect("Failed to init pool");

        let repo: Arc<dyn RepositoryTrait> = Arc::new(Repository::new(pool.clone()));

        Self {
            repo,
            pool,
            _container: container,
        }
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&body).expect("Response should be JSON")
}

// Fixtures

pub fn decision(id: i64, ip: &str) -> LapiDecision {
    LapiDecision {
        id,
        origin: DecisionOrigin::Crowdsec,
        decision_type: DecisionType::Ban,
        scope: "Ip".to_string(),
        value: ip.to_string(),
        duration: "3h59m43.191505609s".to_string(),
        until: None,
        scenario: "crowdsecurity/http-probing".to_string(),
        simulated: false,
    }
}

pub fn meta(pairs: &[(&str, &str)]) -> Vec<MetaEntry> {
    pairs
        .iter()
        .map(|(k, v)| MetaEntry {
            key: k.to_string(),
            value: v.to_string(),
        })
        .collect()
}

pub fn http_alert(id: i64, ip: &str, decision_ids: &[i64], paths: &[&str]) -> LapiAlert {
    LapiAlert {
        id,
        scenario: "crowdsecurity/http-probing".to_string(),
        message: format!("Ip {} performed 'crowdsecurity/http-probing'", ip),
        created_at: Utc::now(),
        source: AlertSource {
            scope: "Ip".to_string(),
            value: ip.to_string(),
            ip: Some(ip.to_string()),
            cn: Some("NL".to_string()),
            as_number: Some("64500".to_string()),
            as_name: Some("EXAMPLE-AS".to_string()),
            ..Default::default()
        },
        events: paths
            .iter()
            .map(|path| AlertEvent {
                timestamp: Some("2026-01-10T08:00:00Z".to_string()),
                meta: meta(&[
                    ("log_type", "http_access-log"),
                    ("http_verb", "GET"),
                    ("http_path", path),
                    ("http_status", "404"),
                    ("source_ip", ip),
                ]),
            })
            .collect(),
        meta: vec![],
        decisions: decision_ids
            .iter()
            .map(|id| AlertDecisionRef {
                id: *id,
                value: ip.to_string(),
            })
            .collect(),
    }
}
