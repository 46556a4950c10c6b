//! LAPI client against a stub HTTP server

use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crowdsec_dashboard::error::DashboardError;
use crowdsec_dashboard::lapi::{
    AlertFilters, DecisionFilters, HealthError, HealthStatus, LapiApi, LapiClient, StreamOptions,
};

const BOUNCER_KEY: &str = "bouncer-key";

fn bouncer_client(server: &MockServer) -> LapiClient {
    LapiClient::new(&server.uri(), BOUNCER_KEY, Duration::from_secs(5)).unwrap()
}

fn watcher_client(server: &MockServer) -> LapiClient {
    bouncer_client(server).with_watcher("dashboard", "machine-secret")
}

fn decision_json(id: i64, ip: &str) -> serde_json::Value {
    json!({
        "id": id,
        "origin": "crowdsec",
        "type": "ban",
        "scope": "Ip",
        "value": ip,
        "duration": "3h59m43.191505609s",
        "scenario": "crowdsecurity/ssh-bf",
        "simulated": false
    })
}

async fn mount_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/watchers/login"))
        .and(body_json(json!({
            "machine_id": "dashboard",
            "password": "machine-secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "expire": "2099-01-01T00:00:00Z",
            "token": "jwt-token"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_stream_is_signed_with_bouncer_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/decisions/stream"))
        .and(header("X-Api-Key", BOUNCER_KEY))
        .and(query_param("startup", "true"))
        .and(query_param("origins", "crowdsec,cscli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "new": [decision_json(1, "192.0.2.10"), decision_json(2, "192.0.2.11")],
            "deleted": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stream = bouncer_client(&server)
        .get_decision_stream(&StreamOptions {
            startup: true,
            origins: Some("crowdsec,cscli".into()),
            scopes: None,
        })
        .await
        .unwrap();

    assert_eq!(stream.new.len(), 2);
    assert_eq!(stream.new[0].value, "192.0.2.10");
    assert!(stream.deleted.is_empty());
}

#[tokio::test]
async fn test_null_stream_body_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/decisions/stream"))
        .and(query_param("startup", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let stream = bouncer_client(&server)
        .get_decision_stream(&StreamOptions::default())
        .await
        .unwrap();
    assert!(stream.new.is_empty());
    assert!(stream.deleted.is_empty());
}

#[tokio::test]
async fn test_get_decisions_passes_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/decisions"))
        .and(header("X-Api-Key", BOUNCER_KEY))
        .and(query_param("ip", "192.0.2.10"))
        .and(query_param("type", "ban"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([decision_json(
            7,
            "192.0.2.10"
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/decisions"))
        .and(query_param("ip", "203.0.113.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let client = bouncer_client(&server);
    let decisions = client
        .get_decisions(&DecisionFilters {
            ip: Some("192.0.2.10".into()),
            decision_type: Some("ban".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].id, 7);

    let none = client
        .get_decisions(&DecisionFilters {
            ip: Some("203.0.113.1".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_alerts_log_in_once_and_use_bearer_token() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/alerts"))
        .and(header("Authorization", "Bearer jwt-token"))
        .and(query_param("ip", "192.0.2.10"))
        .and(query_param("has_active_decision", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 100,
            "scenario": "crowdsecurity/ssh-bf",
            "message": "Ip 192.0.2.10 performed 'crowdsecurity/ssh-bf'",
            "created_at": "2026-01-10T08:00:00Z",
            "source": {"scope": "Ip", "value": "192.0.2.10", "cn": "FR"},
            "events": [{"timestamp": "2026-01-10T08:00:00Z", "meta": [
                {"key": "log_type", "value": "ssh_auth"},
                {"key": "target_user", "value": "root"}
            ]}],
            "meta": null,
            "decisions": [{"id": 1, "value": "192.0.2.10"}]
        }])))
        .expect(2)
        .mount(&server)
        .await;

    let client = watcher_client(&server);
    let filters = AlertFilters {
        ip: Some("192.0.2.10".into()),
        has_active_decision: Some(true),
        ..Default::default()
    };

    let alerts = client.get_alerts(&filters).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].source.cn.as_deref(), Some("FR"));
    assert_eq!(alerts[0].decisions[0].id, 1);
    assert!(alerts[0].meta.is_empty());

    // cached token, no second login
    client.get_alerts(&filters).await.unwrap();
}

#[tokio::test]
async fn test_token_near_expiry_triggers_new_login() {
    let server = MockServer::start().await;
    // inside the refresh margin, so the cached token is never reused
    let expire = (Utc::now() + chrono::Duration::seconds(30)).to_rfc3339();
    Mock::given(method("POST"))
        .and(path("/v1/watchers/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "expire": expire,
            "token": "short-lived-token"
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/alerts"))
        .and(header("Authorization", "Bearer short-lived-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = watcher_client(&server);
    let filters = AlertFilters::default();
    assert!(client.get_alerts(&filters).await.unwrap().is_empty());
    assert!(client.get_alerts(&filters).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_login_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/watchers/login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = watcher_client(&server)
        .get_alerts(&AlertFilters::default())
        .await
        .unwrap_err();
    match err {
        DashboardError::WatcherLogin { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "invalid credentials");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_delete_decision() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("DELETE"))
        .and(path("/v1/decisions/42"))
        .and(header("Authorization", "Bearer jwt-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nbDeleted": "1"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/decisions/43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nbDeleted": "0"})))
        .mount(&server)
        .await;

    let client = watcher_client(&server);
    let result = client.delete_decision_by_id(42).await.unwrap();
    assert_eq!(result.deleted_count(), 1);

    let err = client.delete_decision_by_id(43).await.unwrap_err();
    assert!(matches!(err, DashboardError::DecisionNotFound(43)));
    assert_eq!(
        err.to_string(),
        "decision 43 was not found in LAPI (nbDeleted=0)"
    );
}

#[tokio::test]
async fn test_delete_without_watcher_is_rejected() {
    let server = MockServer::start().await;

    let err = bouncer_client(&server)
        .delete_decision_by_id(1)
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::WatcherCredentialsMissing));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_non_success_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/decisions/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database is locked"))
        .mount(&server)
        .await;

    let err = bouncer_client(&server)
        .get_decision_stream(&StreamOptions::default())
        .await
        .unwrap_err();
    match err {
        DashboardError::LapiStatus {
            context,
            status,
            body,
        } => {
            assert_eq!(context, "failed to fetch decision stream");
            assert_eq!(status, 500);
            assert_eq!(body, "database is locked");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_health_classification() {
    for (status, expected) in [
        (200, None),
        (403, Some(HealthError::InvalidApiToken)),
        (500, Some(HealthError::SecurityEngineServerError)),
        (418, Some(HealthError::UnexpectedStatus)),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v1/decisions"))
            .and(header("X-Api-Key", BOUNCER_KEY))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let health = bouncer_client(&server).check_connection_health().await;
        assert_eq!(health.error, expected, "status {status}");
        let expected_status = if expected.is_none() {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        };
        assert_eq!(health.status, expected_status);
    }
}

#[tokio::test]
async fn test_health_unreachable() {
    // nothing listens on the discard port
    let client =
        LapiClient::new("http://127.0.0.1:9", BOUNCER_KEY, Duration::from_secs(1)).unwrap();
    let health = client.check_connection_health().await;
    assert_eq!(health.status, HealthStatus::Error);
    assert_eq!(health.error, Some(HealthError::SecurityEngineUnreachable));
}
