//! Repository and sync engine against a real PostgreSQL

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use common::{TestContext, decision, http_alert};
use crowdsec_dashboard::db::RepositoryTrait;
use crowdsec_dashboard::domain::{
    AlertEntryType, DecisionOrigin, DecisionQuery, DecisionType, DecisionUpsert, HostUpsert,
    StoredAlert,
};
use crowdsec_dashboard::lapi::MockLapi;
use crowdsec_dashboard::sync::{NoCountryLookup, Reconciler, SyncEngine, SyncOptions};
use crowdsec_dashboard::ws::Broadcaster;

fn host(ip: &str) -> HostUpsert {
    HostUpsert {
        ip: ip.to_string(),
        scope: "Ip".to_string(),
        ..Default::default()
    }
}

fn upsert(id: i64, ip: &str, alert_ids: Vec<i64>) -> DecisionUpsert {
    DecisionUpsert {
        id,
        host_ip: ip.to_string(),
        decision_type: DecisionType::Ban,
        origin: DecisionOrigin::Crowdsec,
        scenario: "crowdsecurity/ssh-bf".to_string(),
        duration: "4h".to_string(),
        expires_at: Utc::now() + Duration::hours(4),
        alert_ids,
    }
}

fn stored_alert(id: i64, ip: &str, entries: &[&str]) -> StoredAlert {
    StoredAlert {
        id,
        scenario: "crowdsecurity/ssh-bf".to_string(),
        message: format!("alert {}", id),
        created_at: Utc::now() - Duration::minutes(10) + Duration::seconds(id),
        host_ip: ip.to_string(),
        entries: entries.iter().map(|e| e.to_string()).collect(),
        entry_type: AlertEntryType::Usernames,
        events_json: "[]".to_string(),
    }
}

#[tokio::test]
async fn test_host_upsert_keeps_enrichment() {
    let ctx = TestContext::new().await;

    ctx.repo
        .upsert_hosts(&[HostUpsert {
            country: Some("FR".into()),
            as_number: Some("12322".into()),
            ..host("198.51.100.7")
        }])
        .await
        .unwrap();
    let first = ctx.repo.get_host("198.51.100.7").await.unwrap().unwrap();

    ctx.repo.upsert_hosts(&[host("198.51.100.7")]).await.unwrap();
    let second = ctx.repo.get_host("198.51.100.7").await.unwrap().unwrap();

    assert_eq!(second.country.as_deref(), Some("FR"));
    assert_eq!(second.as_number.as_deref(), Some("12322"));
    assert_eq!(second.first_seen, first.first_seen);
    assert!(second.last_seen >= first.last_seen);

    ctx.repo
        .upsert_hosts(&[HostUpsert {
            country: Some("DE".into()),
            ..host("198.51.100.7")
        }])
        .await
        .unwrap();
    let third = ctx.repo.get_host("198.51.100.7").await.unwrap().unwrap();
    assert_eq!(third.country.as_deref(), Some("DE"));
}

#[tokio::test]
async fn test_insert_missing_hosts_leaves_existing_rows() {
    let ctx = TestContext::new().await;

    ctx.repo
        .upsert_hosts(&[HostUpsert {
            country: Some("NL".into()),
            ..host("192.0.2.10")
        }])
        .await
        .unwrap();
    let before = ctx.repo.get_host("192.0.2.10").await.unwrap().unwrap();

    ctx.repo
        .insert_missing_hosts(&[host("192.0.2.10"), host("192.0.2.11")])
        .await
        .unwrap();

    let after = ctx.repo.get_host("192.0.2.10").await.unwrap().unwrap();
    assert_eq!(after.country.as_deref(), Some("NL"));
    assert_eq!(after.last_seen, before.last_seen);
    assert!(ctx.repo.get_host("192.0.2.11").await.unwrap().is_some());
}

#[tokio::test]
async fn test_alerts_are_insert_only() {
    let ctx = TestContext::new().await;
    ctx.repo.upsert_hosts(&[host("192.0.2.10")]).await.unwrap();

    ctx.repo
        .insert_alerts(&[stored_alert(100, "192.0.2.10", &["root"])])
        .await
        .unwrap();
    ctx.repo
        .insert_alerts(&[
            stored_alert(100, "192.0.2.10", &["admin"]),
            stored_alert(101, "192.0.2.10", &["ubuntu"]),
        ])
        .await
        .unwrap();
    ctx.repo
        .upsert_active_decisions(&[upsert(1, "192.0.2.10", vec![100, 101])])
        .await
        .unwrap();

    let alerts = ctx.repo.get_decision_alerts(1).await.unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].id, 100);
    assert_eq!(alerts[0].entries, vec!["root".to_string()]);
    assert_eq!(alerts[0].entry_type, AlertEntryType::Usernames);
    assert_eq!(alerts[1].id, 101);
}

#[tokio::test]
async fn test_decision_lifecycle() {
    let ctx = TestContext::new().await;
    ctx.repo.upsert_hosts(&[host("192.0.2.10")]).await.unwrap();

    ctx.repo
        .upsert_active_decisions(&[upsert(1, "192.0.2.10", vec![])])
        .await
        .unwrap();
    let stored = ctx.repo.get_decision(1).await.unwrap().unwrap();
    assert!(stored.active);
    assert_eq!(stored.decision_type, DecisionType::Ban);

    let past = Utc::now() - Duration::minutes(1);
    ctx.repo
        .upsert_inactive_decisions(&[DecisionUpsert {
            expires_at: past,
            ..upsert(1, "192.0.2.10", vec![])
        }])
        .await
        .unwrap();
    let stored = ctx.repo.get_decision(1).await.unwrap().unwrap();
    assert!(!stored.active);
    assert!(stored.expires_at.unwrap() <= Utc::now());

    // re-activation keeps the original creation time
    ctx.repo
        .upsert_active_decisions(&[upsert(1, "192.0.2.10", vec![])])
        .await
        .unwrap();
    let reactivated = ctx.repo.get_decision(1).await.unwrap().unwrap();
    assert!(reactivated.active);
    assert_eq!(reactivated.created_at, stored.created_at);

    assert!(ctx.repo.set_decision_inactive(1).await.unwrap());
    assert!(!ctx.repo.set_decision_inactive(999).await.unwrap());
}

#[tokio::test]
async fn test_deactivate_decisions_except() {
    let ctx = TestContext::new().await;
    ctx.repo
        .upsert_hosts(&[host("192.0.2.10"), host("192.0.2.11")])
        .await
        .unwrap();
    ctx.repo
        .upsert_active_decisions(&[
            upsert(1, "192.0.2.10", vec![]),
            upsert(2, "192.0.2.10", vec![]),
            upsert(3, "192.0.2.11", vec![]),
        ])
        .await
        .unwrap();

    let count = ctx.repo.deactivate_decisions_except(&[2]).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(ctx.repo.count_active_decisions().await.unwrap(), 1);
    assert_eq!(ctx.repo.count_decisions().await.unwrap(), 3);

    // an empty list deactivates everything
    let count = ctx.repo.deactivate_decisions_except(&[]).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_prune_oldest_inactive_and_orphan_alerts() {
    let ctx = TestContext::new().await;
    ctx.repo.upsert_hosts(&[host("192.0.2.10")]).await.unwrap();
    ctx.repo
        .insert_alerts(&[
            stored_alert(100, "192.0.2.10", &["root"]),
            stored_alert(101, "192.0.2.10", &["admin"]),
        ])
        .await
        .unwrap();
    ctx.repo
        .upsert_inactive_decisions(&[upsert(1, "192.0.2.10", vec![])])
        .await
        .unwrap();
    ctx.repo
        .upsert_active_decisions(&[
            upsert(2, "192.0.2.10", vec![100]),
            upsert(3, "192.0.2.10", vec![101]),
        ])
        .await
        .unwrap();
    ctx.repo.set_decision_inactive(2).await.unwrap();

    let oldest = ctx.repo.oldest_inactive_decisions(10).await.unwrap();
    assert_eq!(
        oldest,
        vec![(1, "192.0.2.10".to_string()), (2, "192.0.2.10".to_string())]
    );

    let deleted = ctx.repo.delete_decisions(&[1, 2]).await.unwrap();
    assert_eq!(deleted, 2);
    let orphans = ctx.repo.delete_orphan_alerts().await.unwrap();
    assert_eq!(orphans, 1);

    assert!(ctx.repo.get_decision(3).await.unwrap().is_some());
    assert_eq!(ctx.repo.get_decision_alerts(3).await.unwrap().len(), 1);

    ctx.repo.refresh_host_total_bans("192.0.2.10").await.unwrap();
    let host = ctx.repo.get_host("192.0.2.10").await.unwrap().unwrap();
    assert_eq!(host.total_bans, 1);
}

#[tokio::test]
async fn test_list_decisions_and_hosts() {
    let ctx = TestContext::new().await;
    ctx.repo
        .upsert_hosts(&[
            HostUpsert {
                country: Some("NL".into()),
                ..host("192.0.2.10")
            },
            host("192.0.2.11"),
        ])
        .await
        .unwrap();
    ctx.repo
        .insert_alerts(&[stored_alert(100, "192.0.2.10", &["root", "admin"])])
        .await
        .unwrap();
    ctx.repo
        .upsert_active_decisions(&[
            upsert(1, "192.0.2.10", vec![100]),
            DecisionUpsert {
                decision_type: DecisionType::Captcha,
                origin: DecisionOrigin::Cscli,
                ..upsert(2, "192.0.2.11", vec![])
            },
        ])
        .await
        .unwrap();
    ctx.repo
        .upsert_inactive_decisions(&[upsert(3, "192.0.2.10", vec![])])
        .await
        .unwrap();
    for ip in ["192.0.2.10", "192.0.2.11"] {
        ctx.repo.refresh_host_total_bans(ip).await.unwrap();
    }

    let all = ctx.repo.list_decisions(&DecisionQuery::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    // written by the last batch
    assert_eq!(all[0].decision.id, 3);

    let active = ctx
        .repo
        .list_decisions(&DecisionQuery {
            active: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 2);

    let bans = ctx
        .repo
        .list_decisions(&DecisionQuery {
            decision_type: Some("ban".into()),
            host_ip: Some("192.0.2.10".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bans.len(), 2);
    let linked = bans.iter().find(|d| d.decision.id == 1).unwrap();
    assert_eq!(linked.alerts.len(), 1);
    assert_eq!(linked.alerts[0].entries, vec!["root", "admin"]);
    assert_eq!(
        linked.host.as_ref().and_then(|h| h.country.as_deref()),
        Some("NL")
    );

    let cscli = ctx
        .repo
        .list_decisions(&DecisionQuery {
            origin: Some("cscli".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(cscli.len(), 1);
    assert_eq!(cscli[0].decision.decision_type, DecisionType::Captcha);

    let hosts = ctx.repo.list_hosts().await.unwrap();
    assert_eq!(hosts.len(), 2);
    let first = hosts.iter().find(|h| h.host.ip == "192.0.2.10").unwrap();
    assert_eq!(first.active_decisions, 1);
    // only the active decision counts
    assert_eq!(first.host.total_bans, 1);
}

#[tokio::test]
async fn test_sync_engine_against_postgres() {
    let ctx = TestContext::new().await;
    let lapi = Arc::new(MockLapi::new());
    let engine = SyncEngine::new(
        lapi.clone(),
        ctx.repo.clone(),
        Reconciler::new(ctx.repo.clone(), Arc::new(NoCountryLookup), 2),
        Arc::new(Broadcaster::new()),
        SyncOptions {
            retention_count: Some(3),
            ..Default::default()
        },
    );

    lapi.push_stream(
        vec![
            decision(1, "192.0.2.10"),
            decision(2, "192.0.2.10"),
            decision(3, "198.51.100.7"),
        ],
        vec![],
    );
    lapi.set_alerts(
        "192.0.2.10",
        vec![http_alert(100, "192.0.2.10", &[1, 2], &["/.env"])],
    );
    engine.run(false).await.unwrap();

    assert_eq!(ctx.repo.count_active_decisions().await.unwrap(), 3);
    assert_eq!(ctx.repo.get_decision_alerts(2).await.unwrap().len(), 1);
    let host = ctx.repo.get_host("192.0.2.10").await.unwrap().unwrap();
    assert_eq!(host.country.as_deref(), Some("NL"));
    assert_eq!(host.total_bans, 2);

    // 1 leaves, 4 arrives: one over the retention limit
    lapi.push_stream(
        vec![decision(4, "203.0.113.5")],
        vec![decision(1, "192.0.2.10")],
    );
    engine.run(false).await.unwrap();

    assert_eq!(ctx.repo.count_decisions().await.unwrap(), 3);
    assert!(ctx.repo.get_decision(1).await.unwrap().is_none());
    // alert 100 still backs decision 2
    assert_eq!(ctx.repo.get_decision_alerts(2).await.unwrap().len(), 1);
    let host = ctx.repo.get_host("192.0.2.10").await.unwrap().unwrap();
    assert_eq!(host.total_bans, 1);
}
