use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::RepositoryTrait;
use crate::domain::{
    AlertRow, Decision, DecisionQuery, DecisionRow, DecisionType, DecisionUpsert, DecisionView,
    Host, HostUpsert, HostView, StoredAlert,
};
use crate::error::Result;

const DECISION_COLUMNS: &str = "id, host_ip, decision_type, origin, scenario, duration, \
                                created_at, expires_at, active";

const ALERT_COLUMNS: &str = "a.id, a.scenario, a.message, a.created_at, a.host_ip, \
                             a.entries_json, a.entry_type, a.events_json";

#[derive(FromRow)]
struct HostViewRow {
    #[sqlx(flatten)]
    host: Host,
    active_decisions: i64,
}

#[derive(FromRow)]
struct LinkedAlertRow {
    decision_id: i64,
    #[sqlx(flatten)]
    alert: AlertRow,
}

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RepositoryTrait for Repository {
    async fn upsert_hosts(&self, hosts: &[HostUpsert]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for h in hosts {
            sqlx::query(
                r#"
                INSERT INTO hosts (ip, scope, first_seen, last_seen, total_bans,
                                   country, as_number, as_name, latitude, longitude)
                VALUES ($1, $2, $3, $3, 0, $4, $5, $6, $7, $8)
                ON CONFLICT (ip) DO UPDATE SET
                    scope = EXCLUDED.scope,
                    last_seen = EXCLUDED.last_seen,
                    country = COALESCE(EXCLUDED.country, hosts.country),
                    as_number = COALESCE(EXCLUDED.as_number, hosts.as_number),
                    as_name = COALESCE(EXCLUDED.as_name, hosts.as_name),
                    latitude = COALESCE(EXCLUDED.latitude, hosts.latitude),
                    longitude = COALESCE(EXCLUDED.longitude, hosts.longitude)
                "#,
            )
            .bind(&h.ip)
            .bind(&h.scope)
            .bind(now)
            .bind(&h.country)
            .bind(&h.as_number)
            .bind(&h.as_name)
            .bind(h.latitude)
            .bind(h.longitude)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_missing_hosts(&self, hosts: &[HostUpsert]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for h in hosts {
            sqlx::query(
                r#"
                INSERT INTO hosts (ip, scope, first_seen, last_seen, total_bans, country)
                VALUES ($1, $2, $3, $3, 0, $4)
                ON CONFLICT (ip) DO NOTHING
                "#,
            )
            .bind(&h.ip)
            .bind(&h.scope)
            .bind(now)
            .bind(&h.country)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_host_total_bans(&self, ip: &str) -> Result<()> {
        sqlx::query(
            "UPDATE hosts SET total_bans = (SELECT COUNT(*) FROM decisions WHERE host_ip = $1 AND active) WHERE ip = $1",
        )
        .bind(ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_host(&self, ip: &str) -> Result<Option<Host>> {
        let host = sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE ip = $1")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await?;
        Ok(host)
    }

    async fn list_hosts(&self) -> Result<Vec<HostView>> {
        let rows = sqlx::query_as::<_, HostViewRow>(
            r#"
            SELECT h.*,
                   (SELECT COUNT(*) FROM decisions d WHERE d.host_ip = h.ip AND d.active)
                       AS active_decisions
            FROM hosts h
            ORDER BY h.last_seen DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| HostView {
                host: r.host,
                active_decisions: r.active_decisions,
            })
            .collect())
    }

    async fn insert_alerts(&self, alerts: &[StoredAlert]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for a in alerts {
            sqlx::query(
                r#"
                INSERT INTO alerts (id, scenario, message, created_at, host_ip,
                                    entries_json, entry_type, events_json)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(a.id)
            .bind(&a.scenario)
            .bind(&a.message)
            .bind(a.created_at)
            .bind(&a.host_ip)
            .bind(serde_json::to_string(&a.entries)?)
            .bind(a.entry_type.as_str())
            .bind(&a.events_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_decision_alerts(&self, decision_id: i64) -> Result<Vec<StoredAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM alerts a
            JOIN decision_alerts da ON da.alert_id = a.id
            WHERE da.decision_id = $1
            ORDER BY a.created_at ASC, a.id ASC
            "#
        ))
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredAlert::from_row).collect())
    }

    async fn delete_orphan_alerts(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM alerts a
            WHERE NOT EXISTS (SELECT 1 FROM decision_alerts da WHERE da.alert_id = a.id)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_active_decisions(&self, decisions: &[DecisionUpsert]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for d in decisions {
            sqlx::query(
                r#"
                INSERT INTO decisions (id, host_ip, decision_type, origin, scenario, duration,
                                       created_at, expires_at, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
                ON CONFLICT (id) DO UPDATE SET
                    decision_type = EXCLUDED.decision_type,
                    origin = EXCLUDED.origin,
                    scenario = EXCLUDED.scenario,
                    active = TRUE
                "#,
            )
            .bind(d.id)
            .bind(&d.host_ip)
            .bind(d.decision_type.as_str())
            .bind(d.origin.as_str())
            .bind(&d.scenario)
            .bind(&d.duration)
            .bind(now)
            .bind(d.expires_at)
            .execute(&mut *tx)
            .await?;

            if !d.alert_ids.is_empty() {
                sqlx::query(
                    r#"
                    INSERT INTO decision_alerts (decision_id, alert_id)
                    SELECT $1, UNNEST($2::BIGINT[])
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(d.id)
                .bind(&d.alert_ids)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_inactive_decisions(&self, decisions: &[DecisionUpsert]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for d in decisions {
            sqlx::query(
                r#"
                INSERT INTO decisions (id, host_ip, decision_type, origin, scenario, duration,
                                       created_at, expires_at, active)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
                ON CONFLICT (id) DO UPDATE SET
                    active = FALSE,
                    expires_at = EXCLUDED.expires_at
                "#,
            )
            .bind(d.id)
            .bind(&d.host_ip)
            .bind(d.decision_type.as_str())
            .bind(d.origin.as_str())
            .bind(&d.scenario)
            .bind(&d.duration)
            .bind(now)
            .bind(d.expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn deactivate_decisions_except(&self, active_ids: &[i64]) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE decisions SET active = FALSE WHERE active AND NOT (id = ANY($1))",
        )
        .bind(active_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_decisions(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decisions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn count_active_decisions(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM decisions WHERE active")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn oldest_inactive_decisions(&self, limit: i64) -> Result<Vec<(i64, String)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, host_ip FROM decisions
            WHERE NOT active
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_decisions(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        // decision_alerts rows go with them (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM decisions WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_decision(&self, id: i64) -> Result<Option<Decision>> {
        let row = sqlx::query_as::<_, DecisionRow>(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Decision::from_row))
    }

    async fn list_decisions(&self, query: &DecisionQuery) -> Result<Vec<DecisionView>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE TRUE"));
        if let Some(ip) = &query.host_ip {
            qb.push(" AND host_ip = ").push_bind(ip);
        }
        if let Some(active) = query.active {
            qb.push(" AND active = ").push_bind(active);
        }
        if let Some(origin) = &query.origin {
            qb.push(" AND origin = ").push_bind(origin);
        }
        if let Some(t) = &query.decision_type {
            let normalized = DecisionType::from(t.clone());
            qb.push(" AND decision_type = ")
                .push_bind(normalized.as_str().to_string());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let decisions: Vec<Decision> = qb
            .build_query_as::<DecisionRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Decision::from_row)
            .collect();
        if decisions.is_empty() {
            return Ok(Vec::new());
        }

        let mut ips: Vec<String> = decisions.iter().map(|d| d.host_ip.clone()).collect();
        ips.sort();
        ips.dedup();
        let hosts: HashMap<String, Host> =
            sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE ip = ANY($1)")
                .bind(&ips)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|h| (h.ip.clone(), h))
                .collect();

        let ids: Vec<i64> = decisions.iter().map(|d| d.id).collect();
        let links = sqlx::query_as::<_, LinkedAlertRow>(&format!(
            r#"
            SELECT da.decision_id, {ALERT_COLUMNS}
            FROM decision_alerts da
            JOIN alerts a ON a.id = da.alert_id
            WHERE da.decision_id = ANY($1)
            ORDER BY a.created_at ASC, a.id ASC
            "#
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut alerts_by_decision: HashMap<i64, Vec<_>> = HashMap::new();
        for link in links {
            alerts_by_decision
                .entry(link.decision_id)
                .or_default()
                .push(StoredAlert::from_row(link.alert).summary());
        }

        Ok(decisions
            .into_iter()
            .map(|d| DecisionView {
                host: hosts.get(&d.host_ip).cloned(),
                alerts: alerts_by_decision.remove(&d.id).unwrap_or_default(),
                decision: d,
            })
            .collect())
    }

    async fn set_decision_inactive(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE decisions SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
