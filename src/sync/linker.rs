use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};

use crate::lapi::{AlertFilters, LapiAlert, LapiApi, LapiDecision};
use crate::observability::ALERT_LINK_FAILURES;

/// Decision id → alerts that reference it
pub type DecisionAlertMap = HashMap<i64, Vec<LapiAlert>>;

/// Distinct host addresses in first-seen order
pub fn distinct_ips(decisions: &[LapiDecision]) -> Vec<String> {
    let mut seen = HashSet::new();
    decisions
        .iter()
        .filter(|d| seen.insert(d.value.as_str()))
        .map(|d| d.value.clone())
        .collect()
}

/// Resolve the alerts behind each polled decision.
///
/// Alerts are queried per address, `chunk_size` addresses at a time with
/// the queries inside a chunk running concurrently. Each alert's decision
/// references are inverted into the map, restricted to the polled ids.
/// Alerts without events are skipped. An alert reached through several
/// addresses is recorded once per decision. A failed query is logged and
/// contributes nothing.
pub async fn build_decision_alert_map(
    lapi: &dyn LapiApi,
    decisions: &[LapiDecision],
    chunk_size: usize,
) -> DecisionAlertMap {
    let wanted: HashSet<i64> = decisions.iter().map(|d| d.id).collect();
    let ips = distinct_ips(decisions);
    let mut map = DecisionAlertMap::new();

    for chunk in ips.chunks(chunk_size.max(1)) {
        let queries = chunk.iter().map(|ip| async move {
            let filters = AlertFilters {
                ip: Some(ip.clone()),
                has_active_decision: Some(true),
                ..Default::default()
            };
            match lapi.get_alerts(&filters).await {
                Ok(alerts) => alerts,
                Err(e) => {
                    tracing::warn!(ip = %ip, error = %e, "failed to fetch alerts for host");
                    ALERT_LINK_FAILURES.inc();
                    Vec::new()
                }
            }
        });

        for alerts in join_all(queries).await {
            for alert in alerts {
                if alert.events.is_empty() {
                    continue;
                }
                for decision in &alert.decisions {
                    if !wanted.contains(&decision.id) {
                        continue;
                    }
                    let linked = map.entry(decision.id).or_default();
                    if !linked.iter().any(|a| a.id == alert.id) {
                        linked.push(alert.clone());
                    }
                }
            }
        }
    }

    tracing::info!(
        linked = map.len(),
        decisions = decisions.len(),
        "linked decisions to alerts"
    );
    map
}
