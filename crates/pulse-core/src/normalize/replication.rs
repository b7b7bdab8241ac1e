use serde::Deserialize;
use serde_json::Value;

use super::Origin;
use crate::error::DiagResult;
use crate::metric::{Metric, Unit};

const PRIMARY: i64 = 1;
const SECONDARY: i64 = 2;

#[derive(Deserialize)]
struct ReplStatus {
    #[serde(default)]
    set: Option<String>,
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct Member {
    name: String,
    state: i64,
    #[serde(default)]
    health: Option<f64>,
    /// Epoch milliseconds.
    #[serde(rename = "optimeDate", default)]
    optime_date: Option<f64>,
}

#[derive(Deserialize)]
struct OplogWindow {
    #[serde(rename = "firstTs")]
    first_ts: f64,
    #[serde(rename = "lastTs")]
    last_ts: f64,
}

pub(super) fn member_status(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let status: ReplStatus = origin.parse(payload)?;
    let set = status.set.unwrap_or_default();
    let mut metrics = Vec::new();

    let unhealthy = status
        .members
        .iter()
        .filter(|m| m.health.is_some_and(|h| h < 1.0))
        .count();
    metrics.push(
        origin
            .metric("unhealthy_members", unhealthy as f64, Unit::Count)
            .with_label("set", &set),
    );

    let Some(primary) = status.members.iter().find(|m| m.state == PRIMARY) else {
        tracing::warn!(set = %set, "No primary in replica set status, skipping lag");
        return Ok(metrics);
    };
    let primary_optime = primary
        .optime_date
        .ok_or_else(|| origin.malformed(format!("members[{}].optimeDate", primary.name)))?;

    for secondary in status.members.iter().filter(|m| m.state == SECONDARY) {
        let Some(optime) = secondary.optime_date else {
            tracing::warn!(member = %secondary.name, "Secondary without optimeDate");
            continue;
        };

        let lag_secs = (primary_optime - optime) / 1000.0;
        let metric = origin
            .metric("replication_lag_seconds", lag_secs.max(0.0), Unit::Seconds)
            .with_label("set", &set)
            .with_label("member", &secondary.name);

        metrics.push(if lag_secs < 0.0 {
            metric.with_anomaly(format!(
                "secondary optime ahead of primary {} by {:.1}s",
                primary.name, -lag_secs
            ))
        } else {
            metric
        });
    }

    Ok(metrics)
}

pub(super) fn oplog_window(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let window: OplogWindow = origin.parse(payload)?;
    let hours = ((window.last_ts - window.first_ts) / 3600.0).max(0.0);
    Ok(vec![origin.metric("oplog_window_hours", hours, Unit::Hours)])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{find, raw};
    use super::super::try_normalize;
    use crate::metric::MetricValue;
    use crate::source::PayloadKind;
    use crate::subsystem::Subsystem;
    use serde_json::json;

    const T: i64 = 1_760_000_000_000;

    fn status(members: serde_json::Value) -> crate::source::RawResult {
        raw(
            PayloadKind::ReplicaSetStatus,
            Subsystem::Replication,
            json!({"set": "rs0", "members": members}),
        )
    }

    #[test]
    fn lag_is_primary_minus_secondary() {
        let metrics = try_normalize(&status(json!([
            {"name": "a:27017", "state": 1, "health": 1, "optimeDate": T},
            {"name": "b:27017", "state": 2, "health": 1, "optimeDate": T - 12_000},
            {"name": "c:27017", "state": 7, "health": 1},
        ])))
        .unwrap();

        let lag = find(&metrics, "replication_lag_seconds", ("member", "b:27017"));
        assert_eq!(lag.value, MetricValue::Number(12.0));
        assert!(lag.anomaly.is_none());
        assert_eq!(
            metrics.iter().filter(|m| m.name == "replication_lag_seconds").count(),
            1
        );
    }

    #[test]
    fn secondary_ahead_of_primary_is_flagged_not_negative() {
        let metrics = try_normalize(&status(json!([
            {"name": "a:27017", "state": 1, "health": 1, "optimeDate": T},
            {"name": "b:27017", "state": 2, "health": 1, "optimeDate": T + 3_000},
        ])))
        .unwrap();

        let lag = find(&metrics, "replication_lag_seconds", ("member", "b:27017"));
        assert_eq!(lag.value, MetricValue::Number(0.0));
        assert!(lag.anomaly.as_deref().unwrap().contains("ahead of primary"));
    }

    #[test]
    fn counts_unhealthy_members() {
        let metrics = try_normalize(&status(json!([
            {"name": "a:27017", "state": 1, "health": 1, "optimeDate": T},
            {"name": "b:27017", "state": 8, "health": 0},
        ])))
        .unwrap();
        let unhealthy = find(&metrics, "unhealthy_members", ("set", "rs0"));
        assert_eq!(unhealthy.value, MetricValue::Number(1.0));
    }

    #[test]
    fn oplog_window_in_hours() {
        let metrics = try_normalize(&raw(
            PayloadKind::OplogWindow,
            Subsystem::Replication,
            json!({"firstTs": 1_000, "lastTs": 1_000 + 36 * 3600}),
        ))
        .unwrap();
        assert_eq!(metrics[0].value, MetricValue::Number(36.0));
    }
}
