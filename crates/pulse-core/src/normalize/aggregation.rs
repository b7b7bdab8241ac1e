use serde::Deserialize;
use serde_json::Value;

use super::Origin;
use crate::error::DiagResult;
use crate::metric::{Metric, Unit};

#[derive(Deserialize)]
struct CurrentOps {
    inprog: Vec<InProgress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InProgress {
    opid: Value,
    #[serde(default)]
    ns: Option<String>,
    #[serde(rename = "secs_running", default)]
    secs_running: Option<f64>,
    #[serde(default)]
    plan_summary: Option<String>,
}

pub(super) fn long_running(origin: &Origin<'_>, payload: &Value) -> DiagResult<Vec<Metric>> {
    let parsed: CurrentOps = origin.parse(payload)?;
    let mut metrics = vec![origin.metric(
        "long_running_aggregations",
        parsed.inprog.len() as f64,
        Unit::Count,
    )];

    for op in &parsed.inprog {
        let opid = match &op.opid {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut metric = origin
            .metric(
                "aggregation_runtime_seconds",
                op.secs_running.unwrap_or(0.0),
                Unit::Seconds,
            )
            .with_label("opid", opid);
        if let Some(ns) = &op.ns {
            metric = metric.with_label("namespace", ns);
        }
        if let Some(plan) = &op.plan_summary {
            metric = metric.with_label("plan", plan);
        }
        metrics.push(metric);
    }
    Ok(metrics)
}
