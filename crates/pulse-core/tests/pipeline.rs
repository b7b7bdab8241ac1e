use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use pulse_core::collector::{Collector, ConfiguredSource};
use pulse_core::config::{PulseConfig, SourceOverride, TargetConfig};
use pulse_core::error::{DiagError, DiagResult};
use pulse_core::evaluate::{Finding, Severity};
use pulse_core::event::{ChannelEventSink, CycleEvent};
use pulse_core::pipeline::Pipeline;
use pulse_core::report::{render, OutputFormat, Report};
use pulse_core::snapshot::SnapshotTarget;
use pulse_core::source::{FailureKind, MetricSource, PayloadKind, SourceDescriptor, SourcePolicy};
use pulse_core::subsystem::Subsystem;
use pulse_core::target::ClusterTarget;

const T: i64 = 1_760_000_000_000;

fn healthy_cluster() -> SnapshotTarget {
    SnapshotTarget::new("mongodb://mongos.test:27017")
        .with_entry("list_databases", json!(["admin", "config", "social", "local"]))
        .with_entry(
            "list_shards",
            json!({"shards": [
                {"_id": "shard0", "host": "rs-a/a:27018", "state": 1},
                {"_id": "shard1", "host": "rs-b/b:27018", "state": 1},
                {"_id": "shard2", "host": "rs-c/c:27018", "state": 1},
            ]}),
        )
        .with_entry(
            "chunk_distribution",
            json!({"chunks": [
                {"namespace": "social.posts", "shard": "shard0", "count": 120},
                {"namespace": "social.posts", "shard": "shard1", "count": 40},
                {"namespace": "social.posts", "shard": "shard2", "count": 40},
            ]}),
        )
        .with_entry("balancer_status", json!({"mode": "full", "inBalancerRound": false}))
        .with_entry(
            "replica_set_status",
            json!({"set": "rs0", "members": [
                {"name": "a:27017", "state": 1, "stateStr": "PRIMARY", "health": 1, "optimeDate": T},
                {"name": "b:27017", "state": 2, "stateStr": "SECONDARY", "health": 1, "optimeDate": T - 12_000},
                {"name": "c:27017", "state": 2, "stateStr": "SECONDARY", "health": 1, "optimeDate": T - 2_000},
            ]}),
        )
        .with_entry("oplog_window", json!({"firstTs": 0, "lastTs": 48 * 3600}))
        .with_entry(
            "index_usage.social",
            json!({"database": "social", "collections": [{
                "name": "posts",
                "documents": 10_000,
                "indexes": [
                    {"name": "_id_", "key": [["_id", 1]], "accesses": {"ops": 0}},
                    {"name": "author_1", "key": [["author", 1]], "accesses": {"ops": 900}},
                    {"name": "tags_1", "key": [["tags", 1]], "accesses": {"ops": 0}},
                ],
            }]}),
        )
        .with_entry(
            "collection_stats.social",
            json!({"database": "social", "collections": [{
                "ns": "social.posts", "count": 10_000,
                "size": 6_000, "storageSize": 10_000, "totalIndexSize": 1_000,
            }]}),
        )
        .with_entry(
            "database_stats.social",
            json!({"db": "social", "dataSize": 6_000, "fsUsedSize": 50, "fsTotalSize": 100}),
        )
        .with_entry(
            "current_ops",
            json!({"inprog": [
                {"opid": 7, "ns": "social.posts", "op": "command", "secs_running": 75},
            ]}),
        )
}

fn config() -> PulseConfig {
    PulseConfig {
        targets: vec![TargetConfig {
            name: None,
            connection: serde_yaml::Value::Null,
        }],
        ..PulseConfig::default()
    }
}

fn find<'a>(report: &'a Report, name: &str, label: (&str, &str)) -> &'a Finding {
    report
        .findings()
        .find(|f| f.metric.name == name && f.metric.label(label.0) == Some(label.1))
        .unwrap_or_else(|| panic!("no finding {name} with {}={}", label.0, label.1))
}

fn sources_with_findings(report: &Report) -> BTreeSet<String> {
    report.findings().map(|f| f.metric.source.clone()).collect()
}

#[tokio::test]
async fn healthy_cluster_produces_full_report() {
    let pipeline = Pipeline::from_config(&config()).unwrap();
    let report = pipeline.run(&healthy_cluster()).await;

    assert!(report.failures().is_empty());
    assert!(report.mapping_errors().is_empty());
    assert_eq!(report.sources().len(), 8);
    assert_eq!(sources_with_findings(&report).len(), 8);

    let ratio = find(&report, "chunk_max_min_ratio", ("namespace", "social.posts"));
    assert_eq!(ratio.severity, Severity::Critical);

    let lagging = find(&report, "replication_lag_seconds", ("member", "b:27017"));
    assert_eq!(lagging.metric.value.as_f64(), Some(12.0));
    assert_eq!(lagging.severity, Severity::Critical);
    let fine = find(&report, "replication_lag_seconds", ("member", "c:27017"));
    assert_eq!(fine.severity, Severity::Ok);

    let unused = find(&report, "index_ops_count", ("index", "tags_1"));
    assert!(unused
        .recommendation
        .as_deref()
        .unwrap()
        .contains("candidate for removal"));
    let pk = find(&report, "index_ops_count", ("index", "_id_"));
    assert!(pk.recommendation.is_none());

    let frag = find(&report, "fragmentation_pct", ("namespace", "social.posts"));
    assert_eq!(frag.severity, Severity::Warn);

    let slow = find(&report, "aggregation_runtime_seconds", ("opid", "7"));
    assert_eq!(slow.severity, Severity::Critical);

    let order: Vec<_> = report.sections().iter().map(|s| s.subsystem).collect();
    assert_eq!(order, Subsystem::ALL.to_vec());
}

#[tokio::test]
async fn partial_failure_keeps_other_diagnostics() {
    let target = healthy_cluster()
        .with_unreachable("replica_set_status", "connection refused: a:27017")
        .with_unreachable("balancer_status", "connection refused: cfg:27019");

    let report = Pipeline::from_config(&config()).unwrap().run(&target).await;

    assert_eq!(report.sources().len(), 8);
    assert_eq!(report.failures().len(), 2);
    assert_eq!(sources_with_findings(&report).len(), 6);
    assert!(!report.is_total_failure());
    for failure in report.failures() {
        assert_eq!(failure.error.kind, FailureKind::Connection);
        assert!(failure.error.detail.contains("connection refused"));
    }

    let text = render(&report, OutputFormat::Text).unwrap();
    assert!(text.contains("replication.member_status"));
    assert!(text.contains("FAILED SOURCES (2)"));
}

#[tokio::test]
async fn unreadable_database_does_not_hide_the_others() {
    let target = healthy_cluster()
        .with_unreachable("index_usage.analytics", "not authorized on analytics")
        .with_unreachable("collection_stats.analytics", "not authorized on analytics")
        .with_unreachable("database_stats.analytics", "not authorized on analytics")
        .with_entry(
            "database_stats.social",
            json!({"db": "social", "dataSize": 6_000, "fsUsedSize": 95, "fsTotalSize": 100}),
        );
    let mut config = config();
    config.scope.databases = vec!["social".into(), "analytics".into()];

    let report = Pipeline::from_config(&config).unwrap().run(&target).await;

    assert!(report.failures().is_empty());
    assert_eq!(sources_with_findings(&report).len(), 8);
    let unused = find(&report, "index_ops_count", ("index", "tags_1"));
    assert!(unused.recommendation.is_some());
    let disk = find(&report, "disk_usage_pct", ("database", "social"));
    assert_eq!(disk.severity, Severity::Critical);

    let issues = report.mapping_errors();
    assert_eq!(issues.len(), 3);
    assert!(issues
        .iter()
        .all(|i| i.detail.contains("database 'analytics'") && i.detail.contains("not authorized")));
    let text = render(&report, OutputFormat::Text).unwrap();
    assert!(text.contains("INCOMPLETE RESPONSES (3)"));
}

#[tokio::test]
async fn unopened_target_yields_all_failed_report() {
    let pipeline = Pipeline::from_config(&config()).unwrap();
    let error = DiagError::Connection(anyhow::anyhow!("DNS lookup failed for nxdomain.invalid"));

    let report = pipeline.unreachable_report("mongodb+srv://nxdomain.invalid", &error);

    assert!(report.is_total_failure());
    assert_eq!(report.endpoint(), "mongodb+srv://nxdomain.invalid");
    assert_eq!(report.sources().len(), pipeline.sources().len());
    assert_eq!(report.failures().len(), pipeline.sources().len());
    for failure in report.failures() {
        assert_eq!(failure.error.kind, FailureKind::Connection);
        assert!(failure.error.detail.contains("nxdomain.invalid"));
    }
    let text = render(&report, OutputFormat::Text).unwrap();
    assert!(text.contains("ALL SOURCES FAILED"));
}

#[tokio::test(start_paused = true)]
async fn timeout_cuts_the_call_short() {
    let mut config = config();
    config.sources.insert(
        "replication.oplog_window".into(),
        SourceOverride {
            timeout: Some(Duration::from_millis(1000)),
            ..SourceOverride::default()
        },
    );
    let target = healthy_cluster().with_delay("oplog_window", Duration::from_millis(2000));

    let report = Pipeline::from_config(&config).unwrap().run(&target).await;

    let outcome = report
        .sources()
        .iter()
        .find(|s| s.source == "replication.oplog_window")
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.metrics, 0);
    assert!(outcome.elapsed >= Duration::from_millis(1000));
    assert!(outcome.elapsed < Duration::from_millis(1100));
    assert_eq!(report.failures()[0].error.kind, FailureKind::Timeout);
    assert!(report
        .findings()
        .all(|f| f.metric.source != "replication.oplog_window"));
    // Siblings are unaffected.
    assert_eq!(report.failures().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn results_follow_configuration_order_not_completion_order() {
    let target = healthy_cluster()
        .with_delay("list_shards", Duration::from_millis(300))
        .with_delay("balancer_status", Duration::from_millis(200))
        .with_delay("replica_set_status", Duration::from_millis(100));
    let mut config = config();
    config.collector.max_in_flight = 8;
    let pipeline = Pipeline::from_config(&config).unwrap();

    let expected: Vec<String> = pipeline
        .sources()
        .iter()
        .map(|c| c.source.descriptor().id)
        .collect();
    let report = pipeline.run(&target).await;
    let actual: Vec<String> = report.sources().iter().map(|s| s.source.clone()).collect();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn sequential_and_concurrent_runs_agree() {
    let mut sequential = config();
    sequential.collector.max_in_flight = 1;
    let mut concurrent = config();
    concurrent.collector.max_in_flight = 8;

    let a = Pipeline::from_config(&sequential).unwrap().run(&healthy_cluster()).await;
    let b = Pipeline::from_config(&concurrent).unwrap().run(&healthy_cluster()).await;

    let strip = |r: &Report| -> Vec<(Subsystem, Vec<(String, String, Severity)>)> {
        r.sections()
            .iter()
            .map(|s| {
                let rows = s
                    .findings
                    .iter()
                    .map(|f| (f.metric.name.clone(), f.metric.label_string(), f.severity))
                    .collect();
                (s.subsystem, rows)
            })
            .collect()
    };
    assert_eq!(strip(&a), strip(&b));
}

#[tokio::test]
async fn every_source_failing_is_total_failure_but_still_reported() {
    let target = SnapshotTarget::new("mongodb://down:27017");
    let report = Pipeline::from_config(&config()).unwrap().run(&target).await;

    assert!(report.is_total_failure());
    assert_eq!(report.failures().len(), report.sources().len());
    assert_eq!(report.findings().count(), 0);
    assert!(render(&report, OutputFormat::Json).is_ok());
}

#[tokio::test]
async fn malformed_payload_counts_as_fetched() {
    let target = healthy_cluster().with_entry("oplog_window", json!({"first": "yesterday"}));
    let report = Pipeline::from_config(&config()).unwrap().run(&target).await;

    let outcome = report
        .sources()
        .iter()
        .find(|s| s.source == "replication.oplog_window")
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.metrics, 0);
    assert!(report.failures().is_empty());
    assert_eq!(report.mapping_errors().len(), 1);
    assert_eq!(report.mapping_errors()[0].subsystem, Subsystem::Replication);
}

#[tokio::test]
async fn subsystem_selection_limits_sources() {
    let mut config = config();
    config.subsystems = vec![Subsystem::Indexing];
    let report = Pipeline::from_config(&config).unwrap().run(&healthy_cluster()).await;

    assert_eq!(report.sources().len(), 1);
    assert_eq!(report.sections().len(), 1);
    assert_eq!(report.sections()[0].subsystem, Subsystem::Indexing);
    // Three index counters, plus redundancy and scan risk for the collection.
    assert_eq!(report.sections()[0].findings.len(), 5);
}

#[tokio::test]
async fn events_bracket_the_cycle() {
    let (sink, mut rx) = ChannelEventSink::new();
    let mut pipeline = Pipeline::from_config(&config()).unwrap();
    pipeline.add_event_sink(Arc::new(sink));
    let report = pipeline.run(&healthy_cluster()).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 1 + report.sources().len() + 1);
    assert!(matches!(events.first(), Some(CycleEvent::Started { sources: 8, .. })));
    match events.last() {
        Some(CycleEvent::Completed { cycle_id, findings, .. }) => {
            assert_eq!(*cycle_id, report.cycle_id());
            assert_eq!(*findings, report.findings().count());
        }
        other => panic!("unexpected last event {other:?}"),
    }
}

#[test]
fn invalid_config_fails_before_collection() {
    let mut config = config();
    config.sources.insert(
        "indexing.index_usage".into(),
        SourceOverride {
            max_attempts: Some(0),
            ..SourceOverride::default()
        },
    );
    assert!(matches!(
        Pipeline::from_config(&config),
        Err(DiagError::Config(_))
    ));
}

/// Fails until it has been called `succeed_on` times.
struct FlakySource {
    calls: AtomicU32,
    succeed_on: u32,
}

#[async_trait]
impl MetricSource for FlakySource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: "replication.flaky".into(),
            description: "test".into(),
            subsystem: Subsystem::Replication,
            kind: PayloadKind::OplogWindow,
        }
    }

    async fn query(&self, _target: &dyn ClusterTarget) -> DiagResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < self.succeed_on {
            Err(DiagError::Connection(anyhow::anyhow!("reset by peer")))
        } else {
            Ok(json!({"firstTs": 0, "lastTs": 3600}))
        }
    }
}

fn flaky(succeed_on: u32, max_attempts: u32) -> ConfiguredSource {
    ConfiguredSource::new(
        Box::new(FlakySource {
            calls: AtomicU32::new(0),
            succeed_on,
        }),
        SourcePolicy {
            timeout: Duration::from_secs(1),
            max_attempts,
            retry_delay: Duration::from_millis(50),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn no_retry_by_default_and_bounded_retry_when_enabled() {
    let target = SnapshotTarget::new("mongodb://t");
    let collector = Collector::sequential();

    let once = collector.collect(&target, &[flaky(2, 1)]).await;
    assert!(!once[0].is_success());
    assert_eq!(once[0].attempts, 1);

    let retried = collector.collect(&target, &[flaky(2, 3)]).await;
    assert!(retried[0].is_success());
    assert_eq!(retried[0].attempts, 2);
    assert!(retried[0].elapsed >= Duration::from_millis(50));

    let exhausted = collector.collect(&target, &[flaky(10, 3)]).await;
    assert!(!exhausted[0].is_success());
    assert_eq!(exhausted[0].attempts, 3);
}
