use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Value as JsonValue, json};

use super::*;
use crate::data::{FactStore, MemoryWarehouse, SchemaStore};
use crate::domain::audit::testing::RecordingAuditSink;
use crate::domain::partitions::{PartitionManager, YearSpan};

const TABLE: &str = "market_time_series";

struct Harness {
    warehouse: Arc<MemoryWarehouse>,
    partitions: Arc<PartitionManager>,
    audit: Arc<RecordingAuditSink>,
}

impl Harness {
    async fn new() -> Self {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.ensure_base_schema(TABLE).await.unwrap();
        let audit = Arc::new(RecordingAuditSink::default());
        let partitions = Arc::new(PartitionManager::new(warehouse.clone(), audit.clone()));
        Self {
            warehouse,
            partitions,
            audit,
        }
    }

    fn ingestor(&self, settings: IngestSettings) -> FactIngestor {
        FactIngestor::new(
            self.warehouse.clone(),
            self.partitions.clone(),
            self.audit.clone(),
            TABLE,
            settings,
        )
    }

    async fn stored_value(&self, row: &IncomingFact) -> Option<f64> {
        let identity = row.clone().validate(None).unwrap().identity();
        self.warehouse
            .fetch(TABLE, &identity)
            .await
            .unwrap()
            .and_then(|r| r.metric_value)
    }
}

fn fast_settings(policy: ConflictPolicy) -> IngestSettings {
    IngestSettings {
        policy,
        retry_base_delay_ms: 1,
        ..Default::default()
    }
}

fn fact(date: &str, value: f64, attributes: JsonValue) -> IncomingFact {
    IncomingFact {
        region_id: Some("06037".into()),
        date: Some(date.into()),
        metric_name: Some("zhvi".into()),
        data_source: Some("zillow".into()),
        metric_value: Some(value),
        attributes,
    }
}

#[tokio::test]
async fn test_attribute_key_order_is_same_identity() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));

    let first = fact(
        "2015-06-30",
        512_300.0,
        json!({"property_type": "sfr", "tier": "middle"}),
    );
    let second = fact(
        "2015-06-30",
        530_000.0,
        json!({"tier": "middle", "property_type": "sfr"}),
    );

    assert_eq!(
        ingestor.upsert_fact(first.clone(), ConflictPolicy::Ignore).await.unwrap(),
        UpsertOutcome::Inserted
    );
    assert_eq!(
        ingestor.upsert_fact(second, ConflictPolicy::Ignore).await.unwrap(),
        UpsertOutcome::Ignored
    );
    assert_eq!(h.warehouse.count(TABLE).await.unwrap(), 1);
    assert_eq!(h.stored_value(&first).await, Some(512_300.0));
}

#[tokio::test]
async fn test_integral_float_attribute_is_same_identity() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));

    let report = ingestor
        .ingest_batch(vec![
            fact("2015-06-30", 1.0, json!({"tier": 1})),
            fact("2015-06-30", 2.0, json!({"tier": 1.0})),
        ])
        .await
        .unwrap();
    assert_eq!((report.inserted, report.ignored), (1, 1));
    assert_eq!(h.warehouse.count(TABLE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_replace_overwrites_value() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Replace));
    let rows = vec![
        fact("2015-06-30", 1.0, JsonValue::Null),
        fact("2015-06-30", 2.0, JsonValue::Null),
    ];

    let report = ingestor.ingest_batch(rows.clone()).await.unwrap();
    assert_eq!((report.inserted, report.replaced, report.ignored), (1, 1, 0));
    assert_eq!(h.stored_value(&rows[0]).await, Some(2.0));
}

#[tokio::test]
async fn test_ignore_keeps_first_value() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));
    let rows = vec![
        fact("2015-06-30", 1.0, JsonValue::Null),
        fact("2015-06-30", 2.0, JsonValue::Null),
    ];

    let report = ingestor.ingest_batch(rows.clone()).await.unwrap();
    assert_eq!((report.inserted, report.replaced, report.ignored), (1, 0, 1));
    assert_eq!(h.stored_value(&rows[0]).await, Some(1.0));
}

#[tokio::test]
async fn test_missing_metric_name_rejects_only_that_row() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));

    let mut broken = fact("2015-07-31", 3.0, JsonValue::Null);
    broken.metric_name = None;
    let rows = vec![
        fact("2015-06-30", 1.0, JsonValue::Null),
        broken,
        fact("2015-06-30", 1.5, JsonValue::Null),
        fact("2015-08-31", 2.0, json!({"tier": "top"})),
    ];

    let report = ingestor.ingest_batch(rows).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.replaced, 0);
    assert_eq!(
        report.rejected,
        vec![RejectedRow {
            index: 1,
            reason: "missing metric_name".into(),
        }]
    );
    assert_eq!(
        h.audit.events().last().map(String::as_str),
        Some("ingest market_time_series inserted=2 rejected=1")
    );
}

#[tokio::test]
async fn test_lazy_partitions_cover_only_present_years() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));
    let rows = vec![
        fact("2015-06-30", 1.0, JsonValue::Null),
        fact("2018-01-31", 2.0, JsonValue::Null),
    ];

    let report = ingestor.ingest_batch(rows).await.unwrap();
    assert_eq!(report.inserted, 2);

    let names: Vec<String> = h
        .warehouse
        .partitions(TABLE)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["market_time_series_2015", "market_time_series_2018"]);
}

#[tokio::test]
async fn test_without_lazy_partitions_uncovered_rows_are_rejected() {
    let h = Harness::new().await;
    h.partitions
        .ensure_partition_coverage(TABLE, YearSpan::single(2015).unwrap())
        .await
        .unwrap();
    let ingestor = h.ingestor(IngestSettings {
        lazy_partitions: false,
        ..fast_settings(ConflictPolicy::Ignore)
    });

    let report = ingestor
        .ingest_batch(vec![
            fact("2015-06-30", 1.0, JsonValue::Null),
            fact("2030-06-30", 1.0, JsonValue::Null),
        ])
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].reason, "no partition covers date 2030-06-30");
}

#[tokio::test]
async fn test_transient_write_failures_are_retried() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));
    h.warehouse.fail_writes(2);

    let report = ingestor
        .ingest_batch(vec![fact("2015-06-30", 1.0, JsonValue::Null)])
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);
}

#[tokio::test]
async fn test_persistent_failure_interrupts_with_counts() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(fast_settings(ConflictPolicy::Ignore));
    let mut broken = fact("2015-06-30", 1.0, JsonValue::Null);
    broken.region_id = None;
    let rows = vec![broken, fact("2015-07-31", 1.0, JsonValue::Null)];

    // Every attempt for the valid row fails
    h.warehouse.fail_writes(3);
    let err = ingestor.ingest_batch(rows.clone()).await.unwrap_err();
    assert!(err.is_transient());
    let partial = err.partial_report().unwrap();
    assert_eq!(partial.inserted, 0);
    assert_eq!(partial.rejected[0].reason, "missing region_id");
    assert_eq!(h.warehouse.count(TABLE).await.unwrap(), 0);

    // The same input re-runs cleanly once the store is back
    let rerun = ingestor.ingest_batch(rows).await.unwrap();
    assert_eq!(rerun.inserted, 1);
    assert_eq!(rerun.rejected.len(), 1);
}

#[tokio::test]
async fn test_ingest_file_rejects_bad_lines() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(IngestSettings {
        default_source: Some("fred".into()),
        ..fast_settings(ConflictPolicy::Ignore)
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.jsonl");
    std::fs::write(
        &path,
        concat!(
            "{\"region_id\":\"06037\",\"date\":\"2015-06-30\",\"metric_name\":\"mortgage_30y\",\"metric_value\":3.98}\n",
            "{oops\n",
            "{\"region_id\":\"06037\",\"date\":\"2015-06-30\",\"metric_name\":\"mortgage_30y\",\"attributes\":[1]}\n",
        ),
    )
    .unwrap();

    let report = ingestor.ingest_file(&path).await.unwrap();
    assert_eq!(report.inserted, 1);
    let lines: Vec<usize> = report.rejected.iter().map(|r| r.index).collect();
    assert_eq!(lines, vec![2, 3]);
    assert!(report.rejected[1].reason.starts_with("attributes must be a JSON object"));
}

#[tokio::test]
async fn test_ingest_missing_file() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(IngestSettings::default());
    let err = ingestor
        .ingest_file(std::path::Path::new("/nonexistent/rows.jsonl"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Read { .. }));
}

#[tokio::test]
async fn test_stored_row_round_trip() {
    let h = Harness::new().await;
    let ingestor = h.ingestor(IngestSettings::default());
    let incoming = fact("2016-02-29", 7.5, json!({"b": 1, "a": {"y": 2, "x": 1}}));
    ingestor
        .upsert_fact(incoming.clone(), ConflictPolicy::Ignore)
        .await
        .unwrap();

    let row = incoming.validate(None).unwrap();
    let stored = h.warehouse.fetch(TABLE, &row.identity()).await.unwrap().unwrap();
    assert_eq!(stored.date, NaiveDate::from_ymd_opt(2016, 2, 29).unwrap());
    assert_eq!(stored.attributes.canonical(), r#"{"a":{"x":1,"y":2},"b":1}"#);
}
