use super::*;
use crate::domain::facts::Attributes;

const TABLE: &str = "market_time_series";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn partition(year: i32) -> DdlStatement {
    DdlStatement::CreatePartition {
        parent: TABLE.into(),
        name: format!("{}_{}", TABLE, year),
        from: d(year, 1, 1),
        to: d(year + 1, 1, 1),
    }
}

fn row(region: &str, value: f64) -> FactRow {
    FactRow::new(region, d(2015, 6, 30), "zhvi", "zillow", Some(value))
}

async fn warehouse_with_2015() -> MemoryWarehouse {
    let wh = MemoryWarehouse::new();
    wh.ensure_base_schema(TABLE).await.unwrap();
    wh.execute(&partition(2015)).await.unwrap();
    wh
}

#[tokio::test]
async fn test_partition_inherits_identity_constraint() {
    let wh = warehouse_with_2015().await;
    let constraints = wh.constraints("market_time_series_2015").await.unwrap();
    assert_eq!(constraints.len(), 1);
    assert!(constraints[0].inherited);
    assert!(constraints[0].definition.is_unique_on(&IDENTITY_COLUMNS));
}

#[tokio::test]
async fn test_write_without_partition_fails() {
    let wh = warehouse_with_2015().await;
    let late = FactRow::new("06037", d(2031, 2, 1), "zhvi", "zillow", Some(1.0));
    let err = wh.upsert(TABLE, &late, ConflictPolicy::Ignore).await.unwrap_err();
    assert!(matches!(err, DataError::NoPartition { .. }));
}

#[tokio::test]
async fn test_upsert_policies() {
    let wh = warehouse_with_2015().await;
    assert_eq!(
        wh.upsert(TABLE, &row("06037", 1.0), ConflictPolicy::Ignore).await.unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        wh.upsert(TABLE, &row("06037", 2.0), ConflictPolicy::Ignore).await.unwrap(),
        WriteOutcome::Ignored
    );
    assert_eq!(
        wh.upsert(TABLE, &row("06037", 3.0), ConflictPolicy::Replace).await.unwrap(),
        WriteOutcome::Replaced
    );

    let stored = wh.fetch(TABLE, &row("06037", 0.0).identity()).await.unwrap().unwrap();
    assert_eq!(stored.metric_value, Some(3.0));
    assert_eq!(wh.count(TABLE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_attributes_distinguish_identities() {
    let wh = warehouse_with_2015().await;
    let middle = row("06037", 1.0).with_attributes(Attributes::new().with("tier", "middle"));
    let top = row("06037", 1.0).with_attributes(Attributes::new().with("tier", "top"));
    wh.upsert(TABLE, &middle, ConflictPolicy::Ignore).await.unwrap();
    assert_eq!(
        wh.upsert(TABLE, &top, ConflictPolicy::Ignore).await.unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(wh.count(TABLE).await.unwrap(), 2);
}

#[tokio::test]
async fn test_plain_insert_surfaces_violation() {
    let wh = warehouse_with_2015().await;
    wh.insert(TABLE, &row("06037", 1.0)).await.unwrap();
    let err = wh.insert(TABLE, &row("06037", 2.0)).await.unwrap_err();
    match err {
        DataError::UniqueViolation { constraint, detail } => {
            assert!(constraint.starts_with("market_time_series_2015_"));
            assert!(detail.contains("06037"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_legacy_table_rejects_fact_writes() {
    let wh = MemoryWarehouse::new();
    wh.create_legacy_fact_table(TABLE).unwrap();
    wh.execute(&partition(2015)).await.unwrap();
    let err = wh.upsert(TABLE, &row("06037", 1.0), ConflictPolicy::Ignore).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_upsert_needs_identity_arbiter() {
    let wh = MemoryWarehouse::new();
    wh.create_legacy_fact_table(TABLE).unwrap();
    for (column, data_type) in [("data_source", "text"), ("attributes", "jsonb")] {
        wh.execute(&DdlStatement::AddColumn {
            table: TABLE.into(),
            column: column.into(),
            data_type: data_type.into(),
            default: None,
        })
        .await
        .unwrap();
    }
    wh.execute(&partition(2015)).await.unwrap();

    let err = wh.upsert(TABLE, &row("06037", 1.0), ConflictPolicy::Ignore).await.unwrap_err();
    assert!(matches!(err, DataError::MissingConflictTarget { .. }));
}

#[tokio::test]
async fn test_parent_drop_cascades_and_child_copy_is_protected() {
    let wh = warehouse_with_2015().await;
    let child = "market_time_series_2015";
    let inherited = wh.constraints(child).await.unwrap().remove(0);

    let err = wh
        .execute(&DdlStatement::DropConstraint {
            table: child.into(),
            name: inherited.name.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Rejected(_)));

    wh.execute(&DdlStatement::DropConstraint {
        table: TABLE.into(),
        name: identity_constraint_name(TABLE),
    })
    .await
    .unwrap();
    assert!(wh.constraints(child).await.unwrap().is_empty());
    assert!(wh.constraints(TABLE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drop_missing_constraint_is_noop() {
    let wh = warehouse_with_2015().await;
    wh.execute(&DdlStatement::DropConstraint {
        table: TABLE.into(),
        name: "no_such_constraint".into(),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_check_constraint_reads_back_rewritten_with_comment() {
    let wh = warehouse_with_2015().await;
    wh.execute(&DdlStatement::AddConstraint {
        table: TABLE.into(),
        name: "mts_value_check".into(),
        definition: ConstraintDef::Check {
            expression: "metric_value >= 0".into(),
        },
    })
    .await
    .unwrap();
    wh.execute(&DdlStatement::CommentConstraint {
        table: TABLE.into(),
        name: "mts_value_check".into(),
        comment: "metric_value >= 0".into(),
    })
    .await
    .unwrap();

    let parent = wh.constraints(TABLE).await.unwrap();
    let check = parent.iter().find(|c| c.name == "mts_value_check").unwrap();
    assert_eq!(
        check.definition,
        ConstraintDef::Check {
            expression: "(metric_value >= (0))".into()
        }
    );
    assert_eq!(check.comment.as_deref(), Some("metric_value >= 0"));

    let child = wh.constraints("market_time_series_2015").await.unwrap();
    assert!(child.iter().any(|c| c.name == "mts_value_check" && c.inherited));
}

#[tokio::test]
async fn test_comment_on_missing_constraint() {
    let wh = warehouse_with_2015().await;
    let err = wh
        .execute(&DdlStatement::CommentConstraint {
            table: TABLE.into(),
            name: "nope".into(),
            comment: "x".into(),
        })
        .await
        .unwrap_err();
    assert!(err.is_undefined_object());
}

#[tokio::test]
async fn test_unique_on_partitioned_table_needs_partition_key() {
    let wh = warehouse_with_2015().await;
    let err = wh
        .execute(&DdlStatement::AddConstraint {
            table: TABLE.into(),
            name: "no_date_key".into(),
            definition: ConstraintDef::unique(&["region_id", "metric_name"]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Rejected(_)));
}

#[tokio::test]
async fn test_unknown_column_in_constraint() {
    let wh = warehouse_with_2015().await;
    let err = wh
        .execute(&DdlStatement::AddConstraint {
            table: TABLE.into(),
            name: "k".into(),
            definition: ConstraintDef::unique(&["date", "vintage"]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::UnknownColumn { .. }));
}

#[tokio::test]
async fn test_overlapping_partition_rejected_and_existing_is_noop() {
    let wh = warehouse_with_2015().await;
    wh.execute(&partition(2015)).await.unwrap();

    let err = wh
        .execute(&DdlStatement::CreatePartition {
            parent: TABLE.into(),
            name: "market_time_series_mid".into(),
            from: d(2015, 7, 1),
            to: d(2016, 7, 1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Rejected(_)));
    assert_eq!(wh.partitions(TABLE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_column_reaches_partitions() {
    let wh = warehouse_with_2015().await;
    wh.execute(&DdlStatement::AddColumn {
        table: TABLE.into(),
        column: "vintage".into(),
        data_type: "date".into(),
        default: None,
    })
    .await
    .unwrap();
    let col = wh.column("market_time_series_2015", "vintage").await.unwrap();
    assert_eq!(col.unwrap().data_type, "date");

    let again = wh
        .execute(&DdlStatement::AddColumn {
            table: TABLE.into(),
            column: "vintage".into(),
            data_type: "date".into(),
            default: None,
        })
        .await
        .unwrap_err();
    assert!(again.is_already_exists());
}

#[tokio::test]
async fn test_set_not_null_rejects_null_values() {
    let wh = warehouse_with_2015().await;
    let mut missing = row("06037", 0.0);
    missing.metric_value = None;
    wh.insert(TABLE, &missing).await.unwrap();

    let err = wh
        .execute(&DdlStatement::SetNotNull {
            table: TABLE.into(),
            column: "metric_value".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Rejected(_)));
}

#[tokio::test]
async fn test_duplicate_identities_report() {
    let wh = MemoryWarehouse::new();
    wh.ensure_base_schema(TABLE).await.unwrap();
    wh.execute(&partition(2015)).await.unwrap();
    wh.execute(&DdlStatement::DropConstraint {
        table: TABLE.into(),
        name: identity_constraint_name(TABLE),
    })
    .await
    .unwrap();

    wh.insert(TABLE, &row("06037", 1.0)).await.unwrap();
    wh.insert(TABLE, &row("06037", 2.0)).await.unwrap();
    wh.insert(TABLE, &row("36061", 1.0)).await.unwrap();

    let cols: Vec<String> = LEGACY_IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
    let dups = wh.duplicate_identities(TABLE, &cols, 10).await.unwrap();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].count, 2);
    assert_eq!(dups[0].values[0], ("region_id".to_string(), Some("06037".to_string())));

    let err = wh
        .execute(&DdlStatement::AddConstraint {
            table: TABLE.into(),
            name: "legacy_key".into(),
            definition: ConstraintDef::unique(&cols),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::UniqueViolation { .. }));
}

#[tokio::test]
async fn test_injected_statement_failure() {
    let wh = MemoryWarehouse::new();
    wh.ensure_base_schema(TABLE).await.unwrap();
    wh.fail_statements("market_time_series_2015", 1);

    let err = wh.execute(&partition(2015)).await.unwrap_err();
    assert!(err.is_transient());
    wh.execute(&partition(2015)).await.unwrap();
    assert_eq!(wh.executed_statements().len(), 1);
}

#[tokio::test]
async fn test_skipped_statement_reports_success() {
    let wh = warehouse_with_2015().await;
    wh.skip_statements("DROP CONSTRAINT", 1);
    let drop = DdlStatement::DropConstraint {
        table: TABLE.into(),
        name: identity_constraint_name(TABLE),
    };

    wh.execute(&drop).await.unwrap();
    assert_eq!(wh.constraints(TABLE).await.unwrap().len(), 1);
    wh.execute(&drop).await.unwrap();
    assert!(wh.constraints(TABLE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_injected_write_failure() {
    let wh = warehouse_with_2015().await;
    wh.fail_writes(1);
    let err = wh.upsert(TABLE, &row("06037", 1.0), ConflictPolicy::Ignore).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(
        wh.upsert(TABLE, &row("06037", 1.0), ConflictPolicy::Ignore).await.unwrap(),
        WriteOutcome::Inserted
    );
}

#[tokio::test]
async fn test_migration_lock_is_exclusive() {
    let wh = MemoryWarehouse::new();
    let lock = wh.acquire_migration_lock().await.unwrap();
    assert!(!wh.migration_lock_available());
    drop(lock);
    assert!(wh.migration_lock_available());
}

#[tokio::test]
async fn test_unknown_table() {
    let wh = MemoryWarehouse::new();
    assert!(!wh.table_exists(TABLE).await.unwrap());
    assert!(matches!(
        wh.constraints(TABLE).await.unwrap_err(),
        DataError::UnknownTable(_)
    ));
    assert!(wh.column(TABLE, "date").await.unwrap().is_none());
}
