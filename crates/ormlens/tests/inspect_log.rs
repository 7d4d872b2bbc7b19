use ormlens::{
    FindingKind, InspectConfig, Inspector, MetadataSet, QueryLog, QueryRecord, Severity,
};
use proptest::prelude::*;
use serde_json::json;

fn inspector() -> Inspector {
    Inspector::new(InspectConfig::default()).expect("default config is valid")
}

fn of_kind(report: &ormlens::Report, kind: FindingKind) -> Vec<&ormlens::Finding> {
    report.findings.iter().filter(|f| f.kind == kind).collect()
}

#[test]
fn six_orders_lookups_give_one_finding() {
    let log = QueryLog::from_records(
        (1..=6)
            .map(|id| {
                QueryRecord::new("SELECT * FROM orders WHERE user_id = ?")
                    .with_params(vec![json!(id)])
                    .with_time(1.5)
            })
            .collect(),
    );
    let report = inspector().inspect(&log, &MetadataSet::new());

    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.kind, FindingKind::NPlusOne);
    assert_eq!(finding.count, 6);
    assert_eq!(finding.total_time_ms, 9.0);
    assert_eq!(report.query_count, 6);
    assert_eq!(report.unique_sql_count, 1);
}

#[test]
fn literal_variants_group_under_one_relation() {
    let mut records: Vec<QueryRecord> = (0..12)
        .map(|_| QueryRecord::new("SELECT * FROM comments WHERE post_id = 7"))
        .collect();
    records.extend((0..12).map(|_| QueryRecord::new("SELECT * FROM comments WHERE post_id = 9")));
    let report = inspector().inspect(&QueryLog::from_records(records), &MetadataSet::new());

    assert_eq!(report.findings.len(), 1, "{:?}", report.findings);
    let finding = &report.findings[0];
    assert_eq!(finding.kind, FindingKind::NPlusOne);
    assert_eq!(finding.title, "N+1 query on comments");
    assert_eq!(finding.count, 24);
    assert_eq!(finding.table.as_deref(), Some("comments"));
    assert_eq!(report.unique_sql_count, 2);
}

#[test]
fn primary_key_loop_reports_lazy_loading_only() {
    let log = QueryLog::from_records(
        (1..=12)
            .map(|id| QueryRecord::new("SELECT * FROM users WHERE id = ?").with_params(vec![json!(id)]))
            .collect(),
    );
    let report = inspector().inspect(&log, &MetadataSet::new());

    assert_eq!(report.findings.len(), 1, "{:?}", report.findings);
    assert_eq!(report.findings[0].kind, FindingKind::LazyLoading);
    assert_eq!(report.findings[0].title, "Lazy loading in loop on users");
}

#[test]
fn repeated_lookup_counts_do_not_change_identity() {
    let mut records: Vec<QueryRecord> = (0..12)
        .map(|_| QueryRecord::new("SELECT * FROM settings WHERE key = 'theme'"))
        .collect();
    records.extend((0..13).map(|_| QueryRecord::new("SELECT * FROM settings WHERE key = 'lang'")));
    let report = inspector().inspect(&QueryLog::from_records(records), &MetadataSet::new());

    assert_eq!(report.findings.len(), 1, "{:?}", report.findings);
    assert_eq!(report.findings[0].kind, FindingKind::QueryCaching);
    assert_eq!(report.findings[0].count, 25);
}

#[test]
fn json_inputs_drive_join_checks() {
    let log = QueryLog::from_json(
        r#"{"queries": [
            {"sql": "SELECT o.total, u.email FROM orders o LEFT OUTER JOIN users u ON u.id = o.user_id",
             "params": [], "execution_time_ms": 4.0,
             "backtrace": [{"file": "src/Controller/OrderController.php", "line": 42, "function": "list"}]},
            {"query": "SELECT u.email, o.total FROM users u LEFT JOIN orders o ON o.user_id = u.id",
             "executionTimeMs": 3.0}
        ]}"#,
    )
    .expect("valid log");
    let metadata = MetadataSet::from_json(
        r#"{"entities": [
            {"name": "User", "table": "users", "identifier": "id", "associations": [
                {"fieldName": "orders", "targetTable": "orders", "type": "OneToMany"}
            ]},
            {"name": "Order", "table": "orders", "identifier": ["id"], "associations": [
                {"fieldName": "user", "targetTable": "users", "type": "ManyToOne",
                 "joinColumns": {"user_id": {"nullable": false}}}
            ]}
        ]}"#,
    )
    .expect("valid metadata");

    let report = inspector().inspect(&log, &metadata);
    let joins = of_kind(&report, FindingKind::JoinOptimization);
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].title, "Suboptimal LEFT JOIN on users");
    assert_eq!(joins[0].severity, Severity::Info);
    let frame = &joins[0].backtrace.as_ref().expect("backtrace kept")[0];
    assert_eq!(frame.line, Some(42));
}

#[test]
fn findings_sorted_critical_first() {
    let mut records = vec![QueryRecord::new("SELECT * FROM reports WHERE year = 2024").with_time(2500.0)];
    records.extend(
        (1..=6).map(|id| QueryRecord::new(format!("SELECT * FROM orders WHERE user_id = {id}"))),
    );
    let report = inspector().inspect(&QueryLog::from_records(records), &MetadataSet::new());

    assert!(report.has_critical());
    assert_eq!(report.findings[0].kind, FindingKind::SlowQuery);
    assert_eq!(report.findings[0].severity, Severity::Critical);
    assert_eq!(report.count_by_severity(Severity::Critical), 1);
}

#[test]
fn disabled_family_reports_nothing() {
    let mut config = InspectConfig::default();
    config.n_plus_one.enabled = false;
    let log = QueryLog::from_records(
        (1..=6)
            .map(|id| QueryRecord::new(format!("SELECT * FROM orders WHERE user_id = {id}")))
            .collect(),
    );
    let report = Inspector::new(config)
        .expect("valid config")
        .inspect(&log, &MetadataSet::new());
    assert!(report.findings.is_empty());
}

#[test]
fn report_serializes_camel_case() {
    let log = QueryLog::from_records(
        (1..=5)
            .map(|id| QueryRecord::new(format!("SELECT * FROM orders WHERE user_id = {id}")))
            .collect(),
    );
    let report = inspector().inspect(&log, &MetadataSet::new());
    let value = serde_json::to_value(&report).expect("serializes");

    assert_eq!(value["queryCount"], 5);
    assert_eq!(value["uniqueSqlCount"], 5);
    assert!(value["cache"]["hitRate"].is_number());
    assert_eq!(value["findings"][0]["kind"], "n_plus_one");
    assert_eq!(value["findings"][0]["suggestionRef"], "eager_loading");
}

proptest! {
    #[test]
    fn repeated_fk_lookups_form_one_group(ids in prop::collection::vec(1i64..100_000, 5..40)) {
        let log = QueryLog::from_records(
            ids.iter()
                .map(|id| QueryRecord::new(format!("SELECT * FROM invoices WHERE customer_id = {id}")))
                .collect(),
        );
        let report = inspector().inspect(&log, &MetadataSet::new());
        prop_assert_eq!(report.findings.len(), 1);
        prop_assert_eq!(report.findings[0].kind, FindingKind::NPlusOne);
        prop_assert_eq!(report.findings[0].count, ids.len());
    }
}
