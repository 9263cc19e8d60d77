//! Pre-aggregation routing through the generator.

#[path = "../common/mod.rs"]
mod common;

use insta::assert_snapshot;
use tessera::compiler::SqlGenerator;
use tessera::config::Settings;
use tessera::preagg::{PreaggScorer, RoutingRequest};
use tessera::semantic::model::{Dimension, PreAggregation};
use tessera::semantic::{QueryRequest, SemanticGraph};

fn revenue_by_status() -> QueryRequest {
    QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_dimensions(&["orders.status"])
        .with_preaggregations(true)
}

#[test]
fn test_explain_routed_query() {
    let graph = common::ecommerce();
    let plan = SqlGenerator::new(&graph)
        .explain(&revenue_by_status())
        .unwrap();

    assert!(plan.used_preaggregation());
    assert_snapshot!(plan.to_string(), @r#"
Query Plan
  Model: orders
  Metrics: orders.revenue
  Dimensions: orders.status

  Routing: using pre-aggregation 'daily'
  Reason: pre-aggregation 'daily' covers the query (score: 1000)

  Candidates:
  > daily (score: 1000, selected)
          [pass] dimension coverage: all dimensions stored
          [pass] granularity compatibility: no time grain requested
          [pass] metric coverage: all 1 metric(s) derivable
          [pass] filter compatibility: no filters
          [pass] time-grain alignment: time dimensions aligned

  SQL:
    SELECT
      "status" AS "status",
      SUM("revenue_raw") AS "revenue"
    FROM "orders_preagg_daily"
    GROUP BY "status"
"#);
}

#[test]
fn test_settings_enable_routing_and_locate_rollups() {
    let graph = common::ecommerce();
    let settings = Settings::from_toml_str(
        r#"
[compiler]
use_preaggregations = true

[preaggregations]
schema = "rollups"
"#,
    )
    .unwrap();

    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_dimensions(&["orders.status"]);
    let sql = SqlGenerator::new(&graph)
        .with_settings(settings.clone())
        .generate(&request)
        .unwrap();
    assert!(sql.contains("FROM \"rollups\".\"orders_preagg_daily\""), "{}", sql);

    let plan = SqlGenerator::new(&graph)
        .with_settings(settings)
        .explain(&request.with_preaggregations(false))
        .unwrap();
    assert!(!plan.used_preaggregation());
    assert_eq!(plan.reason, "pre-aggregation routing disabled");
    assert!(plan.sql.contains("FROM analytics.orders AS \"t\""));
    assert_eq!(plan.candidates[0].name, "daily");
    assert!(plan.candidates[0].matched);
    assert!(!plan.to_string().contains("selected)"));
}

#[test]
fn test_coarser_grain_is_truncated_again() {
    let graph = common::ecommerce();
    let sql = SqlGenerator::new(&graph)
        .generate(
            &QueryRequest::new()
                .with_metrics(&["orders.revenue", "orders.order_count"])
                .with_dimensions(&["orders.created_at__month"])
                .with_preaggregations(true),
        )
        .unwrap();
    assert!(
        sql.contains("DATE_TRUNC('month', \"created_at_day\") AS \"created_at__month\""),
        "{}",
        sql
    );
    assert!(sql.contains("SUM(\"order_count_raw\") AS \"order_count\""));
    assert!(sql.ends_with("GROUP BY DATE_TRUNC('month', \"created_at_day\")"));
}

#[test]
fn test_filter_on_stored_dimension_is_rewritten() {
    let graph = common::ecommerce();
    let sql = SqlGenerator::new(&graph)
        .generate(&revenue_by_status().with_filter("orders.status = 'completed'"))
        .unwrap();
    assert!(sql.contains("FROM \"orders_preagg_daily\""), "{}", sql);
    assert!(sql.contains("WHERE \"status\" = 'completed'"));
}

/// Orders with a `channel` column the `daily` rollup does not store.
fn graph_with_channel() -> SemanticGraph {
    let mut graph = SemanticGraph::new();
    graph.add_model(common::customers()).unwrap();
    graph
        .add_model(common::orders().with_dimension(Dimension::categorical("channel")))
        .unwrap();
    graph
}

#[test]
fn test_in_filter_on_unstored_column_scans_raw_table() {
    let graph = graph_with_channel();
    let plan = SqlGenerator::new(&graph)
        .explain(&revenue_by_status().with_filter("orders.channel IN ('web')"))
        .unwrap();

    assert!(!plan.used_preaggregation());
    assert_eq!(
        plan.candidates[0].checks[3].to_string(),
        "[FAIL] filter compatibility: filter column 'channel' is not stored in the rollup"
    );
    assert!(plan.sql.contains("FROM analytics.orders AS \"t\""), "{}", plan.sql);
    assert!(!plan.sql.contains("orders_preagg_daily"));
}

#[test]
fn test_in_filter_on_stored_column_is_routed() {
    let graph = graph_with_channel();
    let sql = SqlGenerator::new(&graph)
        .generate(&revenue_by_status().with_filter("orders.status IN ('completed', 'pending')"))
        .unwrap();
    assert!(sql.contains("FROM \"orders_preagg_daily\""), "{}", sql);
    assert!(sql.contains("WHERE \"status\" IN ('completed', 'pending')"), "{}", sql);
}

#[test]
fn test_between_on_raw_timestamp_scans_raw_table() {
    let graph = common::ecommerce();
    let plan = SqlGenerator::new(&graph)
        .explain(
            &revenue_by_status()
                .with_filter("orders.created_at BETWEEN '2024-01-01' AND '2024-02-01'"),
        )
        .unwrap();

    assert!(!plan.used_preaggregation());
    let check = &plan.candidates[0].checks[3];
    assert!(!check.passed);
    assert!(check.detail.contains("raw 'created_at'"), "{}", check.detail);
    assert!(!plan.sql.contains("created_at_day"), "{}", plan.sql);
}

#[test]
fn test_between_at_rollup_grain_or_coarser_is_routed() {
    let graph = common::ecommerce();
    let sql = SqlGenerator::new(&graph)
        .generate(
            &revenue_by_status()
                .with_filter("orders.created_at__month BETWEEN '2024-01-01' AND '2024-03-01'"),
        )
        .unwrap();
    assert!(sql.contains("FROM \"orders_preagg_daily\""), "{}", sql);
    assert!(
        sql.contains("WHERE DATE_TRUNC('month', \"created_at_day\") BETWEEN '2024-01-01' AND '2024-03-01'"),
        "{}",
        sql
    );
}

#[test]
fn test_metric_filter_scans_raw_table() {
    let graph = common::ecommerce();
    let plan = SqlGenerator::new(&graph)
        .explain(&revenue_by_status().with_filter("orders.revenue > 100"))
        .unwrap();
    assert!(!plan.used_preaggregation());
    assert_eq!(
        plan.candidates[0].checks[3].detail,
        "filter on metric 'revenue' needs raw rows"
    );
}

#[test]
fn test_unstored_dimension_scans_raw_table() {
    let graph = common::ecommerce();
    let plan = SqlGenerator::new(&graph)
        .explain(
            &QueryRequest::new()
                .with_metrics(&["orders.revenue"])
                .with_dimensions(&["orders.created_at"])
                .with_preaggregations(true),
        )
        .unwrap();

    assert!(!plan.used_preaggregation());
    assert_eq!(plan.reason, "no pre-aggregation matched (1 evaluated)");
    let check = &plan.candidates[0].checks[0];
    assert!(!check.passed);
    assert_eq!(check.detail, "missing created_at");
    assert!(plan.sql.contains("FROM analytics.orders AS \"t\""));
}

#[test]
fn test_segment_blocks_routing() {
    let graph = common::ecommerce();
    let plan = SqlGenerator::new(&graph)
        .explain(&revenue_by_status().with_segment("orders.completed"))
        .unwrap();
    assert!(!plan.used_preaggregation());
    assert_eq!(
        plan.candidates[0].checks[3].to_string(),
        "[FAIL] filter compatibility: segment 'orders.completed' is not stored in rollups"
    );
}

#[test]
fn test_queries_that_are_never_routed() {
    let graph = common::ecommerce();
    let generator = SqlGenerator::new(&graph);

    let plan = generator
        .explain(
            &QueryRequest::new()
                .with_metrics(&["orders.revenue"])
                .with_dimensions(&["customers.region"])
                .with_preaggregations(true),
        )
        .unwrap();
    assert_eq!(plan.reason, "query spans multiple models");
    assert_eq!(plan.model, None);

    let plan = generator
        .explain(&revenue_by_status().ungrouped())
        .unwrap();
    assert_eq!(plan.reason, "ungrouped queries read raw rows");
    assert!(plan.candidates.is_empty());
}

struct Flat(i64);

impl PreaggScorer for Flat {
    fn score(&self, _preagg: &PreAggregation, _request: &RoutingRequest) -> i64 {
        self.0
    }
}

#[test]
fn test_custom_scorer() {
    let graph = common::ecommerce();
    let plan = SqlGenerator::new(&graph)
        .with_scorer(Flat(7))
        .explain(&revenue_by_status())
        .unwrap();
    assert_eq!(
        plan.reason,
        "pre-aggregation 'daily' covers the query (score: 7)"
    );
    assert_eq!(plan.candidates[0].score, Some(7));
}

#[test]
fn test_ordering_and_limit_apply_to_rollup_query() {
    let graph = common::ecommerce();
    let sql = SqlGenerator::new(&graph)
        .generate(
            &revenue_by_status()
                .with_order_by("orders.revenue DESC")
                .with_limit(3),
        )
        .unwrap();
    assert!(sql.contains("FROM \"orders_preagg_daily\""), "{}", sql);
    assert!(sql.ends_with("ORDER BY \"revenue\" DESC\nLIMIT 3"));
}
