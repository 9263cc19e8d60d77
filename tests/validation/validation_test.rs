//! Model, metric and query validation messages.

#[path = "../common/mod.rs"]
mod common;

use tessera::semantic::model::{Dimension, Metric, Model, PreAggregation};
use tessera::semantic::{Granularity, QueryRequest, SemanticGraph};
use tessera::table_calc::{TableCalculation, TableCalculationType};
use tessera::time::{ComparisonType, TimeComparison};
use tessera::validation::{validate_metric, validate_model, validate_query};

// ============================================================================
// Models
// ============================================================================

#[test]
fn test_valid_fixture_models() {
    for model in [
        common::customers(),
        common::orders(),
        common::order_items(),
        common::products(),
    ] {
        assert!(validate_model(&model).is_ok(), "{}", model.name);
    }
}

#[test]
fn test_time_dimension_without_granularity() {
    let mut created = Dimension::time("created_at", Granularity::Day);
    created.granularity = None;
    let model = Model::new("events", "event_id")
        .with_table("events")
        .with_dimension(created);

    let err = validate_model(&model).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["Model 'events': time dimension 'created_at' should have a granularity defined"]
    );
}

#[test]
fn test_duplicate_metric_names() {
    let model = Model::new("orders", "order_id")
        .with_table("orders")
        .with_metric(Metric::sum("revenue", "amount"))
        .with_metric(Metric::sum("revenue", "total"));

    let err = validate_model(&model).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["Model 'orders': duplicate metric name 'revenue'"]
    );
}

#[test]
fn test_pre_aggregation_references() {
    let model = Model::new("orders", "order_id")
        .with_table("orders")
        .with_dimension(Dimension::categorical("status"))
        .with_metric(Metric::sum("revenue", "amount"))
        .with_pre_aggregation(
            PreAggregation::new("daily")
                .with_measures(&["revenue", "profit"])
                .with_dimensions(&["channel"])
                .with_time_dimension("status", Granularity::Day),
        );

    let err = validate_model(&model).unwrap_err();
    assert_eq!(err.messages.len(), 3, "{:?}", err.messages);
    assert!(err.messages[0].contains("unknown metric 'profit'"));
    assert!(err.messages[1].contains("unknown dimension 'channel'"));
    assert!(err.messages[2].contains("'status' is not a time dimension"));
}

#[test]
fn test_model_error_display_lists_messages() {
    let err = validate_model(&Model::new("empty", "id")).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("empty"), "{}", text);
    assert!(text.contains("must have either 'table' or 'sql' defined"), "{}", text);
}

// ============================================================================
// Metrics
// ============================================================================

#[test]
fn test_window_and_grain_to_date_are_exclusive() {
    let graph = common::ecommerce();
    let metric = Metric::cumulative("odd", "revenue")
        .with_window("7 days")
        .with_grain_to_date(Granularity::Month);

    let err = validate_metric(&graph, &metric, Some("orders")).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["Cumulative metric 'odd' cannot combine 'window' and 'grain_to_date'"]
    );
}

#[test]
fn test_unparseable_window() {
    let graph = common::ecommerce();
    let metric = Metric::cumulative("odd", "revenue").with_window("a week or so");

    let err = validate_metric(&graph, &metric, Some("orders")).unwrap_err();
    assert_eq!(err.messages.len(), 1);
    assert!(err.messages[0].starts_with("Cumulative metric 'odd': "), "{:?}", err.messages);
}

#[test]
fn test_time_comparison_base_metric_must_exist() {
    let graph = common::ecommerce();
    let metric = Metric::time_comparison(
        "profit_yoy",
        TimeComparison::new(ComparisonType::Yoy, "profit"),
    );

    let err = validate_metric(&graph, &metric, Some("orders")).unwrap_err();
    assert!(
        err.messages
            .contains(&"Time comparison metric 'profit_yoy': base metric 'profit' not found".to_string()),
        "{:?}",
        err.messages
    );
}

#[test]
fn test_derived_unknown_reference() {
    let graph = common::ecommerce();
    let metric = Metric::derived("margin", "${profit} / orders.revenue");

    let err = validate_metric(&graph, &metric, None).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["Derived metric 'margin' references unknown metric 'profit'"]
    );
}

#[test]
fn test_graph_level_aggregate_needs_model() {
    let graph = SemanticGraph::new();
    let err = validate_metric(&graph, &Metric::sum("revenue", "amount"), None).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["Metric 'revenue' aggregates rows but is not attached to a model"]
    );
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_valid_query() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue", "customers.customer_count"])
        .with_dimensions(&["products.category", "orders.created_at__quarter"])
        .with_segment("orders.completed")
        .with_filter("customers.region = 'EU'")
        .with_order_by("revenue DESC");
    assert!(validate_query(&graph, &request).is_ok());
}

#[test]
fn test_empty_query() {
    let graph = common::ecommerce();
    let err = validate_query(&graph, &QueryRequest::new()).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["Query must request at least one metric or dimension"]
    );
}

#[test]
fn test_unknown_model_in_references() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["invoices.total"])
        .with_dimensions(&["invoices.number", "orders"]);

    let err = validate_query(&graph, &request).unwrap_err();
    assert_eq!(
        err.messages,
        vec![
            "Model 'invoices' not found (referenced in 'invoices.total')",
            "Model 'invoices' not found (referenced in 'invoices.number')",
            "Dimension reference 'orders' must be in 'model.dimension' format",
        ]
    );
}

#[test]
fn test_filter_and_segment_references() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_filter("orders.channel = 'web'")
        .with_segment("orders.vip");

    let err = validate_query(&graph, &request).unwrap_err();
    assert_eq!(err.messages.len(), 2, "{:?}", err.messages);
    assert_eq!(err.messages[0], "Segment 'orders.vip' not found");
    assert_eq!(
        err.messages[1],
        "Filter 'orders.channel = 'web'' references 'orders.channel', which is not a dimension or metric of model 'orders'"
    );
}

#[test]
fn test_order_by_accepts_table_calculations() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_dimensions(&["orders.status"])
        .with_table_calculation(
            TableCalculation::new("revenue_rank", TableCalculationType::Rank).with_field("revenue"),
        )
        .with_order_by("revenue_rank")
        .with_order_by("orders.status ASC");
    assert!(validate_query(&graph, &request).is_ok());
}

#[test]
fn test_invalid_table_calculation() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_table_calculation(TableCalculation::new(
            "share",
            TableCalculationType::PercentOfTotal,
        ));

    let err = validate_query(&graph, &request).unwrap_err();
    assert_eq!(
        err.messages,
        vec!["percent_of_total calculation 'share' missing field"]
    );
}

#[test]
fn test_circular_metric_in_query() {
    let mut graph = SemanticGraph::new();
    graph
        .add_model(
            Model::new("orders", "order_id")
                .with_table("orders")
                .with_metric(Metric::derived("a", "b + 1"))
                .with_metric(Metric::derived("b", "a + 1")),
        )
        .unwrap();

    let request = QueryRequest::new().with_metrics(&["orders.a"]);
    let err = validate_query(&graph, &request).unwrap_err();
    assert_eq!(err.messages.len(), 1, "{:?}", err.messages);
    assert!(err.messages[0].starts_with("Derived metric 'a' has circular dependency: "));
}
