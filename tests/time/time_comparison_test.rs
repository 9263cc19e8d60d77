//! Period-over-period metrics and relative date filters, end to end.

#[path = "../common/mod.rs"]
mod common;

use tessera::compiler::SqlGenerator;
use tessera::semantic::model::Metric;
use tessera::semantic::{QueryRequest, SemanticError, SemanticGraph};
use tessera::sql::Dialect;
use tessera::time::{ComparisonCalculation, ComparisonType, TimeComparison, TimeUnit};

fn graph_with(metrics: Vec<Metric>) -> SemanticGraph {
    let mut orders = common::orders();
    for metric in metrics {
        orders = orders.with_metric(metric);
    }
    let mut graph = SemanticGraph::new();
    graph.add_model(common::customers()).unwrap();
    graph.add_model(orders).unwrap();
    graph
}

fn generate(graph: &SemanticGraph, request: &QueryRequest) -> String {
    let sql = SqlGenerator::new(graph).generate(request).unwrap();
    println!("Generated SQL:\n{}", sql);
    sql
}

#[test]
fn test_yoy_at_daily_grain_looks_back_a_year_of_rows() {
    let graph = graph_with(vec![Metric::time_comparison(
        "revenue_yoy",
        TimeComparison::new(ComparisonType::Yoy, "revenue"),
    )]);
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue_yoy"])
            .with_dimensions(&["orders.created_at__day"]),
    );

    let lag = "LAG(\"base\".\"revenue_yoy_input\", 365) OVER (ORDER BY \"base\".\"created_at__day\")";
    assert!(
        sql.contains(&format!(
            "((\"base\".\"revenue_yoy_input\" - {lag}) / NULLIF({lag}, 0) * 100) AS \"revenue_yoy\""
        )),
        "{}",
        sql
    );
    assert!(sql.contains("SUM(\"orders_cte\".\"revenue_raw\") AS \"revenue_yoy_input\""));
}

#[test]
fn test_yoy_at_monthly_grain() {
    let graph = graph_with(vec![Metric::time_comparison(
        "revenue_yoy",
        TimeComparison::new(ComparisonType::Yoy, "revenue"),
    )]);
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue_yoy"])
            .with_dimensions(&["orders.created_at__month"]),
    );
    assert!(sql.contains("LAG(\"base\".\"revenue_yoy_input\", 12)"), "{}", sql);
}

#[test]
fn test_difference_with_custom_offset() {
    let comparison = TimeComparison::new(ComparisonType::PriorPeriod, "revenue")
        .with_offset(2, TimeUnit::Week)
        .unwrap()
        .with_calculation(ComparisonCalculation::Difference);
    let graph = graph_with(vec![Metric::time_comparison("revenue_vs_2w", comparison)]);
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue_vs_2w"])
            .with_dimensions(&["orders.created_at__week"]),
    );
    assert!(
        sql.contains(
            "(\"base\".\"revenue_vs_2w_input\" - LAG(\"base\".\"revenue_vs_2w_input\", 2) OVER (ORDER BY \"base\".\"created_at__week\")) AS \"revenue_vs_2w\""
        ),
        "{}",
        sql
    );
}

#[test]
fn test_ratio_of_derived_base_metric() {
    let graph = graph_with(vec![Metric::time_comparison(
        "aov_wow",
        TimeComparison::new(ComparisonType::Wow, "aov").with_calculation(ComparisonCalculation::Ratio),
    )]);
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.aov_wow"])
            .with_dimensions(&["orders.created_at__week"]),
    );
    assert!(
        sql.contains("NULLIF(COUNT(\"orders_cte\".\"order_count_raw\"), 0) AS \"aov_wow_input\""),
        "{}",
        sql
    );
    assert!(sql.contains(
        "(\"base\".\"aov_wow_input\" / NULLIF(LAG(\"base\".\"aov_wow_input\") OVER (ORDER BY \"base\".\"created_at__week\"), 0)) AS \"aov_wow\""
    ));
}

#[test]
fn test_comparison_alongside_plain_metrics_and_dimensions() {
    let graph = common::ecommerce();
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue_mom", "orders.order_count"])
            .with_dimensions(&["orders.created_at__month", "orders.status"]),
    );
    assert!(sql.contains("\"base\".\"status\" AS \"status\""), "{}", sql);
    assert!(sql.contains("\"base\".\"order_count\" AS \"order_count\""));
    assert!(sql.contains("FROM \"base\""));
}

#[test]
fn test_comparison_without_time_dimension_fails() {
    let graph = common::ecommerce();
    let err = SqlGenerator::new(&graph)
        .generate(
            &QueryRequest::new()
                .with_metrics(&["orders.revenue_mom"])
                .with_dimensions(&["orders.status"]),
        )
        .unwrap_err();
    match err {
        SemanticError::UnsupportedMetric { metric, reason } => {
            assert_eq!(metric, "orders.revenue_mom");
            assert!(reason.contains("time dimension"), "{}", reason);
        }
        other => panic!("expected unsupported metric, got {:?}", other),
    }
}

#[test]
fn test_comparison_in_ungrouped_query_fails() {
    let graph = common::ecommerce();
    let err = SqlGenerator::new(&graph)
        .generate(
            &QueryRequest::new()
                .with_metrics(&["orders.revenue_mom"])
                .with_dimensions(&["orders.created_at__month"])
                .ungrouped(),
        )
        .unwrap_err();
    assert!(matches!(err, SemanticError::UnsupportedMetric { .. }));
}

#[test]
fn test_comparison_deserializes_with_metric() {
    let json = r#"{
        "name": "revenue_qoq",
        "type": "time_comparison",
        "comparison": {"type": "qoq", "metric": "revenue", "calculation": "difference"}
    }"#;
    let metric: Metric = serde_json::from_str(json).unwrap();
    let comparison = metric.comparison.unwrap();
    assert_eq!(comparison.comparison_type, ComparisonType::Qoq);
    assert_eq!(comparison.calculation, ComparisonCalculation::Difference);
    assert_eq!(comparison.offset_interval(), (1, TimeUnit::Quarter));
}

// ============================================================================
// Relative dates
// ============================================================================

#[test]
fn test_calendar_period_filter_expands_to_range() {
    let graph = common::ecommerce();
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_filter("orders.created_at = 'this month'"),
    );
    assert!(
        sql.contains(
            "WHERE \"orders_cte\".\"created_at\" >= DATE_TRUNC('month', CURRENT_DATE) AND \"orders_cte\".\"created_at\" < DATE_TRUNC('month', CURRENT_DATE) + INTERVAL '1 month'"
        ),
        "{}",
        sql
    );
}

#[test]
fn test_relative_dates_follow_dialect() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_filter("orders.created_at >= 'last 7 days'");

    let bigquery = generate(&graph, &request.clone().with_dialect(Dialect::BigQuery));
    assert!(bigquery.contains(">= DATE_SUB(CURRENT_DATE(), INTERVAL 7 DAY)"), "{}", bigquery);

    let tsql = generate(&graph, &request.with_dialect(Dialect::TSql));
    assert!(tsql.contains(">= DATEADD(day, -7, CAST(GETDATE() AS DATE))"), "{}", tsql);
}

#[test]
fn test_non_relative_literal_untouched() {
    let graph = common::ecommerce();
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_filter("orders.created_at >= '2024-01-01'"),
    );
    assert!(sql.contains("\"orders_cte\".\"created_at\" >= '2024-01-01'"), "{}", sql);
}
