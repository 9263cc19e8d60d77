//! End-to-end request → SQL tests against the e-commerce fixture.

#[path = "../common/mod.rs"]
mod common;

use tessera::compiler::SqlGenerator;
use tessera::semantic::{QueryRequest, SemanticError};
use tessera::sql::Dialect;
use tessera::table_calc::{TableCalculation, TableCalculationType};

fn generate(request: &QueryRequest) -> String {
    let graph = common::ecommerce();
    let sql = SqlGenerator::new(&graph).generate(request).unwrap();
    println!("Generated SQL:\n{}", sql);
    sql
}

fn generate_err(request: &QueryRequest) -> SemanticError {
    let graph = common::ecommerce();
    let err = SqlGenerator::new(&graph).generate(request).unwrap_err();
    err
}

// ============================================================================
// Basic shapes
// ============================================================================

#[test]
fn test_simple_metric_by_dimension() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"]),
    );

    assert!(sql.starts_with("WITH \"orders_cte\" AS ("), "{}", sql);
    assert!(sql.contains("FROM analytics.orders AS \"t\""));
    assert!(sql.contains("amount AS \"revenue_raw\""));
    assert!(sql.contains("SUM(\"orders_cte\".\"revenue_raw\") AS \"revenue\""));
    assert!(sql.contains("GROUP BY \"orders_cte\".\"status\""));
}

#[test]
fn test_time_dimension_is_truncated_in_model_cte() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.created_at__month"]),
    );

    assert!(
        sql.contains("DATE_TRUNC('month', created_at) AS \"created_at__month\""),
        "{}",
        sql
    );
    assert!(sql.contains("\"orders_cte\".\"created_at__month\" AS \"created_at__month\""));
}

#[test]
fn test_dimension_only_query_is_distinct() {
    let sql = generate(&QueryRequest::new().with_dimensions(&["orders.status"]));
    assert!(sql.contains("SELECT DISTINCT"), "{}", sql);
    assert!(!sql.contains("GROUP BY"));
}

#[test]
fn test_ungrouped_query_reads_rows() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"])
            .ungrouped(),
    );
    assert!(sql.contains("\"orders_cte\".\"revenue_raw\" AS \"revenue\""), "{}", sql);
    assert!(!sql.contains("SUM("));
    assert!(!sql.contains("GROUP BY"));
}

#[test]
fn test_ratio_guards_zero_denominator() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.aov"])
            .with_dimensions(&["orders.status"]),
    );
    assert!(
        sql.contains(
            "(SUM(\"orders_cte\".\"revenue_raw\")) / NULLIF(COUNT(\"orders_cte\".\"order_count_raw\"), 0) AS \"aov\""
        ),
        "{}",
        sql
    );
}

#[test]
fn test_metric_level_filter_becomes_case_when() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.completed_revenue"])
            .with_dimensions(&["orders.status"]),
    );
    assert!(
        sql.contains("CASE WHEN (t.status = 'completed') THEN amount END AS \"completed_revenue_raw\""),
        "{}",
        sql
    );
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_dimension_from_related_model_is_left_joined() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["customers.region"]),
    );
    assert!(
        sql.contains(
            "LEFT JOIN \"customers_cte\" ON \"orders_cte\".\"customer_id\" = \"customers_cte\".\"customer_id\""
        ),
        "{}",
        sql
    );
    assert!(sql.contains("GROUP BY \"customers_cte\".\"region\""));
}

#[test]
fn test_filtered_model_is_inner_joined() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"])
            .with_filter("customers.region = 'EU'"),
    );
    assert!(sql.contains("INNER JOIN \"customers_cte\""), "{}", sql);
    assert!(sql.contains("WHERE \"customers_cte\".\"region\" = 'EU'"));
}

#[test]
fn test_fan_out_deduplicates_base_rows() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["order_items.sku"]),
    );
    assert!(sql.contains("SELECT DISTINCT"), "{}", sql);
    assert!(sql.contains("AS \"deduped\""));
    assert!(sql.contains("SUM(\"deduped\".\"revenue_raw\") AS \"revenue\""));
}

#[test]
fn test_metrics_from_several_models_are_aggregated_separately() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue", "customers.customer_count"])
            .with_dimensions(&["customers.region"]),
    );
    assert!(sql.contains("\"orders_agg\" AS ("), "{}", sql);
    assert!(sql.contains("\"customers_agg\" AS ("));
    assert!(sql.contains(
        "FULL OUTER JOIN \"customers_agg\" ON \"orders_agg\".\"region\" IS NOT DISTINCT FROM \"customers_agg\".\"region\""
    ));
    assert!(sql.contains(
        "COALESCE(\"orders_agg\".\"region\", \"customers_agg\".\"region\") AS \"region\""
    ));
    assert!(sql.contains("\"orders_agg\".\"revenue\" AS \"revenue\""));
}

#[test]
fn test_mysql_merges_aggregates_with_left_join() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue", "customers.customer_count"])
            .with_dimensions(&["customers.region"])
            .with_dialect(Dialect::MySql),
    );
    assert!(
        sql.contains("LEFT JOIN `customers_agg` ON `orders_agg`.`region` <=> `customers_agg`.`region`"),
        "{}",
        sql
    );
    assert!(!sql.contains("FULL OUTER JOIN"));
}

#[test]
fn test_null_dimension_groups_merge_into_one_row() {
    // Orders without a customer group under a NULL region in both aggregates.
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue", "order_items.quantity"])
        .with_dimensions(&["customers.region"]);

    let sql = generate(&request);
    assert!(
        sql.contains(
            "FULL OUTER JOIN \"order_items_agg\" ON \"orders_agg\".\"region\" IS NOT DISTINCT FROM \"order_items_agg\".\"region\""
        ),
        "{}",
        sql
    );

    let tsql = generate(&request.with_dialect(Dialect::TSql));
    assert!(
        tsql.contains(
            "ON ([orders_agg].[region] = [order_items_agg].[region] OR ([orders_agg].[region] IS NULL AND [order_items_agg].[region] IS NULL))"
        ),
        "{}",
        tsql
    );
}

// ============================================================================
// Filters, segments and parameters
// ============================================================================

#[test]
fn test_segment_filters_model_source() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_segment("orders.completed"),
    );
    assert!(sql.contains("WHERE t.status = 'completed'"), "{}", sql);
}

#[test]
fn test_segment_on_joined_model_restricts_join() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"])
            .with_segment("customers.enterprise"),
    );
    assert!(sql.contains("WHERE t.tier = 'enterprise'"), "{}", sql);
    assert!(sql.contains("INNER JOIN \"customers_cte\""));
}

#[test]
fn test_metric_filter_goes_to_having() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"])
            .with_filter("orders.revenue > 100"),
    );
    assert!(
        sql.contains("HAVING (SUM(\"orders_cte\".\"revenue_raw\")) > 100"),
        "{}",
        sql
    );
}

#[test]
fn test_metric_filter_needs_requested_dimensions() {
    let err = generate_err(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"])
            .with_filter("orders.revenue > 100 OR customers.region = 'EU'"),
    );
    assert!(matches!(err, SemanticError::InvalidReference(_)), "{:?}", err);
}

#[test]
fn test_parameters_are_interpolated() {
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_filter("customers.region = {{ region }}");
    assert!(generate(&request).contains("\"customers_cte\".\"region\" = 'US'"));

    let sql = generate(&request.with_parameter("region", "EU"));
    assert!(sql.contains("\"customers_cte\".\"region\" = 'EU'"), "{}", sql);
}

#[test]
fn test_relative_date_filter() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_filter("orders.created_at >= 'last 7 days'"),
    );
    assert!(
        sql.contains("\"orders_cte\".\"created_at\" >= CURRENT_DATE - INTERVAL '7 days'"),
        "{}",
        sql
    );
}

// ============================================================================
// Window metrics
// ============================================================================

#[test]
fn test_cumulative_metric_wraps_base_query() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.running_revenue"])
            .with_dimensions(&["orders.created_at__month"]),
    );
    assert!(sql.contains("\"base\" AS ("), "{}", sql);
    assert!(sql.contains("AS \"running_revenue_input\""));
    assert!(sql.contains(
        "SUM(\"base\".\"running_revenue_input\") OVER (ORDER BY \"base\".\"created_at__month\" ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS \"running_revenue\""
    ));
}

#[test]
fn test_grain_to_date_partitions_by_period() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.mtd_revenue"])
            .with_dimensions(&["orders.created_at__day"]),
    );
    assert!(
        sql.contains("PARTITION BY DATE_TRUNC('month', \"base\".\"created_at__day\")"),
        "{}",
        sql
    );
}

#[test]
fn test_rolling_window_uses_range_frame() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.rolling_revenue"])
            .with_dimensions(&["orders.created_at__day"]),
    );
    assert!(
        sql.contains("RANGE BETWEEN INTERVAL '7 days' PRECEDING AND CURRENT ROW"),
        "{}",
        sql
    );

    let err = generate_err(
        &QueryRequest::new()
            .with_metrics(&["orders.rolling_revenue"])
            .with_dimensions(&["orders.created_at__day"])
            .with_dialect(Dialect::TSql),
    );
    assert!(matches!(err, SemanticError::UnsupportedMetric { .. }));
}

#[test]
fn test_time_comparison_lags_prior_period() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue", "orders.revenue_mom"])
            .with_dimensions(&["orders.created_at__month"]),
    );
    assert!(
        sql.contains("LAG(\"base\".\"revenue_mom_input\") OVER (ORDER BY \"base\".\"created_at__month\")"),
        "{}",
        sql
    );
    assert!(sql.contains("\"base\".\"revenue\" AS \"revenue\""));
}

#[test]
fn test_window_metrics_partition_by_other_dimensions() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue_mom", "orders.running_revenue", "orders.mtd_revenue"])
            .with_dimensions(&["orders.created_at__month", "orders.status"]),
    );
    assert!(
        sql.contains(
            "LAG(\"base\".\"revenue_mom_input\") OVER (PARTITION BY \"base\".\"status\" ORDER BY \"base\".\"created_at__month\")"
        ),
        "{}",
        sql
    );
    assert!(
        sql.contains(
            "SUM(\"base\".\"running_revenue_input\") OVER (PARTITION BY \"base\".\"status\" ORDER BY \"base\".\"created_at__month\" ROWS"
        ),
        "{}",
        sql
    );
    assert!(
        sql.contains("PARTITION BY \"base\".\"status\", DATE_TRUNC('month', \"base\".\"created_at__month\")"),
        "{}",
        sql
    );
}

#[test]
fn test_window_metric_needs_time_dimension() {
    let err = generate_err(
        &QueryRequest::new()
            .with_metrics(&["orders.running_revenue"])
            .with_dimensions(&["orders.status"]),
    );
    assert!(matches!(err, SemanticError::UnsupportedMetric { .. }), "{:?}", err);
}

// ============================================================================
// Validation, ordering and output columns
// ============================================================================

#[test]
fn test_validation_reports_every_problem() {
    let err = generate_err(
        &QueryRequest::new()
            .with_metrics(&["orders.nope", "customers.missing"])
            .with_dimensions(&["orders.status"]),
    );
    match err {
        SemanticError::QueryValidation(e) => assert_eq!(e.messages.len(), 2, "{:?}", e.messages),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_tsql_pagination() {
    let sql = generate(
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_dimensions(&["orders.status"])
            .with_order_by("orders.revenue DESC")
            .with_limit(10)
            .with_dialect(Dialect::TSql),
    );
    assert!(sql.contains("ORDER BY [revenue] DESC"), "{}", sql);
    assert!(sql.ends_with("OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"));
}

#[test]
fn test_output_columns_in_request_order() {
    let graph = common::ecommerce();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue", "orders.order_count"])
        .with_dimensions(&["customers.region", "orders.created_at__month"])
        .with_table_calculation(
            TableCalculation::new("share", TableCalculationType::PercentOfTotal)
                .with_field("revenue"),
        );
    let columns = SqlGenerator::new(&graph).output_columns(&request).unwrap();
    assert_eq!(
        columns,
        vec!["region", "created_at__month", "revenue", "order_count", "share"]
    );
}

#[test]
fn test_same_request_same_sql() {
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue", "customers.customer_count"])
        .with_dimensions(&["customers.region", "orders.status"]);
    assert_eq!(generate(&request), generate(&request));
}
