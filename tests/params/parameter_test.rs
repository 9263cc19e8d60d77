//! Parameters flowing through filters, segments and model SQL.

#[path = "../common/mod.rs"]
mod common;

use serde_json::json;
use tessera::compiler::SqlGenerator;
use tessera::params::{Parameter, ParameterType};
use tessera::semantic::model::{Dimension, Metric, Model, Segment};
use tessera::semantic::{QueryRequest, SemanticError, SemanticGraph};

fn graph() -> SemanticGraph {
    let mut graph = common::ecommerce();
    graph
        .add_parameter(Parameter::new("min_amount", ParameterType::Number).with_default(0))
        .unwrap();
    graph
        .add_parameter(Parameter::new("since", ParameterType::Date).with_default("2024-01-01"))
        .unwrap();
    graph
        .add_parameter(Parameter::new("include_pending", ParameterType::Yesno).with_default(false))
        .unwrap();
    graph
        .add_parameter(
            Parameter::new("tier", ParameterType::String)
                .with_default("enterprise")
                .with_allowed_values(vec![json!("enterprise"), json!("smb")]),
        )
        .unwrap();
    graph
}

fn generate(graph: &SemanticGraph, request: &QueryRequest) -> String {
    let sql = SqlGenerator::new(graph).generate(request).unwrap();
    println!("Generated SQL:\n{}", sql);
    sql
}

#[test]
fn test_number_parameter_in_metric_filter() {
    let graph = graph();
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_dimensions(&["orders.status"])
        .with_filter("orders.revenue > {{ min_amount }}");

    let sql = generate(&graph, &request);
    assert!(sql.contains("HAVING (SUM(\"orders_cte\".\"revenue_raw\")) > 0"), "{}", sql);

    let sql = generate(&graph, &request.with_parameter("min_amount", 250));
    assert!(sql.contains("HAVING (SUM(\"orders_cte\".\"revenue_raw\")) > 250"), "{}", sql);
}

#[test]
fn test_date_parameter() {
    let graph = graph();
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_filter("orders.created_at >= {{ since }}"),
    );
    assert!(sql.contains("\"orders_cte\".\"created_at\" >= '2024-01-01'"), "{}", sql);
}

#[test]
fn test_relative_date_supplied_through_parameter() {
    let graph = graph();
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_filter("orders.created_at >= {{ since }}")
            .with_parameter("since", "last 30 days"),
    );
    assert!(
        sql.contains("\"orders_cte\".\"created_at\" >= CURRENT_DATE - INTERVAL '30 days'"),
        "{}",
        sql
    );
}

#[test]
fn test_template_block_in_filter() {
    let graph = graph();
    let filter = "{% if include_pending %}orders.status IN ('completed', 'pending'){% else %}orders.status = 'completed'{% endif %}";
    let request = QueryRequest::new()
        .with_metrics(&["orders.revenue"])
        .with_filter(filter);

    let sql = generate(&graph, &request);
    assert!(sql.contains("WHERE \"orders_cte\".\"status\" = 'completed'"), "{}", sql);

    let sql = generate(&graph, &request.with_parameter("include_pending", true));
    assert!(
        sql.contains("WHERE \"orders_cte\".\"status\" IN ('completed', 'pending')"),
        "{}",
        sql
    );
}

#[test]
fn test_parameter_in_segment() {
    let mut graph = graph();
    graph
        .add_model(
            Model::new("accounts", "account_id")
                .with_table("accounts")
                .with_dimension(Dimension::categorical("tier"))
                .with_metric(Metric::count("account_count"))
                .with_segment(Segment::new("chosen_tier", "{model}.tier = {{ tier }}")),
        )
        .unwrap();

    let request = QueryRequest::new()
        .with_metrics(&["accounts.account_count"])
        .with_segment("accounts.chosen_tier");
    let sql = generate(&graph, &request);
    assert!(sql.contains("WHERE t.tier = 'enterprise'"), "{}", sql);

    let sql = generate(&graph, &request.with_parameter("tier", "smb"));
    assert!(sql.contains("WHERE t.tier = 'smb'"), "{}", sql);
}

#[test]
fn test_parameter_in_model_sql() {
    let mut graph = graph();
    graph
        .add_parameter(Parameter::new("schema", ParameterType::Unquoted).with_default("analytics"))
        .unwrap();
    graph
        .add_model(
            Model::new("events", "event_id")
                .with_sql("SELECT * FROM {{ schema }}.events")
                .with_dimension(Dimension::categorical("kind"))
                .with_metric(Metric::count("event_count")),
        )
        .unwrap();

    let request = QueryRequest::new()
        .with_metrics(&["events.event_count"])
        .with_dimensions(&["events.kind"])
        .with_parameter("schema", "staging");
    let sql = generate(&graph, &request);
    assert!(sql.contains("FROM (SELECT * FROM staging.events) AS \"t\""), "{}", sql);
}

#[test]
fn test_disallowed_value_is_rejected() {
    let graph = graph();
    let err = SqlGenerator::new(&graph)
        .generate(
            &QueryRequest::new()
                .with_metrics(&["customers.customer_count"])
                .with_filter("customers.tier = {{ tier }}")
                .with_parameter("tier", "startup"),
        )
        .unwrap_err();
    match err {
        SemanticError::InvalidParameterValue { name, message } => {
            assert_eq!(name, "tier");
            assert!(message.contains("allowed values"), "{}", message);
        }
        other => panic!("expected invalid parameter value, got {:?}", other),
    }
}

#[test]
fn test_injection_through_unquoted_is_rejected() {
    let mut graph = graph();
    graph
        .add_parameter(Parameter::new("column", ParameterType::Unquoted).with_default("status"))
        .unwrap();
    let err = SqlGenerator::new(&graph)
        .generate(
            &QueryRequest::new()
                .with_metrics(&["orders.revenue"])
                .with_filter("orders.status = 'x' OR {{ column }} IS NULL")
                .with_parameter("column", "1=1; DROP TABLE orders"),
        )
        .unwrap_err();
    assert!(matches!(err, SemanticError::InvalidParameterValue { .. }));
}

#[test]
fn test_string_values_are_escaped() {
    let graph = common::ecommerce();
    let sql = generate(
        &graph,
        &QueryRequest::new()
            .with_metrics(&["orders.revenue"])
            .with_filter("customers.region = {{ region }}")
            .with_parameter("region", "O'Brien"),
    );
    assert!(sql.contains("\"customers_cte\".\"region\" = 'O''Brien'"), "{}", sql);
}

#[test]
fn test_invalid_default_rejected_on_registration() {
    let mut graph = SemanticGraph::new();
    let err = graph
        .add_parameter(Parameter::new("limit", ParameterType::Number).with_default("lots"))
        .unwrap_err();
    assert!(matches!(err, SemanticError::InvalidParameterValue { .. }));
    assert!(graph.get_parameter("limit").is_err());
}

#[test]
fn test_parameter_deserializes() {
    let json = r#"{"name": "region", "type": "string", "default_value": "US", "allowed_values": ["US", "EU"]}"#;
    let param: Parameter = serde_json::from_str(json).unwrap();
    assert_eq!(param.parameter_type, ParameterType::String);
    assert_eq!(param.format_value(&json!("EU")).unwrap(), "'EU'");
    assert!(param.validate().is_ok());
}
