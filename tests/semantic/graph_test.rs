//! Semantic graph: registration, reference resolution and join paths.

#[path = "../common/mod.rs"]
mod common;

use tessera::params::{Parameter, ParameterType};
use tessera::semantic::model::{Dimension, Metric, Model, Relationship, RelationshipType};
use tessera::semantic::{Granularity, SemanticError, SemanticGraph};

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_readding_identical_model_is_noop() {
    let mut graph = common::ecommerce();
    graph.add_model(common::orders()).unwrap();
    assert_eq!(graph.models().count(), 4);
}

#[test]
fn test_conflicting_model_is_rejected() {
    let mut graph = common::ecommerce();
    let err = graph
        .add_model(common::orders().with_dimension(Dimension::categorical("channel")))
        .unwrap_err();
    assert_eq!(
        err,
        SemanticError::Duplicate {
            kind: "Model",
            name: "orders".to_string()
        }
    );
    assert!(graph
        .get_model("orders")
        .unwrap()
        .get_dimension("channel")
        .is_none());
}

#[test]
fn test_invalid_model_changes_nothing() {
    let mut graph = common::ecommerce();
    let bad = Model::new("refunds", "refund_id")
        .with_relationship(Relationship::many_to_one("orders").with_foreign_key("order_id"));

    let err = graph.add_model(bad).unwrap_err();
    match err {
        SemanticError::ModelValidation(e) => {
            assert_eq!(e.model, "refunds");
            assert!(e.messages[0].contains("must have either 'table' or 'sql'"));
        }
        other => panic!("expected model validation error, got {:?}", other),
    }
    assert!(!graph.has_model("refunds"));
    assert_eq!(
        graph.find_relationship_path("orders", "refunds").unwrap_err(),
        SemanticError::ModelNotFound("refunds".to_string())
    );
}

#[test]
fn test_graph_metric_validated_against_graph() {
    let mut graph = common::ecommerce();
    let err = graph
        .add_metric(Metric::ratio("bad_ratio", "orders.revenue", "orders.missing"))
        .unwrap_err();
    assert!(matches!(err, SemanticError::MetricValidation(_)), "{:?}", err);
    assert!(graph.get_metric("bad_ratio").is_err());

    graph
        .add_metric(Metric::ratio("good_ratio", "orders.revenue", "orders.order_count"))
        .unwrap();
    assert!(graph.get_metric("good_ratio").is_ok());
}

#[test]
fn test_duplicate_parameter() {
    let mut graph = common::ecommerce();
    let err = graph
        .add_parameter(Parameter::new("region", ParameterType::String).with_default("EU"))
        .unwrap_err();
    assert!(matches!(err, SemanticError::Duplicate { kind: "Parameter", .. }));
}

#[test]
fn test_relationship_to_later_model_is_linked_once_it_exists() {
    let mut graph = SemanticGraph::new();
    graph
        .add_model(
            Model::new("orders", "order_id")
                .with_table("orders")
                .with_relationship(Relationship::many_to_one("customers").with_foreign_key("customer_id")),
        )
        .unwrap();
    graph
        .add_model(Model::new("customers", "customer_id").with_table("customers"))
        .unwrap();

    assert!(graph.has_path("orders", "customers"));
    assert!(graph.has_path("customers", "orders"));
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_resolve_references() {
    let graph = common::ecommerce();

    let metric = graph.resolve_metric("orders.revenue", None).unwrap();
    assert_eq!(metric.canonical_name(), "orders.revenue");
    assert_eq!(metric.model_name(), Some("orders"));

    let dim = graph.resolve_dimension("orders.created_at__week").unwrap();
    assert_eq!(dim.granularity, Some(Granularity::Week));
    assert_eq!(dim.alias(), "created_at__week");

    let (model, segment) = graph.resolve_segment("customers.enterprise").unwrap();
    assert_eq!(model.name, "customers");
    assert_eq!(segment.name, "enterprise");
}

#[test]
fn test_resolve_errors() {
    let graph = common::ecommerce();

    assert_eq!(
        graph.resolve_metric("nowhere.revenue", None).unwrap_err(),
        SemanticError::ModelNotFound("nowhere".to_string())
    );
    assert_eq!(
        graph.resolve_segment("orders.vip").unwrap_err(),
        SemanticError::SegmentNotFound("orders.vip".to_string())
    );
    assert!(matches!(
        graph.resolve_dimension("status"),
        Err(SemanticError::InvalidReference(_))
    ));
    assert!(matches!(
        graph.resolve_dimension("orders.status__day"),
        Err(SemanticError::InvalidReference(_))
    ));
}

// ============================================================================
// Join paths
// ============================================================================

#[test]
fn test_two_hop_path_through_orders() {
    let graph = common::ecommerce();
    let path = graph
        .find_relationship_path("customers", "order_items")
        .unwrap();

    assert_eq!(path.models(), vec!["customers", "orders", "order_items"]);
    assert_eq!(path.steps[0].from_key, "customer_id");
    assert_eq!(path.steps[0].to_key, "customer_id");
    assert_eq!(path.steps[0].relationship, RelationshipType::OneToMany);
    assert_eq!(path.steps[1].from_key, "order_id");
    assert_eq!(path.steps[1].to_key, "order_id");
    assert!(path.causes_fanout());
}

#[test]
fn test_many_to_one_path_does_not_fan_out() {
    let graph = common::ecommerce();
    let path = graph
        .find_relationship_path("order_items", "customers")
        .unwrap();
    assert_eq!(path.len(), 2);
    assert!(!path.causes_fanout());
}

#[test]
fn test_disconnected_model_has_no_path() {
    let mut graph = common::ecommerce();
    graph
        .add_model(Model::new("suppliers", "supplier_id").with_table("suppliers"))
        .unwrap();

    assert!(!graph.has_path("orders", "suppliers"));
    assert_eq!(
        graph.find_relationship_path("orders", "suppliers").unwrap_err(),
        SemanticError::NoPath {
            from: "orders".to_string(),
            to: "suppliers".to_string()
        }
    );
}

#[test]
fn test_join_tree_reaches_every_target_once() {
    let graph = common::ecommerce();
    let tree = graph
        .find_join_tree("order_items", &["customers", "products", "orders"])
        .unwrap();
    assert_eq!(tree.len(), 3);
    let mut models = tree.models();
    models.sort();
    assert_eq!(models, vec!["customers", "order_items", "orders", "products"]);
}

// ============================================================================
// Dependencies
// ============================================================================

#[test]
fn test_metric_dependencies_and_models() {
    let mut graph = common::ecommerce();
    graph
        .add_metric(Metric::derived(
            "revenue_per_customer",
            "orders.revenue / customers.customer_count",
        ))
        .unwrap();

    let metric = graph.get_metric("revenue_per_customer").unwrap();
    assert_eq!(
        graph.metric_dependencies(metric, None),
        vec!["orders.revenue", "customers.customer_count"]
    );
    let mut models = graph.metric_models("revenue_per_customer", None).unwrap();
    models.sort();
    assert_eq!(models, vec!["customers", "orders"]);

    let ratio = graph.get_model("orders").unwrap().get_metric("aov").unwrap();
    assert_eq!(
        graph.metric_dependencies(ratio, Some("orders")),
        vec!["revenue", "order_count"]
    );
}
