//! Shared fixtures: a small e-commerce graph.
//!
//! ```text
//! customers 1 ──< orders 1 ──< order_items >── 1 products
//! ```

#![allow(dead_code)]

use tessera::params::{Parameter, ParameterType};
use tessera::semantic::model::{
    Dimension, Metric, Model, PreAggregation, Relationship, Segment,
};
use tessera::semantic::{Granularity, SemanticGraph};
use tessera::time::{ComparisonType, TimeComparison};

pub fn customers() -> Model {
    Model::new("customers", "customer_id")
        .with_table("customers")
        .with_dimension(Dimension::categorical("region"))
        .with_dimension(Dimension::categorical("tier"))
        .with_metric(Metric::count_distinct("customer_count", "customer_id"))
        .with_segment(Segment::new("enterprise", "{model}.tier = 'enterprise'"))
}

pub fn orders() -> Model {
    Model::new("orders", "order_id")
        .with_table("analytics.orders")
        .with_dimension(Dimension::categorical("status"))
        .with_dimension(Dimension::time("created_at", Granularity::Day))
        .with_metric(Metric::sum("revenue", "amount"))
        .with_metric(Metric::count("order_count"))
        .with_metric(Metric::avg("avg_order_value", "amount"))
        .with_metric(Metric::ratio("aov", "revenue", "order_count"))
        .with_metric(
            Metric::sum("completed_revenue", "amount").with_filter("{model}.status = 'completed'"),
        )
        .with_metric(Metric::cumulative("running_revenue", "revenue"))
        .with_metric(
            Metric::cumulative("mtd_revenue", "revenue").with_grain_to_date(Granularity::Month),
        )
        .with_metric(Metric::cumulative("rolling_revenue", "revenue").with_window("7 days"))
        .with_metric(Metric::time_comparison(
            "revenue_mom",
            TimeComparison::new(ComparisonType::Mom, "revenue"),
        ))
        .with_relationship(Relationship::many_to_one("customers").with_foreign_key("customer_id"))
        .with_segment(Segment::new("completed", "{model}.status = 'completed'"))
        .with_pre_aggregation(
            PreAggregation::new("daily")
                .with_measures(&["revenue", "order_count"])
                .with_dimensions(&["status"])
                .with_time_dimension("created_at", Granularity::Day),
        )
}

pub fn order_items() -> Model {
    Model::new("order_items", "item_id")
        .with_table("order_items")
        .with_dimension(Dimension::categorical("sku"))
        .with_metric(Metric::sum("quantity", "quantity"))
        .with_relationship(Relationship::many_to_one("orders").with_foreign_key("order_id"))
        .with_relationship(Relationship::many_to_one("products").with_foreign_key("product_id"))
}

pub fn products() -> Model {
    Model::new("products", "product_id")
        .with_table("products")
        .with_dimension(Dimension::categorical("category"))
}

/// Every fixture model plus a `region` parameter.
pub fn ecommerce() -> SemanticGraph {
    let mut graph = SemanticGraph::new();
    for model in [customers(), orders(), order_items(), products()] {
        graph.add_model(model).unwrap();
    }
    graph
        .add_parameter(Parameter::new("region", ParameterType::String).with_default("US"))
        .unwrap();
    graph
}
