//! Table calculations over fetched result rows.

use tessera::table_calc::{TableCalculation, TableCalculationProcessor, TableCalculationType, Value};

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn column(rows: &[Vec<Value>], i: usize) -> Vec<Value> {
    rows.iter().map(|r| r[i].clone()).collect()
}

fn float(value: &Value) -> f64 {
    value.as_f64().unwrap_or_else(|| panic!("expected a number, got {:?}", value))
}

fn assert_close(value: &Value, expected: f64) {
    let actual = float(value);
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {} but got {}",
        expected,
        actual
    );
}

#[test]
fn test_formula_profit_margin() {
    let calc = TableCalculation::formula("profit_margin", "(${revenue} - ${cost}) / ${revenue} * 100");
    let rows = vec![
        vec![Value::Int(100), Value::Int(60)],
        vec![Value::Int(200), Value::Int(150)],
    ];

    let (rows, cols) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["revenue", "cost"]))
        .unwrap();

    assert_eq!(cols, vec!["revenue", "cost", "profit_margin"]);
    assert_eq!(rows.len(), 2);
    assert_close(&rows[0][2], 40.0);
    assert_eq!(rows[1][2], Value::Float(25.0));
}

#[test]
fn test_formula_operators() {
    let cases = [
        ("${a} + ${b}", Value::Int(-5)),
        ("${a} // ${b}", Value::Int(-4)),
        ("${a} % ${b}", Value::Int(1)),
        ("${b} ** 3", Value::Int(8)),
        ("-(${a} - 1) * 2.5", Value::Float(20.0)),
        ("((${a}))", Value::Int(-7)),
    ];
    for (expression, expected) in cases {
        let (rows, _) = TableCalculationProcessor::new(vec![TableCalculation::formula("out", expression)])
            .process(vec![vec![Value::Int(-7), Value::Int(2)]], columns(&["a", "b"]))
            .unwrap();
        assert_eq!(rows[0][2], expected, "{}", expression);
    }
}

#[test]
fn test_formula_nulls_read_as_zero_and_unknown_columns_give_null() {
    let rows = vec![
        vec![Value::Int(10), Value::Null],
        vec![Value::Null, Value::Int(5)],
    ];
    let calcs = vec![
        TableCalculation::formula("total", "${a} + ${b}"),
        TableCalculation::formula("broken", "${a} + ${missing}"),
    ];

    let (rows, cols) = TableCalculationProcessor::new(calcs)
        .process(rows, columns(&["a", "b"]))
        .unwrap();

    assert_eq!(cols, vec!["a", "b", "total", "broken"]);
    assert_eq!(column(&rows, 2), vec![Value::Int(10), Value::Int(5)]);
    assert_eq!(column(&rows, 3), vec![Value::Null, Value::Null]);
}

#[test]
fn test_percent_of_total() {
    let calc =
        TableCalculation::new("pct_of_total", TableCalculationType::PercentOfTotal).with_field("revenue");
    let rows = vec![
        vec![Value::from("A"), Value::Int(100)],
        vec![Value::from("B"), Value::Int(200)],
        vec![Value::from("C"), Value::Int(700)],
    ];

    let (rows, _) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["category", "revenue"]))
        .unwrap();

    assert_close(&rows[0][2], 10.0);
    assert_close(&rows[1][2], 20.0);
    assert_close(&rows[2][2], 70.0);
}

#[test]
fn test_percent_of_total_with_zero_total() {
    let calc = TableCalculation::new("share", TableCalculationType::PercentOfTotal).with_field("v");
    let rows = vec![vec![Value::Null], vec![Value::Int(0)]];

    let (rows, _) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["v"]))
        .unwrap();

    assert_eq!(column(&rows, 1), vec![Value::Float(0.0), Value::Float(0.0)]);
}

#[test]
fn test_percent_of_previous() {
    let calc =
        TableCalculation::new("pct_change", TableCalculationType::PercentOfPrevious).with_field("value");
    let rows = vec![
        vec![Value::Int(100)],
        vec![Value::Int(150)],
        vec![Value::Int(120)],
        vec![Value::Null],
        vec![Value::Int(0)],
        vec![Value::Int(40)],
    ];

    let (rows, _) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["value"]))
        .unwrap();

    assert_eq!(rows[0][1], Value::Null);
    assert_close(&rows[1][1], 50.0);
    assert_close(&rows[2][1], -20.0);
    assert_eq!(rows[3][1], Value::Null);
    assert_eq!(rows[4][1], Value::Null);
    assert_eq!(rows[5][1], Value::Null);
}

#[test]
fn test_percent_of_column_total_by_partition() {
    let calc = TableCalculation::new("region_share", TableCalculationType::PercentOfColumnTotal)
        .with_field("revenue")
        .with_partition_by(&["region"]);
    let rows = vec![
        vec![Value::from("EU"), Value::Int(100)],
        vec![Value::from("US"), Value::Int(300)],
        vec![Value::from("EU"), Value::Int(300)],
        vec![Value::from("US"), Value::Int(100)],
    ];

    let (rows, _) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["region", "revenue"]))
        .unwrap();

    assert_eq!(
        column(&rows, 2),
        vec![
            Value::Float(25.0),
            Value::Float(75.0),
            Value::Float(75.0),
            Value::Float(25.0)
        ]
    );
}

#[test]
fn test_rank_and_row_number() {
    let calcs = vec![
        TableCalculation::new("revenue_rank", TableCalculationType::Rank).with_field("revenue"),
        TableCalculation::new("row_num", TableCalculationType::RowNumber),
    ];
    let rows = vec![
        vec![Value::from("A"), Value::Int(100)],
        vec![Value::from("B"), Value::Int(300)],
        vec![Value::from("C"), Value::Int(200)],
        vec![Value::from("D"), Value::Int(300)],
    ];

    let (rows, cols) = TableCalculationProcessor::new(calcs)
        .process(rows, columns(&["name", "revenue"]))
        .unwrap();

    assert_eq!(cols, vec!["name", "revenue", "revenue_rank", "row_num"]);
    let ranks: Vec<(String, Value)> = rows
        .iter()
        .map(|r| (r[0].to_string(), r[2].clone()))
        .collect();
    assert_eq!(
        ranks,
        vec![
            ("A".to_string(), Value::Int(4)),
            ("B".to_string(), Value::Int(1)),
            ("C".to_string(), Value::Int(3)),
            ("D".to_string(), Value::Int(1)),
        ]
    );
    assert_eq!(
        column(&rows, 3),
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
}

#[test]
fn test_moving_average() {
    let calc = TableCalculation::new("ma_3", TableCalculationType::MovingAverage)
        .with_field("value")
        .with_window_size(3);
    let rows = vec![
        vec![Value::Int(10)],
        vec![Value::Int(20)],
        vec![Value::Int(30)],
        vec![Value::Int(40)],
    ];

    let (rows, _) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["value"]))
        .unwrap();

    assert_eq!(rows[0][1], Value::Float(10.0));
    assert_eq!(rows[1][1], Value::Float(15.0));
    assert_eq!(rows[2][1], Value::Float(20.0));
    assert_close(&rows[3][1], 30.0);
}

#[test]
fn test_percentile_95() {
    let calc = TableCalculation::new("p95", TableCalculationType::Percentile)
        .with_field("latency")
        .with_percentile(0.95);
    let rows: Vec<Vec<Value>> = (1..=100).rev().map(|i| vec![Value::Int(i)]).collect();

    let (rows, _) = TableCalculationProcessor::new(vec![calc])
        .process(rows, columns(&["latency"]))
        .unwrap();

    for row in &rows {
        assert_close(&row[1], 95.05);
    }
}

#[test]
fn test_later_calculations_read_earlier_columns() {
    let calcs = vec![
        TableCalculation::new("pct_total", TableCalculationType::PercentOfTotal).with_field("revenue"),
        TableCalculation::new("running_sum", TableCalculationType::RunningTotal).with_field("revenue"),
        TableCalculation::formula("running_k", "${running_sum} / 1000"),
    ];
    let rows = vec![
        vec![Value::Int(100)],
        vec![Value::Int(200)],
        vec![Value::Int(700)],
    ];

    let (rows, cols) = TableCalculationProcessor::new(calcs)
        .process(rows, columns(&["revenue"]))
        .unwrap();

    assert_eq!(cols, vec!["revenue", "pct_total", "running_sum", "running_k"]);
    assert_close(&rows[0][1], 10.0);
    assert_eq!(rows[0][2], Value::Int(100));
    assert_close(&rows[1][1], 20.0);
    assert_eq!(rows[1][2], Value::Int(300));
    assert_eq!(rows[2][2], Value::Int(1000));
    assert_eq!(rows[2][3], Value::Float(1.0));
}

#[test]
fn test_empty_results_still_gain_columns() {
    let calc = TableCalculation::new("running", TableCalculationType::RunningTotal).with_field("amount");

    let (rows, cols) = TableCalculationProcessor::new(vec![calc])
        .process(vec![], columns(&["amount"]))
        .unwrap();

    assert!(rows.is_empty());
    assert_eq!(cols, vec!["amount", "running"]);
}

#[test]
fn test_no_calculations_returns_input() {
    let rows = vec![vec![Value::from("A"), Value::Int(1)]];
    let (out, cols) = TableCalculationProcessor::new(vec![])
        .process(rows.clone(), columns(&["name", "n"]))
        .unwrap();
    assert_eq!(out, rows);
    assert_eq!(cols, vec!["name", "n"]);
}

#[test]
fn test_text_column_is_rejected() {
    let calc = TableCalculation::new("running", TableCalculationType::RunningTotal).with_field("name");
    let err = TableCalculationProcessor::new(vec![calc])
        .process(vec![vec![Value::from("Alice")]], columns(&["name"]))
        .unwrap_err();
    assert_eq!(err.to_string(), "Column 'name' used by 'running' is not numeric");
}

#[test]
fn test_calculations_deserialize() {
    let json = r#"[
        {"name": "margin", "type": "formula", "expression": "${profit} / ${revenue}"},
        {"name": "ma_7", "type": "moving_average", "field": "revenue", "window_size": 7},
        {"name": "p90", "type": "percentile", "field": "revenue", "percentile": 0.9}
    ]"#;
    let calcs: Vec<TableCalculation> = serde_json::from_str(json).unwrap();

    assert_eq!(calcs[0].calc_type, TableCalculationType::Formula);
    assert_eq!(calcs[1].window_size, Some(7));
    assert_eq!(calcs[2].percentile, Some(0.9));
    assert!(calcs.iter().all(|c| c.validate().is_ok()));

    let unknown = serde_json::from_str::<TableCalculation>(r#"{"name": "x", "type": "median"}"#);
    assert!(unknown.is_err());
}
