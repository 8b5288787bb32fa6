use rstest::{fixture, rstest};
use std::collections::HashMap;
use xpathkit::{
    DynamicContextBuilder, Error, EvaluationOptions, QName, RangeEnd, Value, evaluate_with, parse,
    run,
};

#[fixture]
fn vars() -> HashMap<String, Value> {
    HashMap::from([
        ("x".to_string(), Value::Integer(41)),
        ("list".to_string(), Value::from(vec![2_i64, 3, 4])),
        ("name".to_string(), Value::from("widget")),
        ("p:limit".to_string(), Value::Integer(10)),
    ])
}

#[rstest]
#[case::scalar("$x + 1", Value::Integer(42))]
#[case::sequence_sum("sum($list)", Value::Integer(9))]
#[case::sequence_count("count($list)", Value::Integer(3))]
#[case::string("$name", Value::from("widget"))]
#[case::prefixed("$p:limit * 2", Value::Integer(20))]
#[case::predicate_on_variable("$list[. > 2]", Value::from(vec![3_i64, 4]))]
#[case::shadowed_by_let("let $x := 1 return $x", Value::Integer(1))]
fn bound_variables(vars: HashMap<String, Value>, #[case] expr: &str, #[case] expected: Value) {
    assert_eq!(run(expr, &vars, None).unwrap(), expected);
}

#[rstest]
#[case::bare("$missing", Value::Empty)]
#[case::arithmetic("$missing + 1", Value::Empty)]
#[case::dropped_from_count("count((1, $missing))", Value::Integer(1))]
#[case::exists("exists($missing)", Value::Boolean(false))]
fn missing_variables_are_empty(
    vars: HashMap<String, Value>,
    #[case] expr: &str,
    #[case] expected: Value,
) {
    assert_eq!(run(expr, &vars, None).unwrap(), expected);
}

#[rstest]
#[case::singleton("$x + 1", Value::Integer(42))]
#[case::empty("$e", Value::Empty)]
#[case::empty_in_arithmetic("$e + 1", Value::Empty)]
#[case::nested("$n", Value::from(vec![1_i64, 2, 3]))]
#[case::nested_count("count($n)", Value::Integer(3))]
fn host_sequences_are_normalized(#[case] expr: &str, #[case] expected: Value) {
    let nested = Value::Sequence(vec![
        Value::Sequence(vec![Value::Integer(1), Value::Integer(2)]),
        Value::Integer(3),
    ]);
    let vars = HashMap::from([
        ("x".to_string(), Value::Sequence(vec![Value::Integer(41)])),
        ("e".to_string(), Value::Sequence(Vec::new())),
        ("n".to_string(), nested.clone()),
    ]);
    assert_eq!(run(expr, &vars, None).unwrap(), expected);

    let ctx = DynamicContextBuilder::new()
        .with_variable("x", Value::Sequence(vec![Value::Integer(41)]))
        .with_variable("e", Value::Sequence(Vec::new()))
        .with_variable("n", nested)
        .build();
    assert_eq!(evaluate_with(&parse(expr).unwrap(), &ctx).unwrap(), expected);
}

#[rstest]
fn strict_mode_reports_missing_variables() {
    let ctx = DynamicContextBuilder::new()
        .with_variable("x", 1)
        .with_options(EvaluationOptions { strict_variables: true, ..EvaluationOptions::default() })
        .build();
    let ast = parse("$x + $y").unwrap();
    assert_eq!(evaluate_with(&ast, &ctx), Err(Error::UnknownVariable(QName::local("y"))));
}

#[rstest]
fn multiples_of_five_inclusive() {
    let ctx = DynamicContextBuilder::new().build();
    let ast = parse("(1 to 100)[. mod 5 = 0]").unwrap();
    let items = evaluate_with(&ast, &ctx).unwrap().into_items();
    assert_eq!(items.len(), 20);
    assert_eq!(items.last(), Some(&Value::Integer(100)));
}

#[rstest]
fn multiples_of_five_exclusive() {
    let options = EvaluationOptions { range_end: RangeEnd::Exclusive, ..EvaluationOptions::default() };
    let ctx = DynamicContextBuilder::new().with_options(options).build();
    let ast = parse("(1 to 100)[. mod 5 = 0]").unwrap();
    let items = evaluate_with(&ast, &ctx).unwrap().into_items();
    assert_eq!(items.len(), 19);
    assert_eq!(items.last(), Some(&Value::Integer(95)));
}

#[rstest]
fn exclusive_range_with_equal_bounds_is_empty() {
    let options = EvaluationOptions { range_end: RangeEnd::Exclusive, ..EvaluationOptions::default() };
    let ctx = DynamicContextBuilder::new().with_options(options).build();
    assert_eq!(evaluate_with(&parse("3 to 3").unwrap(), &ctx).unwrap(), Value::Empty);
}

#[rstest]
fn range_bounds_from_variables(vars: HashMap<String, Value>) {
    let value = run("count(1 to $p:limit)", &vars, None).unwrap();
    assert_eq!(value, Value::Integer(10));
}

#[rstest]
fn one_context_serves_many_evaluations() {
    let ctx = DynamicContextBuilder::new().with_variable("n", 5).build();
    for (expr, expected) in [("$n * 2", 10), ("$n - 1", 4), ("sum(1 to $n)", 15)] {
        let ast = parse(expr).unwrap();
        assert_eq!(evaluate_with(&ast, &ctx).unwrap(), Value::Integer(expected), "{expr}");
    }
}
