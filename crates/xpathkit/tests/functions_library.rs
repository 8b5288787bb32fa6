use rstest::rstest;
use std::collections::HashMap;
use std::sync::Arc;
use xpathkit::{
    Duration, DynamicContextBuilder, Error, FunctionRegistry, QName, Value, evaluate_with, parse,
    run,
};

fn eval(expr: &str) -> Result<Value, Error> {
    run(expr, &HashMap::new(), None)
}

#[rstest]
#[case::sum("sum((1, 2, 3, 4, 5, 7, 9))", Value::Integer(31))]
#[case::sum_flattens_arguments("sum(1, 2, 3)", Value::Integer(6))]
#[case::sum_empty("sum(())", Value::Integer(0))]
#[case::sum_doubles("sum((1, 2.5))", Value::Double(3.5))]
#[case::avg("avg((1, 2, 3, 4, 5, 7, 9))", Value::Double(4.428571428571429))]
#[case::avg_single("avg(40000)", Value::Integer(40000))]
#[case::avg_empty("avg(())", Value::Empty)]
#[case::count("count((1, 2, 3))", Value::Integer(3))]
#[case::count_empty("count(())", Value::Integer(0))]
#[case::min("min((3, 1, 2))", Value::Integer(1))]
#[case::max("max((3, 9, 2))", Value::Integer(9))]
#[case::max_strings("max(('apple', 'pear'))", Value::from("pear"))]
#[case::min_numeric_text("min(('9', '10'))", Value::from("9"))]
fn aggregates(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(eval(expr).unwrap(), expected);
}

#[rstest]
#[case::true_fn("true()", true)]
#[case::false_fn("false()", false)]
#[case::boolean_of_string("boolean('x')", true)]
#[case::boolean_of_zero("boolean(0)", false)]
#[case::not_false("not(false())", true)]
#[case::not_true("not(1 = 1)", false)]
#[case::not_empty("not(())", true)]
#[case::empty("empty(())", true)]
#[case::empty_blank("empty('')", true)]
#[case::empty_value("empty(1)", false)]
#[case::exists("exists((1, 2))", true)]
#[case::fn_prefix("fn:exists(())", false)]
fn boolean_functions(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(eval(expr).unwrap(), Value::Boolean(expected));
}

#[rstest]
#[case::number_from_text("number('12.5')", Value::Double(12.5))]
#[case::number_from_integer("number(3)", Value::Double(3.0))]
#[case::string_of_number("string(42)", Value::from("42"))]
#[case::string_of_boolean("string(true())", Value::from("true"))]
#[case::string_of_empty("string(())", Value::from(""))]
#[case::string_of_focus("(1, 2) ! string()", Value::from(vec!["1", "2"]))]
fn casts(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(eval(expr).unwrap(), expected);
}

#[rstest]
fn number_of_garbage_is_nan() {
    let Value::Double(n) = eval("number('twelve')").unwrap() else {
        panic!("number() returns a double");
    };
    assert!(n.is_nan());
}

#[rstest]
fn qname_constructor() {
    let Value::QName(name) = eval("QName('urn:x', 'p:item')").unwrap() else {
        panic!("expected a QName");
    };
    assert_eq!(name, QName::prefixed("p", "item"));
    assert_eq!(name.namespace.as_deref(), Some("urn:x"));
    assert_eq!(eval("QName('a') = QName('a')").unwrap(), Value::Boolean(true));
    assert!(matches!(eval("QName('a') < QName('b')"), Err(Error::TypeMismatch(_))));
}

#[rstest]
fn unknown_function() {
    let error = eval("frobnicate(1)").unwrap_err();
    assert_eq!(error, Error::UnknownFunction(QName::prefixed("fn", "frobnicate")));
}

#[rstest]
#[case::too_many("true(1)", "0")]
#[case::too_few("boolean()", "1")]
#[case::range("date(1, 2)", "0 to 1")]
#[case::variadic("count()", "1 or more")]
fn wrong_arity(#[case] expr: &str, #[case] expected: &str) {
    let Err(Error::Arity { expected: available, .. }) = eval(expr) else {
        panic!("{expr} should be an arity error");
    };
    assert_eq!(available, expected);
}

#[rstest]
fn arity_error_message_names_the_function() {
    let error = eval("string(1, 2)").unwrap_err();
    assert!(error.to_string().contains("fn:string"), "{error}");
}

#[rstest]
fn custom_functions_extend_the_builtins() {
    let mut registry = FunctionRegistry::with_builtins();
    registry.register_fn("double", 1, |items: &[Value]| match items {
        [Value::Integer(i)] => Ok(Value::Integer(i * 2)),
        _ => Err(Error::TypeMismatch("double expects one integer".to_string())),
    });
    registry.register_variadic(QName::prefixed("my", "concat"), 0, |items: &[Value]| {
        Ok(Value::String(items.iter().map(ToString::to_string).collect()))
    });
    let ctx = DynamicContextBuilder::new().with_functions(Arc::new(registry)).build();

    let eval = |expr: &str| evaluate_with(&parse(expr).unwrap(), &ctx);
    assert_eq!(eval("double(21)").unwrap(), Value::Integer(42));
    assert_eq!(eval("my:concat('a', 1, true())").unwrap(), Value::from("a1true"));
    assert_eq!(eval("sum((1, 2))").unwrap(), Value::Integer(3));
}

#[rstest]
fn default_function_prefix_is_configurable() {
    let mut registry = FunctionRegistry::new();
    registry.register_fn(QName::prefixed("xf", "answer"), 0, |_: &[Value]| Ok(Value::Integer(42)));
    let ctx = DynamicContextBuilder::new()
        .with_functions(Arc::new(registry))
        .with_default_function_prefix("xf")
        .build();
    assert_eq!(evaluate_with(&parse("answer()").unwrap(), &ctx).unwrap(), Value::Integer(42));
    assert!(matches!(
        evaluate_with(&parse("count(1)").unwrap(), &ctx),
        Err(Error::UnknownFunction(_))
    ));
}

#[rstest]
fn registry_lists_builtins() {
    let registry = FunctionRegistry::with_builtins();
    let names: Vec<String> = registry.names().iter().map(ToString::to_string).collect();
    for expected in ["fn:count", "fn:sum", "fn:date", "xs:dayTimeDuration"] {
        assert!(names.iter().any(|n| n == expected), "{expected} missing");
    }
}

#[rstest]
fn sum_of_durations() {
    let value = eval("sum((day-time-duration('PT1H'), day-time-duration('PT30M')))").unwrap();
    let Value::Duration(Duration::DayTime(delta)) = value else {
        panic!("expected a day-time duration");
    };
    assert_eq!(delta.num_minutes(), 90);
}
