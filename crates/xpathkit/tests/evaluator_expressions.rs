use rstest::rstest;
use std::collections::HashMap;
use xpathkit::{Error, Value, run};

fn eval(expr: &str) -> Result<Value, Error> {
    run(expr, &HashMap::new(), None)
}

fn ints(values: &[i64]) -> Value {
    Value::from(values.to_vec())
}

#[rstest]
#[case::precedence("1 + 2 * 3", Value::Integer(7))]
#[case::grouping("(1 + 2) * 3", Value::Integer(9))]
#[case::idiv("10 idiv 3", Value::Integer(3))]
#[case::modulo("10 mod 3", Value::Integer(1))]
#[case::div_is_double("7 div 2", Value::Double(3.5))]
#[case::mixed("(4 + 3 * 5) - 9", Value::Integer(10))]
#[case::negation("-(2 + 3)", Value::Integer(-5))]
#[case::double_negation("--3", Value::Integer(3))]
#[case::double_promotion("1 + 0.5", Value::Double(1.5))]
#[case::empty_operand("() + 1", Value::Empty)]
#[case::subtraction_is_left_associative("8 - 3 - 2", Value::Integer(3))]
#[case::guarded_division("if (1 = 1) then 1 else (1 div 0)", Value::Integer(1))]
#[case::variadic_sum("sum(1,4,2,3,12,3,6)", Value::Integer(31))]
fn arithmetic(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(eval(expr).unwrap(), expected);
}

#[rstest]
fn arithmetic_with_fractions() {
    let Value::Double(result) = eval("(1 + 2 * 3 - 4 div 5 * 6 - 7) * (3 - 5)").unwrap() else {
        panic!("expected a double");
    };
    assert!((result - 9.6).abs() < 1e-9, "got {result}");
}

#[rstest]
#[case::div("1 div 0")]
#[case::idiv("1 idiv 0")]
#[case::modulo("5 mod 0")]
fn division_by_zero(#[case] expr: &str) {
    assert_eq!(eval(expr), Err(Error::DivisionByZero));
}

#[rstest]
fn integer_overflow_is_reported() {
    assert!(matches!(eval("9223372036854775807 + 1"), Err(Error::Overflow(_))));
}

#[rstest]
fn arithmetic_on_words_is_a_type_error() {
    assert!(matches!(eval("'abc' + 1"), Err(Error::TypeMismatch(_))));
    assert!(matches!(eval("(1, 2) + 1"), Err(Error::TypeMismatch(_))));
}

#[rstest]
#[case::general_eq("1 = 1", true)]
#[case::general_any_pair("(1, 2) = (2, 3)", true)]
#[case::general_no_pair("(1, 2) = (3, 4)", false)]
#[case::general_ne("(1, 2) != (1, 2)", true)]
#[case::value_eq("1 eq 2", false)]
#[case::value_lt("1 lt 2.5", true)]
#[case::strings("'abc' < 'abd'", true)]
#[case::numeric_text("'10' = 10", true)]
#[case::numeric_text_order("'9' < 10", true)]
#[case::booleans("true() = true()", true)]
#[case::nan("number('x') = number('x')", false)]
#[case::nan_ne("number('x') != 1", true)]
#[case::empty_general("() = 1", false)]
#[case::value_eq_grouped("2 eq (1+1)", true)]
#[case::general_eq_grouped("(1+2) = (2+1)", true)]
fn comparisons(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(eval(expr).unwrap(), Value::Boolean(expected));
}

#[rstest]
fn value_comparison_with_empty_side_is_empty() {
    assert_eq!(eval("() eq 1").unwrap(), Value::Empty);
}

#[rstest]
fn value_comparison_rejects_sequences() {
    assert!(matches!(eval("(1, 2) eq 1"), Err(Error::TypeMismatch(_))));
}

#[rstest]
fn incomparable_types() {
    assert!(matches!(eval("'abc' = 1"), Err(Error::TypeMismatch(_))));
    assert!(matches!(eval("true() lt 'x'"), Err(Error::TypeMismatch(_))));
}

#[rstest]
#[case::and_short_circuits("1 = 2 and 1 div 0", false)]
#[case::or_short_circuits("1 = 1 or 1 div 0", true)]
#[case::and_all("1 and 'x' and true()", true)]
#[case::or_none("0 or '' or ()", false)]
fn logical_operators(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(eval(expr).unwrap(), Value::Boolean(expected));
}

#[rstest]
fn conditional_evaluates_only_the_chosen_branch() {
    assert_eq!(eval("if (1 = 1) then 'yes' else 1 div 0").unwrap(), Value::from("yes"));
    assert_eq!(eval("if (()) then 1 div 0 else 'no'").unwrap(), Value::from("no"));
}

#[rstest]
fn effective_boolean_value_of_atomic_sequence_is_an_error() {
    assert!(matches!(eval("if ((1, 2)) then 1 else 2"), Err(Error::TypeMismatch(_))));
}

#[rstest]
#[case::inclusive("1 to 5", ints(&[1, 2, 3, 4, 5]))]
#[case::single("3 to 3", Value::Integer(3))]
#[case::descending_is_empty("5 to 1", Value::Empty)]
#[case::integral_double("1.0 to 2", ints(&[1, 2]))]
#[case::empty_bound("() to 3", Value::Empty)]
fn ranges(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(eval(expr).unwrap().into_items(), expected.into_items());
}

#[rstest]
fn fractional_range_bound() {
    assert!(matches!(eval("1.5 to 3"), Err(Error::TypeMismatch(_))));
}

#[rstest]
#[case::flatten("(1, (2, 3), ())", ints(&[1, 2, 3]))]
#[case::positional("(10, 20, 30)[2]", Value::Integer(20))]
#[case::out_of_range_position("(10, 20, 30)[4]", Value::Empty)]
#[case::boolean_predicate("(1 to 10)[. mod 3 = 0]", ints(&[3, 6, 9]))]
#[case::last("(1 to 10)[last()]", Value::Integer(10))]
#[case::chained_predicates("(1 to 10)[. > 4][2]", Value::Integer(6))]
#[case::lookup("(7, 8, 9)?3", Value::Integer(9))]
#[case::lookup_expr("(7, 8, 9)?(1 + 1)", Value::Integer(8))]
#[case::simple_map("(1 to 3) ! (. * .)", ints(&[1, 4, 9]))]
#[case::simple_map_position("('a', 'b') ! position()", ints(&[1, 2]))]
fn sequences_and_filters(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(eval(expr).unwrap(), expected);
}

#[rstest]
fn name_lookup_needs_a_map() {
    assert!(matches!(eval("(1, 2)?name"), Err(Error::TypeMismatch(_))));
}

#[rstest]
#[case::for_cartesian("for $a in (1, 2), $b in (10, 20) return $a + $b", ints(&[11, 21, 12, 22]))]
#[case::for_dependent("for $a in 1 to 3, $b in 1 to $a return $b", ints(&[1, 1, 2, 1, 2, 3]))]
#[case::let_sequential("let $a := 3, $b := $a * $a return $b - $a", Value::Integer(6))]
#[case::some("some $x in 1 to 5 satisfies $x * $x = 16", Value::Boolean(true))]
#[case::every("every $x in 1 to 5 satisfies $x < 6", Value::Boolean(true))]
#[case::every_empty("every $x in () satisfies $x = 1", Value::Boolean(true))]
#[case::some_empty("some $x in () satisfies $x = 1", Value::Boolean(false))]
#[case::shadowing("let $x := 1 return (let $x := 2 return $x) + $x", Value::Integer(3))]
fn binding_expressions(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(eval(expr).unwrap(), expected);
}

#[rstest]
fn some_stops_at_first_witness() {
    assert_eq!(
        eval("some $x in (1, 0) satisfies 1 div $x = 1").unwrap(),
        Value::Boolean(true)
    );
}

#[rstest]
fn context_item_outside_focus() {
    assert_eq!(eval(". + 1"), Err(Error::ContextItemUndefined));
    assert_eq!(eval("last()"), Err(Error::ContextItemUndefined));
}

#[rstest]
fn paths_need_a_document() {
    assert_eq!(eval("//item"), Err(Error::NoDocumentBound));
    assert_eq!(eval("count(/a/b)"), Err(Error::NoDocumentBound));
}

#[rstest]
fn dynamic_function_calls_are_unsupported() {
    assert!(matches!(eval("(1, 2)(1)"), Err(Error::Unsupported(_))));
}

#[rstest]
fn parse_errors_surface_through_run() {
    assert!(matches!(eval("1 +"), Err(Error::Parse(_))));
}
