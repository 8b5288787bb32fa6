//! Built-in function library.
//!
//! Every function receives the flattened items of all its arguments; empty
//! arguments (including unbound variables) have already dropped out.

use crate::consts::{FN_PREFIX, XS_PREFIX};
use crate::engine::runtime::FunctionRegistry;
use crate::model::QName;

mod aggregates;
mod boolean;
mod constructors;

fn fn_name(local: &str) -> QName {
    QName::prefixed(FN_PREFIX, local)
}

fn xs_name(local: &str) -> QName {
    QName::prefixed(XS_PREFIX, local)
}

/// A fresh registry holding every built-in function.
pub fn default_function_registry() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();

    // ===== Aggregates =====
    reg.register_variadic(fn_name("count"), 1, aggregates::fn_count);
    reg.register_variadic(fn_name("sum"), 1, aggregates::fn_sum);
    reg.register_variadic(fn_name("avg"), 1, aggregates::fn_avg);
    reg.register_variadic(fn_name("min"), 1, aggregates::fn_min);
    reg.register_variadic(fn_name("max"), 1, aggregates::fn_max);

    // ===== Booleans and sequences =====
    reg.register_fn(fn_name("true"), 0, boolean::fn_true);
    reg.register_fn(fn_name("false"), 0, boolean::fn_false);
    reg.register_fn(fn_name("boolean"), 1, boolean::fn_boolean);
    reg.register_variadic(fn_name("not"), 1, boolean::fn_not);
    reg.register_variadic(fn_name("empty"), 1, boolean::fn_empty);
    reg.register_variadic(fn_name("exists"), 1, boolean::fn_exists);

    // ===== Casts and constructors =====
    reg.register_range_fn(fn_name("number"), 0, Some(1), constructors::fn_number);
    reg.register_with_context(fn_name("string"), 0, Some(1), constructors::fn_string);
    for name in [fn_name("date"), xs_name("date")] {
        reg.register_range_fn(name, 0, Some(1), constructors::fn_date);
    }
    for name in [fn_name("year-month-duration"), xs_name("yearMonthDuration")] {
        reg.register_range_fn(name, 0, Some(1), constructors::fn_year_month_duration);
    }
    for name in [fn_name("day-time-duration"), xs_name("dayTimeDuration")] {
        reg.register_range_fn(name, 0, Some(1), constructors::fn_day_time_duration);
    }
    for name in [fn_name("QName"), xs_name("QName")] {
        reg.register_range_fn(name, 1, Some(2), constructors::fn_qname);
    }
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::{CallCtx, Environment, Error, EvaluationOptions, Variables};
    use crate::xdm::Value;
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> FunctionRegistry {
        default_function_registry()
    }

    #[rstest]
    #[case::count("count", 1)]
    #[case::number_without_argument("number", 0)]
    #[case::xs_date("xs:date", 1)]
    #[case::qname_with_uri("QName", 2)]
    fn builtins_resolve(registry: FunctionRegistry, #[case] name: &str, #[case] arity: usize) {
        assert!(registry.resolve(&QName::parse(name), arity, FN_PREFIX).is_ok());
    }

    #[rstest]
    fn constructors_share_implementations(registry: FunctionRegistry) {
        let variables = Variables::new();
        let options = EvaluationOptions::default();
        let env = Environment::new(&variables, None, &registry, &options, FN_PREFIX);
        let ctx = CallCtx::new(env, 1);
        let items = [Value::from("2021-06-30")];
        let via_fn = registry.resolve(&QName::local("date"), 1, FN_PREFIX).unwrap()(&ctx, &items);
        let via_xs = registry.resolve(&QName::parse("xs:date"), 1, FN_PREFIX).unwrap()(&ctx, &items);
        assert_eq!(via_fn.unwrap(), via_xs.unwrap());
    }

    #[rstest]
    fn string_without_argument_reads_the_context_item(registry: FunctionRegistry) {
        let variables = Variables::new();
        let options = EvaluationOptions::default();
        let env = Environment::new(&variables, None, &registry, &options, FN_PREFIX);
        let string = registry.resolve(&QName::local("string"), 0, FN_PREFIX).unwrap();
        assert_eq!(string(&CallCtx::new(env, 0), &[]), Err(Error::ContextItemUndefined));
        let item = Value::Integer(5);
        let focused = CallCtx::new(env.with_context(&item, Some((1, 1))), 0);
        assert_eq!(string(&focused, &[]).unwrap(), Value::from("5"));
        assert!(registry.is_contextual(&QName::local("string"), FN_PREFIX));
    }
}
