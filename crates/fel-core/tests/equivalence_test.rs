//! Property tests: interpreted and compiled evaluation agree, comparators are
//! mutually consistent, and folding does not change results.

use fel_core::{ConstantFolding, FelEngine, MapContext, Optimizer, VarShortcut};
use fel_types::Value;
use proptest::prelude::*;

/// Random expression text over the variables `x` and `y`
fn expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (-1000i64..1000).prop_map(|i| i.to_string()),
        (-100.0f64..100.0).prop_map(|f| format!("{f:.3}")),
        Just("x".to_string()),
        Just("y".to_string()),
        Just("null".to_string()),
        Just("true".to_string()),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        let op = prop_oneof![
            Just("+"),
            Just("-"),
            Just("*"),
            Just("/"),
            Just("%"),
            Just("<"),
            Just("<="),
            Just(">"),
            Just(">="),
            Just("=="),
            Just("!="),
            Just("&&"),
            Just("||"),
        ];
        prop_oneof![
            (inner.clone(), op, inner.clone()).prop_map(|(l, op, r)| format!("({l} {op} {r})")),
            inner.clone().prop_map(|e| format!("-({e})")),
            inner.clone().prop_map(|e| format!("!({e})")),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, a, b)| format!("({c} ? {a} : {b})")),
            (inner.clone(), inner).prop_map(|(a, b)| format!("max({a}, {b})")),
        ]
    })
}

fn number() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1_000_000i64..1_000_000).prop_map(Value::Int),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
    ]
}

fn bool_of(engine: &FelEngine, text: &str, ctx: &MapContext) -> bool {
    match engine.eval_in(text, ctx) {
        Ok(Value::Bool(b)) => b,
        other => panic!("{text} did not produce a boolean: {other:?}"),
    }
}

proptest! {
    #[test]
    fn test_interpret_compile_equivalence(text in expression(), x in -50i64..50, y in -50i64..50) {
        let engine = FelEngine::new();
        let ctx = MapContext::from_pairs([("x", x), ("y", y)]);

        let interpreted = engine.eval_in(&text, &ctx);
        let compiled = engine.compile(&text, None, &[]).unwrap();
        prop_assert_eq!(&compiled.eval(&ctx), &interpreted);

        let bound = engine.compile(&text, Some(&ctx), &[&VarShortcut::default()]).unwrap();
        prop_assert_eq!(&bound.eval(&ctx), &interpreted);
    }

    #[test]
    fn test_folding_preserves_results(text in expression(), x in -50i64..50, y in -50i64..50) {
        let engine = FelEngine::new();
        let ctx = MapContext::from_pairs([("x", x), ("y", y)]);
        let fold = ConstantFolding::with_calls();

        let plain = engine.eval_in(&text, &ctx);
        let once = fold.optimize(&ctx, engine.runtime(), engine.parse(&text).unwrap());
        let twice = fold.optimize(&ctx, engine.runtime(), once.clone());

        prop_assert_eq!(&once.eval(&ctx, engine.runtime()), &plain);
        prop_assert_eq!(&twice.eval(&ctx, engine.runtime()), &plain);
    }

    #[test]
    fn test_stable_trees_repeat_exactly(text in expression()) {
        let engine = FelEngine::new();
        let ctx = MapContext::from_pairs([("x", 1), ("y", 2)]);
        let node = engine.parse(&text).unwrap();
        if node.is_stable() {
            let first = node.eval(&ctx, engine.runtime());
            for _ in 0..3 {
                prop_assert_eq!(&node.eval(&ctx, engine.runtime()), &first);
            }
        }
    }

    #[test]
    fn test_comparator_consistency(a in number(), b in number()) {
        for engine in [FelEngine::new(), FelEngine::big_number()] {
            let ctx = MapContext::from_pairs([("a", a.clone()), ("b", b.clone())]);
            let lt = bool_of(&engine, "a < b", &ctx);
            let lte = bool_of(&engine, "a <= b", &ctx);
            let gte = bool_of(&engine, "a >= b", &ctx);
            let eq = bool_of(&engine, "a == b", &ctx);

            prop_assert_eq!(lt, !gte);
            prop_assert_eq!(lte, lt || eq);
        }
    }

    #[test]
    fn test_self_comparison(a in number()) {
        let engine = FelEngine::new();
        let ctx = MapContext::from_pairs([("a", a)]);
        prop_assert!(bool_of(&engine, "a <= a", &ctx));
        prop_assert!(bool_of(&engine, "a >= a", &ctx));
        prop_assert!(!bool_of(&engine, "a < a", &ctx));
        prop_assert!(bool_of(&engine, "a == a", &ctx));
    }
}
