//! Language-level semantics driven through in-memory sources: operator
//! behavior, slices, mappings, sscanf, varargs, and the instruction
//! budget.

mod common;

use common::*;
use mudlark::{ErrorKind, Value};

#[test]
fn test_arithmetic_and_precedence() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/arith",
        r#"
        int calc() { return 2 + 3 * 4 - 10 / 2; }
        int modulo() { return 17 % 5; }
    "#,
    );
    assert_eq!(call(&mut w, obj, "calc", vec![]), Value::Int(9));
    assert_eq!(call(&mut w, obj, "modulo", vec![]), Value::Int(2));
}

#[test]
fn test_string_plus_int_coercion() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/coerce",
        r#"string hp(int n) { return "hp: " + n; }"#,
    );
    assert_eq!(
        call(&mut w, obj, "hp", vec![Value::Int(12)]),
        Value::str("hp: 12")
    );
}

#[test]
fn test_nil_equals_zero_in_scripts() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/nilzero",
        r#"
        int is_zero(mixed x) { return x == 0; }
        int bang(mixed x) { return !x; }
    "#,
    );
    // a missing-function probe returns nil; both null-check forms agree
    assert_eq!(
        call(&mut w, obj, "is_zero", vec![Value::Nil]),
        Value::Int(1)
    );
    assert_eq!(call(&mut w, obj, "bang", vec![Value::Nil]), Value::Int(1));
    assert_eq!(
        call(&mut w, obj, "is_zero", vec![Value::str("")]),
        Value::Int(0)
    );
}

#[test]
fn test_array_slices() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/slices",
        r#"
        int* make() { return ({ 0, 1, 2, 3 }); }
        int* mid() { return make()[1..3]; }
        int* inverted() { return make()[3..1]; }
        int* clamped() { return make()[2..99]; }
        int* from_end() { return make()[-2..4]; }
    "#,
    );
    let ints = |w: &mut mudlark::World, f: &str| -> Vec<i64> {
        array_items(&call(w, obj, f, vec![]))
            .iter()
            .map(|v| v.as_int().unwrap())
            .collect()
    };
    assert_eq!(ints(&mut w, "mid"), vec![1, 2]);
    assert_eq!(ints(&mut w, "inverted"), Vec::<i64>::new());
    assert_eq!(ints(&mut w, "clamped"), vec![2, 3]);
    assert_eq!(ints(&mut w, "from_end"), vec![2, 3]);
}

#[test]
fn test_index_out_of_range() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/oob",
        r#"int peek() { return ({ 1 })[4]; }"#,
    );
    let err = try_call(&mut w, obj, "peek", vec![]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Index);
}

#[test]
fn test_mapping_idioms() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/maps",
        r#"
        mapping m;
        void create() { m = ([ "hp": 10 ]); }
        void bump() { m = m + ([ "sp": 5 ]); }
        int get(string k) { return m[k]; }
        int count() { return sizeof(m); }
    "#,
    );
    call(&mut w, obj, "bump", vec![]);
    assert_eq!(
        call(&mut w, obj, "get", vec![Value::str("hp")]),
        Value::Int(10)
    );
    assert_eq!(
        call(&mut w, obj, "get", vec![Value::str("sp")]),
        Value::Int(5)
    );
    // absent keys read as zero
    assert_eq!(
        call(&mut w, obj, "get", vec![Value::str("xp")]),
        Value::Int(0)
    );
    assert_eq!(call(&mut w, obj, "count", vec![]), Value::Int(2));
}

#[test]
fn test_array_assignment_aliases() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/alias",
        r#"
        int probe() {
            int* a;
            int* b;
            a = ({ 1, 2 });
            b = a;
            b[0] = 99;
            return a[0];
        }
    "#,
    );
    assert_eq!(call(&mut w, obj, "probe", vec![]), Value::Int(99));
}

#[test]
fn test_sscanf_from_pattern() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/scan",
        r#"
        mixed* parse(string input) {
            string item;
            string box;
            int n;
            n = sscanf(input, "%s from %s", item, box);
            return ({ n, item, box });
        }
    "#,
    );
    let out = array_items(&call(
        &mut w,
        obj,
        "parse",
        vec![Value::str("sword 2 from bag")],
    ));
    assert_eq!(out[0], Value::Int(2));
    assert_eq!(out[1], Value::str("sword 2"));
    assert_eq!(out[2], Value::str("bag"));

    let out = array_items(&call(
        &mut w,
        obj,
        "parse",
        vec![Value::str("all from corpse")],
    ));
    assert_eq!(out[1], Value::str("all"));
    assert_eq!(out[2], Value::str("corpse"));

    // no delimiter: fewer than two conversions, outputs left type-zero
    let out = array_items(&call(&mut w, obj, "parse", vec![Value::str("nothing here")]));
    assert!(out[0].as_int().unwrap() < 2);
    assert_eq!(out[2], Value::str(""));
}

#[test]
fn test_varargs_binding() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/varargs",
        r#"
        varargs string greet(string who, string how) {
            if (!how) {
                how = "waves at";
            }
            return capitalize(how) + " " + who;
        }
    "#,
    );
    assert_eq!(
        call(&mut w, obj, "greet", vec![Value::str("kael")]),
        Value::str("Waves at kael")
    );
    assert_eq!(
        call(
            &mut w,
            obj,
            "greet",
            vec![Value::str("kael"), Value::str("bows to")]
        ),
        Value::str("Bows to kael")
    );
}

#[test]
fn test_while_and_for_loops() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/loops",
        r#"
        int sum_to(int n) {
            int total;
            for (int i = 1; i <= n; i += 1) {
                total += i;
            }
            return total;
        }
        int countdown(int n) {
            int steps;
            while (n > 0) {
                n -= 1;
                steps += 1;
            }
            return steps;
        }
    "#,
    );
    assert_eq!(
        call(&mut w, obj, "sum_to", vec![Value::Int(10)]),
        Value::Int(55)
    );
    assert_eq!(
        call(&mut w, obj, "countdown", vec![Value::Int(4)]),
        Value::Int(4)
    );
}

#[test]
fn test_infinite_loop_hits_budget() {
    let mut w = scratch_world();
    let obj = load_src(&mut w, "/t/spin", "void spin() { while (1) { } }");
    let err = try_call(&mut w, obj, "spin", vec![]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvalBudgetExceeded);
    // the world keeps running afterwards
    let probe = load_src(&mut w, "/t/after", "int ok() { return 1; }");
    assert_eq!(call(&mut w, probe, "ok", vec![]), Value::Int(1));
}

#[test]
fn test_runaway_recursion_hits_budget() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/recurse",
        "mixed self() { return this_object()->self(); }",
    );
    let err = try_call(&mut w, obj, "self", vec![]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvalBudgetExceeded);
}

#[test]
fn test_missing_function_probe_returns_nil() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/probe",
        r#"
        int probe() { return this_object()->no_such_function() == 0; }
    "#,
    );
    assert_eq!(call(&mut w, obj, "probe", vec![]), Value::Int(1));
}

#[test]
fn test_logical_operators_return_useful_values() {
    let mut w = scratch_world();
    let obj = load_src(
        &mut w,
        "/t/logic",
        r#"
        string fallback(string s) { return s || "default"; }
        int guard(int x) { return x && 7; }
    "#,
    );
    assert_eq!(
        call(&mut w, obj, "fallback", vec![Value::str("")]),
        Value::str("default")
    );
    assert_eq!(
        call(&mut w, obj, "fallback", vec![Value::str("given")]),
        Value::str("given")
    );
    assert_eq!(call(&mut w, obj, "guard", vec![Value::Int(1)]), Value::Int(7));
    assert_eq!(call(&mut w, obj, "guard", vec![Value::Int(0)]), Value::Int(0));
}
