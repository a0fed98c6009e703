//! Operation tests: coercion, arithmetic, bitwise, comparison, concat

use ay_lang::ast::BinOp;
use ay_lang::runtime::ops;
use ay_lang::runtime::{ErrorKind, Number, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn arith(op: BinOp, a: Value, b: Value) -> Value {
    ops::arith(op, &a, &b).unwrap()
}

fn num(text: &str) -> Option<Value> {
    ops::str_to_number(text).map(Value::from)
}

// ── String → number ─────────────────────────────────────────

#[test]
fn numeral_strings() {
    assert!(matches!(ops::str_to_number("10"), Some(Number::Int(10))));
    assert!(matches!(ops::str_to_number("  -0x10  "), Some(Number::Int(-16))));
    assert!(matches!(ops::str_to_number("1e2"), Some(Number::Float(f)) if f == 100.0));
    assert!(matches!(ops::str_to_number(".5"), Some(Number::Float(f)) if f == 0.5));
    assert!(matches!(ops::str_to_number("0x.8p1"), Some(Number::Float(f)) if f == 1.0));
    assert!(matches!(
        ops::str_to_number("0xffffffffffffffff"),
        Some(Number::Int(-1))
    ));
    assert!(matches!(
        ops::str_to_number("9223372036854775808"),
        Some(Number::Float(_))
    ));
}

#[test]
fn non_numerals() {
    for text in ["", " ", "abc", "1e", "0x", "1 2", "--1", "inf", "nan", "1.2.3"] {
        assert!(num(text).is_none(), "{:?} should not convert", text);
    }
}

// ── Arithmetic ──────────────────────────────────────────────

#[test]
fn integer_arithmetic_wraps() {
    assert_eq!(
        arith(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)),
        Value::Int(i64::MIN)
    );
    assert_eq!(
        arith(BinOp::Mul, Value::Int(i64::MIN), Value::Int(-1)),
        Value::Int(i64::MIN)
    );
    assert!(matches!(
        ops::negate(&Value::Int(i64::MIN)).unwrap(),
        Value::Int(i64::MIN)
    ));
}

#[test]
fn division_always_floats() {
    assert!(matches!(arith(BinOp::Div, Value::Int(4), Value::Int(2)), Value::Float(f) if f == 2.0));
    assert!(matches!(arith(BinOp::Pow, Value::Int(2), Value::Int(10)), Value::Float(f) if f == 1024.0));
    assert!(matches!(arith(BinOp::Div, Value::Int(1), Value::Int(0)), Value::Float(f) if f.is_infinite()));
}

#[test]
fn floor_division_and_modulo() {
    assert!(matches!(arith(BinOp::IDiv, Value::Int(-7), Value::Int(2)), Value::Int(-4)));
    assert!(matches!(arith(BinOp::Mod, Value::Int(-7), Value::Int(2)), Value::Int(1)));
    assert!(matches!(arith(BinOp::Mod, Value::Int(7), Value::Int(-2)), Value::Int(-1)));
    assert!(matches!(arith(BinOp::IDiv, Value::Int(i64::MIN), Value::Int(-1)), Value::Int(i64::MIN)));
    assert!(matches!(arith(BinOp::Mod, Value::Float(-7.0), Value::Int(2)), Value::Float(f) if f == 1.0));
    assert!(matches!(arith(BinOp::IDiv, Value::Float(7.0), Value::Int(2)), Value::Float(f) if f == 3.0));
}

#[test]
fn integer_division_by_zero_is_a_domain_error() {
    let err = ops::arith(BinOp::IDiv, &Value::Int(1), &Value::Int(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Domain);
    assert_eq!(err.to_string(), "attempt to perform 'n//0'");
    let err = ops::arith(BinOp::Mod, &Value::Int(1), &Value::Int(0)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to perform 'n%0'");
    // Float operands give IEEE results instead.
    assert!(matches!(arith(BinOp::Mod, Value::Float(1.0), Value::Int(0)), Value::Float(f) if f.is_nan()));
}

#[test]
fn string_operands_coerce() {
    assert!(matches!(arith(BinOp::Add, Value::from("10"), Value::Int(1)), Value::Int(11)));
    assert!(matches!(arith(BinOp::Mul, Value::from("0x10"), Value::from("2.0")), Value::Float(f) if f == 32.0));
    let err = ops::arith(BinOp::Add, &Value::from("x"), &Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to perform arithmetic on a string value");
    assert_eq!(err.kind(), ErrorKind::Type);
}

// ── Bitwise ─────────────────────────────────────────────────

#[test]
fn bitwise_operations() {
    let bit = |op, a, b| ops::bitwise(op, &a, &b).unwrap();
    assert!(matches!(bit(BinOp::BitAnd, Value::Int(0b1100), Value::Int(0b1010)), Value::Int(0b1000)));
    assert!(matches!(bit(BinOp::BitOr, Value::Float(4.0), Value::from("1")), Value::Int(5)));
    assert!(matches!(bit(BinOp::Shr, Value::Int(-1), Value::Int(60)), Value::Int(15)));
    assert!(matches!(bit(BinOp::Shl, Value::Int(1), Value::Int(64)), Value::Int(0)));
    assert!(matches!(bit(BinOp::Shl, Value::Int(8), Value::Int(-2)), Value::Int(2)));
    assert!(matches!(ops::bitwise_not(&Value::Int(0)).unwrap(), Value::Int(-1)));
}

#[test]
fn bitwise_errors() {
    let err = ops::bitwise(BinOp::BitAnd, &Value::Float(1.5), &Value::Int(1)).unwrap_err();
    assert_eq!(err.to_string(), "number has no integer representation");
    assert_eq!(err.kind(), ErrorKind::Domain);
    let err = ops::bitwise(BinOp::BitAnd, &Value::Float(1.5), &Value::Bool(true)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to perform bitwise operation on a boolean value");
}

// ── Comparison ──────────────────────────────────────────────

#[test]
fn mixed_comparisons_are_exact() {
    let lt = |a, b| ops::less_than(&a, &b).unwrap();
    assert!(lt(Value::Int(1), Value::Float(1.5)));
    assert!(!lt(Value::Float(1.0), Value::Int(1)));
    assert!(lt(Value::Int(i64::MAX), Value::Float(9_223_372_036_854_775_808.0)));
    assert!(!lt(Value::Int(1), Value::Float(f64::NAN)));
    assert!(!lt(Value::Float(f64::NAN), Value::Int(1)));
    assert!(ops::less_equal(&Value::Int(2), &Value::Float(2.0)).unwrap());
}

#[test]
fn strings_compare_bytewise() {
    assert!(ops::less_than(&Value::from("a"), &Value::from("b")).unwrap());
    assert!(ops::less_than(&Value::from("Z"), &Value::from("a")).unwrap());
    assert!(ops::less_than(&Value::from(""), &Value::from("\0")).unwrap());
    assert!(ops::less_equal(&Value::from("abc"), &Value::from("abc")).unwrap());
}

#[test]
fn comparison_errors() {
    let err = ops::less_than(&Value::Int(1), &Value::from("2")).unwrap_err();
    assert_eq!(err.to_string(), "attempt to compare number with string");
    let err = ops::less_than(&Value::new_table(), &Value::new_table()).unwrap_err();
    assert_eq!(err.to_string(), "attempt to compare two table values");
}

// ── Concatenation and length ────────────────────────────────

#[test]
fn concat_numbers_and_strings() {
    assert_eq!(ops::concat(&Value::from("a"), &Value::Int(1)).unwrap(), Value::from("a1"));
    assert_eq!(ops::concat(&Value::Float(1.0), &Value::from("")).unwrap(), Value::from("1.0"));
    let err = ops::concat(&Value::from("a"), &Value::Nil).unwrap_err();
    assert_eq!(err.to_string(), "attempt to concatenate a nil value");
}

#[test]
fn raw_length() {
    assert_eq!(ops::length(&Value::from("héllo")).unwrap(), Value::Int(6));
    let err = ops::length(&Value::Int(3)).unwrap_err();
    assert_eq!(err.to_string(), "attempt to get length of a number value");
}

// ── Laws ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn add_wraps_like_twos_complement(a in any::<i64>(), b in any::<i64>()) {
        prop_assert!(matches!(
            arith(BinOp::Add, Value::Int(a), Value::Int(b)),
            Value::Int(r) if r == a.wrapping_add(b)
        ));
    }

    #[test]
    fn floor_division_identity(a in any::<i64>(), b in any::<i64>().prop_filter("nonzero", |b| *b != 0)) {
        let q = ops::int_floor_div(a, b).unwrap();
        let r = ops::int_mod(a, b).unwrap();
        prop_assert_eq!(q.wrapping_mul(b).wrapping_add(r), a);
        // The remainder takes the divisor's sign and is smaller in magnitude.
        prop_assert!(r == 0 || (r < 0) == (b < 0));
        prop_assert!((r as i128).abs() < (b as i128).abs());
    }

    #[test]
    fn int_float_comparison_is_consistent(i in -(1i64 << 52)..(1i64 << 52), f in -1e16f64..1e16f64) {
        let (a, b) = (Value::Int(i), Value::Float(f));
        let lt = ops::less_than(&a, &b).unwrap();
        let le = ops::less_equal(&a, &b).unwrap();
        let gt = ops::less_than(&b, &a).unwrap();
        let eq = a == b;
        prop_assert_eq!(lt, (i as f64) < f);
        prop_assert_eq!(le, lt || eq);
        prop_assert_eq!(lt as u8 + eq as u8 + gt as u8, 1);
    }

    #[test]
    fn integer_numerals_round_trip(i in any::<i64>()) {
        prop_assert!(matches!(ops::str_to_number(&i.to_string()), Some(Number::Int(n)) if n == i));
    }
}
