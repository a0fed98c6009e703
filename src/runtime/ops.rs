//! Operator semantics over plain values: arithmetic, bitwise, comparison,
//! concatenation, length and string→number coercion.
//!
//! Nothing here looks at metatables or scopes. A `Type` error from these
//! functions means "no raw meaning"; the interpreter then tries a
//! metamethod before reporting it.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use super::error::{domain_error, type_error, RuntimeError};
use super::value::{Number, Value};
use crate::ast::BinOp;

// ── String → number ─────────────────────────────────────────────────────

fn numeral_regex() -> Option<&'static Regex> {
    static NUMERAL: OnceLock<Option<Regex>> = OnceLock::new();
    NUMERAL
        .get_or_init(|| {
            Regex::new(
                r"(?x)
                ^[\ \t\n\r\x0B\x0C]*
                (?P<sign>[-+])?
                (?:
                    0[xX] (?P<hint>[0-9a-fA-F]*) (?:\.(?P<hfrac>[0-9a-fA-F]*))? (?:[pP](?P<hexp>[-+]?[0-9]+))?
                  | (?P<dint>[0-9]*) (?:\.(?P<dfrac>[0-9]*))? (?:[eE](?P<dexp>[-+]?[0-9]+))?
                )
                [\ \t\n\r\x0B\x0C]*$",
            )
            .ok()
        })
        .as_ref()
}

/// Convert a numeral the way the language reads it, surrounding whitespace
/// allowed. Decimal integers that overflow become floats; hexadecimal
/// integers wrap around modulo 2^64.
pub fn str_to_number(text: &str) -> Option<Number> {
    let caps = numeral_regex()?.captures(text)?;
    let negative = caps.name("sign").map(|m| m.as_str() == "-").unwrap_or(false);
    let group = |name: &str| caps.name(name).map(|m| m.as_str());

    if let Some(int_digits) = group("hint") {
        let frac_digits = group("hfrac");
        let exponent = group("hexp");
        if int_digits.is_empty() && frac_digits.map_or(true, str::is_empty) {
            return None;
        }
        if frac_digits.is_none() && exponent.is_none() {
            let mut value: i64 = 0;
            for c in int_digits.chars() {
                let digit = c.to_digit(16)? as i64;
                value = value.wrapping_mul(16).wrapping_add(digit);
            }
            return Some(Number::Int(if negative { value.wrapping_neg() } else { value }));
        }
        let mut mantissa = 0.0f64;
        let mut exp: i64 = 0;
        for c in int_digits.chars() {
            mantissa = mantissa * 16.0 + c.to_digit(16)? as f64;
        }
        for c in frac_digits.unwrap_or("").chars() {
            mantissa = mantissa * 16.0 + c.to_digit(16)? as f64;
            exp -= 4;
        }
        if let Some(e) = exponent {
            let e = e
                .parse::<i64>()
                .unwrap_or(if e.starts_with('-') { -100_000 } else { 100_000 });
            exp = exp.saturating_add(e);
        }
        let value = if mantissa == 0.0 {
            0.0
        } else {
            mantissa * 2f64.powi(exp.clamp(-100_000, 100_000) as i32)
        };
        return Some(Number::Float(if negative { -value } else { value }));
    }

    let int_digits = group("dint").unwrap_or("");
    let frac_digits = group("dfrac");
    let exponent = group("dexp");
    if int_digits.is_empty() && frac_digits.map_or(true, str::is_empty) {
        return None;
    }
    let trimmed = text.trim_matches(|c: char| " \t\n\r\x0b\x0c".contains(c));
    if frac_digits.is_none() && exponent.is_none() {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Number::Int(i));
        }
    }
    trimmed.parse::<f64>().ok().map(Number::Float)
}

/// Numeric view of a value, coercing numeric strings.
pub fn to_number(v: &Value) -> Option<Number> {
    match v {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        Value::Str(s) => std::str::from_utf8(s).ok().and_then(str_to_number),
        _ => None,
    }
}

/// Integer view of a value: integers, floats with an exact integer value,
/// or strings converting to either.
pub fn to_integer(v: &Value) -> Option<i64> {
    to_number(v).and_then(Number::to_i64)
}

// ── Arithmetic ──────────────────────────────────────────────────────────

pub fn is_arith(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod | BinOp::Pow
    )
}

pub fn is_bitwise(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr
    )
}

/// `a op b` for the arithmetic operators.
pub fn arith(op: BinOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (to_number(a), to_number(b)) {
        (Some(x), Some(y)) => arith_numbers(op, x, y).map(Value::from),
        (None, _) => Err(arith_type_error(a)),
        (_, None) => Err(arith_type_error(b)),
    }
}

fn arith_type_error(bad: &Value) -> RuntimeError {
    type_error(format!(
        "attempt to perform arithmetic on a {} value",
        bad.type_name()
    ))
}

pub fn arith_numbers(op: BinOp, x: Number, y: Number) -> Result<Number, RuntimeError> {
    if let (Number::Int(a), Number::Int(b)) = (x, y) {
        match op {
            BinOp::Add => return Ok(Number::Int(a.wrapping_add(b))),
            BinOp::Sub => return Ok(Number::Int(a.wrapping_sub(b))),
            BinOp::Mul => return Ok(Number::Int(a.wrapping_mul(b))),
            BinOp::IDiv => return int_floor_div(a, b).map(Number::Int),
            BinOp::Mod => return int_mod(a, b).map(Number::Int),
            _ => {}
        }
    }
    let (a, b) = (x.to_f64(), y.to_f64());
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Pow => a.powf(b),
        BinOp::IDiv => (a / b).floor(),
        BinOp::Mod => float_mod(a, b),
        other => {
            return Err(type_error(format!(
                "'{}' is not an arithmetic operator",
                other.symbol()
            )))
        }
    };
    Ok(Number::Float(result))
}

/// Floor division; the quotient rounds toward negative infinity.
pub fn int_floor_div(a: i64, b: i64) -> Result<i64, RuntimeError> {
    match b {
        0 => Err(domain_error("attempt to perform 'n//0'")),
        -1 => Ok(a.wrapping_neg()),
        _ => {
            let q = a / b;
            if a % b != 0 && (a < 0) != (b < 0) {
                Ok(q - 1)
            } else {
                Ok(q)
            }
        }
    }
}

/// Modulo whose result takes the sign of the divisor.
pub fn int_mod(a: i64, b: i64) -> Result<i64, RuntimeError> {
    match b {
        0 => Err(domain_error("attempt to perform 'n%0'")),
        -1 => Ok(0),
        _ => {
            let r = a % b;
            if r != 0 && (r < 0) != (b < 0) {
                Ok(r + b)
            } else {
                Ok(r)
            }
        }
    }
}

pub fn float_mod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if (m > 0.0 && b < 0.0) || (m < 0.0 && b > 0.0) {
        m + b
    } else {
        m
    }
}

/// Unary minus.
pub fn negate(v: &Value) -> Result<Value, RuntimeError> {
    match to_number(v) {
        Some(Number::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        Some(Number::Float(f)) => Ok(Value::Float(-f)),
        None => Err(arith_type_error(v)),
    }
}

// ── Bitwise ─────────────────────────────────────────────────────────────

fn bitwise_operand(v: &Value) -> Result<i64, RuntimeError> {
    match to_number(v) {
        Some(n) => n
            .to_i64()
            .ok_or_else(|| domain_error("number has no integer representation")),
        None => Err(type_error(format!(
            "attempt to perform bitwise operation on a {} value",
            v.type_name()
        ))),
    }
}

pub fn bitwise(op: BinOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    // A non-number operand is reported before a fractional one.
    for v in [a, b] {
        if to_number(v).is_none() {
            bitwise_operand(v)?;
        }
    }
    let (x, y) = (bitwise_operand(a)?, bitwise_operand(b)?);
    let result = match op {
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::Shl => shift_left(x, y),
        BinOp::Shr => shift_left(x, y.wrapping_neg()),
        other => {
            return Err(type_error(format!(
                "'{}' is not a bitwise operator",
                other.symbol()
            )))
        }
    };
    Ok(Value::Int(result))
}

pub fn bitwise_not(v: &Value) -> Result<Value, RuntimeError> {
    Ok(Value::Int(!bitwise_operand(v)?))
}

/// Logical shift; negative counts shift right, counts of 64 or more clear
/// every bit.
pub fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> (-n)) as i64
    }
}

// ── Comparison ──────────────────────────────────────────────────────────

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

fn int_lt_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= TWO_POW_63 {
        return true;
    }
    let c = f.ceil();
    if c < -TWO_POW_63 {
        return false;
    }
    i < c as i64
}

fn int_le_float(i: i64, f: f64) -> bool {
    if f.is_nan() {
        return false;
    }
    if f >= TWO_POW_63 {
        return true;
    }
    let fl = f.floor();
    if fl < -TWO_POW_63 {
        return false;
    }
    i <= fl as i64
}

fn float_lt_int(f: f64, i: i64) -> bool {
    if f.is_nan() || f >= TWO_POW_63 {
        return false;
    }
    let fl = f.floor();
    if fl < -TWO_POW_63 {
        return true;
    }
    (fl as i64) < i
}

fn float_le_int(f: f64, i: i64) -> bool {
    if f.is_nan() || f >= TWO_POW_63 {
        return false;
    }
    let c = f.ceil();
    if c < -TWO_POW_63 {
        return true;
    }
    (c as i64) <= i
}

/// `a < b` on numbers, exact across the integer/float boundary.
pub fn num_lt(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x < y,
        (Number::Float(x), Number::Float(y)) => x < y,
        (Number::Int(x), Number::Float(y)) => int_lt_float(x, y),
        (Number::Float(x), Number::Int(y)) => float_lt_int(x, y),
    }
}

/// `a <= b` on numbers, exact across the integer/float boundary.
pub fn num_le(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x <= y,
        (Number::Float(x), Number::Float(y)) => x <= y,
        (Number::Int(x), Number::Float(y)) => int_le_float(x, y),
        (Number::Float(x), Number::Int(y)) => float_le_int(x, y),
    }
}

fn compare_error(a: &Value, b: &Value) -> RuntimeError {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        type_error(format!("attempt to compare two {} values", ta))
    } else {
        type_error(format!("attempt to compare {} with {}", ta, tb))
    }
}

/// Raw `a < b`: numbers numerically, strings bytewise. No coercion.
pub fn less_than(a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.as_ref().cmp(y.as_ref()) == Ordering::Less),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(num_lt(x, y)),
            _ => Err(compare_error(a, b)),
        },
    }
}

/// Raw `a <= b`.
pub fn less_equal(a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.as_ref().cmp(y.as_ref()) != Ordering::Greater),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(num_le(x, y)),
            _ => Err(compare_error(a, b)),
        },
    }
}

/// Raw equality, never consulting `__eq`.
pub fn raw_equals(a: &Value, b: &Value) -> bool {
    a == b
}

// ── Strings and length ──────────────────────────────────────────────────

/// Bytes of a string or number operand of `..`.
pub fn concat_operand(v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::Str(s) => Some(s.to_vec()),
        Value::Int(_) | Value::Float(_) => Some(v.to_string().into_bytes()),
        _ => None,
    }
}

pub fn concat(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (concat_operand(a), concat_operand(b)) {
        (Some(mut x), Some(y)) => {
            x.extend_from_slice(&y);
            Ok(Value::from(x))
        }
        (None, _) => Err(concat_error(a)),
        (_, None) => Err(concat_error(b)),
    }
}

fn concat_error(bad: &Value) -> RuntimeError {
    type_error(format!(
        "attempt to concatenate a {} value",
        bad.type_name()
    ))
}

/// Raw `#v`: byte length of strings, a border of tables.
pub fn length(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        Value::Table(t) => Ok(Value::Int(t.borrow().border())),
        other => Err(type_error(format!(
            "attempt to get length of a {} value",
            other.type_name()
        ))),
    }
}
