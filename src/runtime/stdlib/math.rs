//! `math` library.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::runtime::native::{arg, bad_argument, NativeFunction};
use crate::runtime::ops;
use crate::runtime::value::{float_to_int, Number, Value};
use crate::runtime::{Interpreter, RuntimeError};

use super::library;

pub fn open(interp: &mut Interpreter) {
    let state = Rc::new(Cell::new(time_seed()));
    let random_state = state.clone();

    let table = library(vec![
        NativeFunction::raw("abs", &["x"], 1, false, |_, args| {
            Ok(vec![match number(&args, 0, "abs")? {
                Number::Int(i) => Value::Int(i.wrapping_abs()),
                Number::Float(f) => Value::Float(f.abs()),
            }])
        }),
        NativeFunction::raw("ceil", &["x"], 1, false, |_, args| {
            Ok(vec![round_with(number(&args, 0, "ceil")?, f64::ceil)])
        }),
        NativeFunction::raw("floor", &["x"], 1, false, |_, args| {
            Ok(vec![round_with(number(&args, 0, "floor")?, f64::floor)])
        }),
        float_fn("sqrt", f64::sqrt),
        float_fn("sin", f64::sin),
        float_fn("cos", f64::cos),
        float_fn("tan", f64::tan),
        float_fn("asin", f64::asin),
        float_fn("acos", f64::acos),
        float_fn("exp", f64::exp),
        NativeFunction::raw("atan", &["y", "x"], 1, false, |_, args| {
            let y: f64 = arg(&args, 0, "atan")?;
            let x: Option<f64> = arg(&args, 1, "atan")?;
            Ok(vec![Value::Float(y.atan2(x.unwrap_or(1.0)))])
        }),
        NativeFunction::raw("log", &["x", "base"], 1, false, |_, args| {
            let x: f64 = arg(&args, 0, "log")?;
            let base: Option<f64> = arg(&args, 1, "log")?;
            let result = match base {
                None => x.ln(),
                Some(b) if b == 2.0 => x.log2(),
                Some(b) if b == 10.0 => x.log10(),
                Some(b) => x.ln() / b.ln(),
            };
            Ok(vec![Value::Float(result)])
        }),
        NativeFunction::raw("fmod", &["x", "y"], 2, false, fmod),
        NativeFunction::raw("modf", &["x"], 1, false, |_, args| {
            let x = number(&args, 0, "modf")?;
            Ok(match x {
                Number::Int(i) => vec![Value::Int(i), Value::Float(0.0)],
                Number::Float(f) => {
                    let int_part = f.trunc();
                    let frac = if int_part == f { 0.0 } else { f - int_part };
                    vec![Value::Float(int_part), Value::Float(frac)]
                }
            })
        }),
        NativeFunction::raw("max", &["x"], 1, true, |_, args| {
            extremum(&args, "max", |best, candidate| ops::num_lt(best, candidate))
        }),
        NativeFunction::raw("min", &["x"], 1, true, |_, args| {
            extremum(&args, "min", |best, candidate| ops::num_lt(candidate, best))
        }),
        NativeFunction::raw("tointeger", &["x"], 1, false, |_, args| {
            Ok(vec![match &args[0] {
                Value::Int(i) => Value::Int(*i),
                Value::Float(f) => float_to_int(*f).map_or(Value::Nil, Value::Int),
                _ => Value::Nil,
            }])
        }),
        NativeFunction::raw("type", &["x"], 1, false, |_, args| {
            Ok(vec![match &args[0] {
                Value::Int(_) => Value::from("integer"),
                Value::Float(_) => Value::from("float"),
                _ => Value::Nil,
            }])
        }),
        NativeFunction::raw("ult", &["m", "n"], 2, false, |_, args| {
            let m: i64 = arg(&args, 0, "ult")?;
            let n: i64 = arg(&args, 1, "ult")?;
            Ok(vec![Value::Bool((m as u64) < (n as u64))])
        }),
        NativeFunction::raw("random", &["m", "n"], 0, false, move |_, args| {
            random(&random_state, &args)
        }),
        NativeFunction::raw("randomseed", &["x"], 0, false, move |_, args| {
            let seed = match args.first() {
                None | Some(Value::Nil) => time_seed(),
                Some(_) => match number(&args, 0, "randomseed")? {
                    Number::Int(i) => i as u64,
                    Number::Float(f) => f.to_bits(),
                },
            };
            state.set(seed);
            Ok(vec![Value::Int(seed as i64)])
        }),
    ]);

    {
        let mut t = table.borrow_mut();
        t.set_str("pi", Value::Float(std::f64::consts::PI));
        t.set_str("huge", Value::Float(f64::INFINITY));
        t.set_str("maxinteger", Value::Int(i64::MAX));
        t.set_str("mininteger", Value::Int(i64::MIN));
    }
    interp.set_global("math", Value::from(table));
}

fn number(args: &[Value], index: usize, fname: &str) -> Result<Number, RuntimeError> {
    let v = args.get(index).unwrap_or(&Value::Nil);
    ops::to_number(v).ok_or_else(|| {
        let got = if v.is_nil() { "no value" } else { v.type_name() };
        bad_argument(index, fname, &format!("number expected, got {}", got))
    })
}

fn float_fn(name: &'static str, f: fn(f64) -> f64) -> NativeFunction {
    NativeFunction::raw(name, &["x"], 1, false, move |_, args| {
        let x: f64 = arg(&args, 0, name)?;
        Ok(vec![Value::Float(f(x))])
    })
}

/// Integers pass through; floats round and become integers when they fit.
fn round_with(x: Number, round: fn(f64) -> f64) -> Value {
    match x {
        Number::Int(i) => Value::Int(i),
        Number::Float(f) => {
            let r = round(f);
            float_to_int(r).map_or(Value::Float(r), Value::Int)
        }
    }
}

fn fmod(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let a = number(&args, 0, "fmod")?;
    let b = number(&args, 1, "fmod")?;
    Ok(vec![match (a, b) {
        (Number::Int(_), Number::Int(0)) => {
            return Err(bad_argument(1, "fmod", "zero"));
        }
        // Truncated remainder; -1 is special-cased to avoid MIN % -1.
        (Number::Int(_), Number::Int(-1)) => Value::Int(0),
        (Number::Int(x), Number::Int(y)) => Value::Int(x % y),
        (x, y) => Value::Float(x.to_f64() % y.to_f64()),
    }])
}

fn extremum(
    args: &[Value],
    fname: &str,
    better: impl Fn(Number, Number) -> bool,
) -> Result<Vec<Value>, RuntimeError> {
    let mut best = number(args, 0, fname)?;
    for i in 1..args.len() {
        let candidate = number(args, i, fname)?;
        if better(best, candidate) {
            best = candidate;
        }
    }
    Ok(vec![Value::from(best)])
}

// ── Pseudo-random numbers ───────────────────────────────────────────────

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x2545_f491_4f6c_dd1d)
}

/// splitmix64 step.
fn next_random(state: &Cell<u64>) -> u64 {
    let s = state.get().wrapping_add(0x9e37_79b9_7f4a_7c15);
    state.set(s);
    let mut z = s;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn random(state: &Cell<u64>, args: &[Value]) -> Result<Vec<Value>, RuntimeError> {
    let (low, high) = match args.len() {
        0 => {
            let bits = next_random(state) >> 11;
            return Ok(vec![Value::Float(bits as f64 / (1u64 << 53) as f64)]);
        }
        1 => {
            let m: i64 = arg(args, 0, "random")?;
            if m == 0 {
                return Ok(vec![Value::Int(next_random(state) as i64)]);
            }
            (1, m)
        }
        _ => (arg::<i64>(args, 0, "random")?, arg::<i64>(args, 1, "random")?),
    };
    if low > high {
        return Err(bad_argument(args.len() - 1, "random", "interval is empty"));
    }
    let span = (high as u64).wrapping_sub(low as u64);
    let offset = if span == u64::MAX {
        next_random(state)
    } else {
        next_random(state) % (span + 1)
    };
    Ok(vec![Value::Int((low as u64).wrapping_add(offset) as i64)])
}
