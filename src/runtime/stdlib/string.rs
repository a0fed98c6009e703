//! `string` library and the shared string metatable.

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::native::{arg, bad_argument, NativeFunction};
use crate::runtime::value::{Table, Value};
use crate::runtime::{Interpreter, RuntimeError};

use super::library;

/// Upper bound on strings built by `rep`.
const MAX_STRING_SIZE: usize = i32::MAX as usize;

pub fn open(interp: &mut Interpreter) {
    let table = library(vec![
        NativeFunction::raw("len", &["s"], 1, false, |_, args| {
            let s: Vec<u8> = arg(&args, 0, "len")?;
            Ok(vec![Value::Int(s.len() as i64)])
        }),
        NativeFunction::raw("sub", &["s", "i", "j"], 2, false, sub),
        NativeFunction::raw("upper", &["s"], 1, false, |_, args| {
            let s: Vec<u8> = arg(&args, 0, "upper")?;
            Ok(vec![Value::from(s.to_ascii_uppercase())])
        }),
        NativeFunction::raw("lower", &["s"], 1, false, |_, args| {
            let s: Vec<u8> = arg(&args, 0, "lower")?;
            Ok(vec![Value::from(s.to_ascii_lowercase())])
        }),
        NativeFunction::raw("rep", &["s", "n", "sep"], 2, false, rep),
        NativeFunction::raw("reverse", &["s"], 1, false, |_, args| {
            let mut s: Vec<u8> = arg(&args, 0, "reverse")?;
            s.reverse();
            Ok(vec![Value::from(s)])
        }),
        NativeFunction::raw("byte", &["s", "i", "j"], 1, false, byte),
        NativeFunction::raw("char", &[], 0, true, |_, args| {
            let mut out = Vec::with_capacity(args.len());
            for i in 0..args.len() {
                let c: i64 = arg(&args, i, "char")?;
                let c = u8::try_from(c).map_err(|_| bad_argument(i, "char", "value out of range"))?;
                out.push(c);
            }
            Ok(vec![Value::from(out)])
        }),
        NativeFunction::raw("format", &["formatstring"], 1, true, format),
    ]);

    let mut meta = Table::new();
    meta.set_str("__index", Value::from(table.clone()));
    interp.set_string_metatable(Some(Rc::new(RefCell::new(meta))));
    interp.set_global("string", Value::from(table));
}

/// Start position: negative counts from the end, clamped to 1.
fn start_index(pos: i64, len: usize) -> usize {
    let len = len as i64;
    if pos > 0 {
        pos as usize
    } else if pos == 0 || pos < -len {
        1
    } else {
        (len + pos + 1) as usize
    }
}

/// End position: negative counts from the end, clamped to `len`.
fn end_index(pos: i64, len: usize) -> usize {
    let ilen = len as i64;
    if pos > ilen {
        len
    } else if pos >= 0 {
        pos as usize
    } else if pos < -ilen {
        0
    } else {
        (ilen + pos + 1) as usize
    }
}

fn sub(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let s: Vec<u8> = arg(&args, 0, "sub")?;
    let i: i64 = arg(&args, 1, "sub")?;
    let j: Option<i64> = arg(&args, 2, "sub")?;
    let start = start_index(i, s.len());
    let end = end_index(j.unwrap_or(-1), s.len());
    if start > end {
        return Ok(vec![Value::from("")]);
    }
    Ok(vec![Value::from(&s[start - 1..end])])
}

fn rep(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let s: Vec<u8> = arg(&args, 0, "rep")?;
    let n: i64 = arg(&args, 1, "rep")?;
    let sep: Option<Vec<u8>> = arg(&args, 2, "rep")?;
    let sep = sep.unwrap_or_default();
    if n <= 0 {
        return Ok(vec![Value::from("")]);
    }
    let n = n as usize;
    let total = (s.len() + sep.len())
        .checked_mul(n)
        .filter(|&t| t <= MAX_STRING_SIZE);
    let Some(total) = total else {
        return Err(RuntimeError::Raised(Value::from("resulting string too large")));
    };
    let mut out = Vec::with_capacity(total);
    for k in 0..n {
        if k > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(&s);
    }
    Ok(vec![Value::from(out)])
}

fn byte(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let s: Vec<u8> = arg(&args, 0, "byte")?;
    let i: Option<i64> = arg(&args, 1, "byte")?;
    let i = i.unwrap_or(1);
    let j: Option<i64> = arg(&args, 2, "byte")?;
    let start = start_index(i, s.len());
    let end = end_index(j.unwrap_or(i), s.len());
    if start > end {
        return Ok(Vec::new());
    }
    Ok(s[start - 1..end].iter().map(|&b| Value::Int(b as i64)).collect())
}

// ── string.format ───────────────────────────────────────────────────────

/// One `%` directive: flags, width, precision, conversion.
#[derive(Clone, Copy)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    conversion: u8,
}

fn format(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let fmt: Vec<u8> = arg(&args, 0, "format")?;
    let mut out = Vec::with_capacity(fmt.len());
    let mut next_arg = 1;
    let mut pos = 0;

    while pos < fmt.len() {
        let c = fmt[pos];
        pos += 1;
        if c != b'%' {
            out.push(c);
            continue;
        }
        if fmt.get(pos) == Some(&b'%') {
            out.push(b'%');
            pos += 1;
            continue;
        }

        let directive_start = pos;
        let spec = parse_spec(&fmt, &mut pos)
            .ok_or_else(|| invalid_conversion(&fmt[directive_start..pos.min(fmt.len())]))?;
        if !b"diucxXoeEfFgGaAqs".contains(&spec.conversion) {
            return Err(invalid_conversion(&fmt[directive_start..pos]));
        }
        let index = next_arg;
        next_arg += 1;
        if index >= args.len() {
            return Err(bad_argument(index, "format", "no value"));
        }
        let value = &args[index];

        let body: Vec<u8> = match spec.conversion {
            b'd' | b'i' => {
                let n: i64 = arg(&args, index, "format")?;
                format_signed(n, &spec).into_bytes()
            }
            b'u' => {
                let n: i64 = arg(&args, index, "format")?;
                let digits = digits_with_precision((n as u64).to_string(), &spec);
                pad_number(String::new(), digits, &spec).into_bytes()
            }
            b'c' => {
                let n: i64 = arg(&args, index, "format")?;
                pad(vec![n as u8], &spec)
            }
            b'x' | b'X' | b'o' => {
                let n: i64 = arg(&args, index, "format")?;
                format_unsigned(n as u64, &spec).into_bytes()
            }
            b'e' | b'E' | b'f' | b'F' | b'g' | b'G' => {
                let x: f64 = arg(&args, index, "format")?;
                format_float_spec(x, &spec).into_bytes()
            }
            b'a' | b'A' => {
                let x: f64 = arg(&args, index, "format")?;
                let sign = float_sign(x, &spec);
                let mut body = hex_float(x.abs());
                if spec.conversion == b'A' {
                    body = body.to_ascii_uppercase();
                }
                pad_number(sign, body, &spec).into_bytes()
            }
            b'q' => quoted(value).map_err(|reason| bad_argument(index, "format", reason))?,
            b's' => {
                let s = match interp.tostring(value)? {
                    Value::Str(s) => s.to_vec(),
                    other => other.to_string().into_bytes(),
                };
                let s = match spec.precision {
                    Some(p) if p < s.len() => s[..p].to_vec(),
                    _ => s,
                };
                pad(s, &spec)
            }
            _ => return Err(invalid_conversion(&fmt[directive_start..pos])),
        };
        out.extend_from_slice(&body);
    }
    Ok(vec![Value::from(out)])
}

fn invalid_conversion(directive: &[u8]) -> RuntimeError {
    RuntimeError::Raised(Value::from(format!(
        "invalid conversion '%{}' to 'format'",
        String::from_utf8_lossy(directive)
    )))
}

fn parse_spec(fmt: &[u8], pos: &mut usize) -> Option<Spec> {
    let mut spec = Spec {
        left: false,
        plus: false,
        space: false,
        alt: false,
        zero: false,
        width: 0,
        precision: None,
        conversion: 0,
    };
    while let Some(&c) = fmt.get(*pos) {
        match c {
            b'-' => spec.left = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alt = true,
            b'0' => spec.zero = true,
            _ => break,
        }
        *pos += 1;
    }
    spec.width = read_digits(fmt, pos)?;
    if fmt.get(*pos) == Some(&b'.') {
        *pos += 1;
        spec.precision = Some(read_digits(fmt, pos)?);
    }
    spec.conversion = *fmt.get(*pos)?;
    *pos += 1;
    Some(spec)
}

/// At most two digits, as in C format directives.
fn read_digits(fmt: &[u8], pos: &mut usize) -> Option<usize> {
    let mut value = 0;
    let mut count = 0;
    while let Some(&c) = fmt.get(*pos) {
        if !c.is_ascii_digit() {
            break;
        }
        count += 1;
        if count > 2 {
            return None;
        }
        value = value * 10 + (c - b'0') as usize;
        *pos += 1;
    }
    Some(value)
}

fn pad(body: Vec<u8>, spec: &Spec) -> Vec<u8> {
    if body.len() >= spec.width {
        return body;
    }
    let fill = vec![b' '; spec.width - body.len()];
    if spec.left {
        [body, fill].concat()
    } else {
        [fill, body].concat()
    }
}

/// Pad a number whose sign (or prefix) is kept apart so zero padding goes
/// between the sign and the digits.
fn pad_number(sign: String, digits: String, spec: &Spec) -> String {
    let len = sign.len() + digits.len();
    if len >= spec.width {
        return sign + &digits;
    }
    let fill = spec.width - len;
    if spec.left {
        format!("{}{}{}", sign, digits, " ".repeat(fill))
    } else if spec.zero && !(is_integer_conversion(spec) && spec.precision.is_some()) {
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, digits)
    }
}

fn is_integer_conversion(spec: &Spec) -> bool {
    matches!(spec.conversion, b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b'c')
}

/// Integer precision is a minimum digit count.
fn digits_with_precision(digits: String, spec: &Spec) -> String {
    match spec.precision {
        Some(0) if digits == "0" => String::new(),
        Some(p) if p > digits.len() => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    }
}

fn format_signed(n: i64, spec: &Spec) -> String {
    let sign = if n < 0 {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    let digits = digits_with_precision(n.unsigned_abs().to_string(), spec);
    pad_number(sign.to_string(), digits, spec)
}

fn format_unsigned(n: u64, spec: &Spec) -> String {
    let digits = match spec.conversion {
        b'x' => format!("{:x}", n),
        b'X' => format!("{:X}", n),
        _ => format!("{:o}", n),
    };
    let mut digits = digits_with_precision(digits, spec);
    let prefix = match spec.conversion {
        b'x' if spec.alt && n != 0 => "0x",
        b'X' if spec.alt && n != 0 => "0X",
        b'o' if spec.alt && !digits.starts_with('0') => {
            digits.insert(0, '0');
            ""
        }
        _ => "",
    };
    pad_number(prefix.to_string(), digits, spec)
}

fn float_sign(x: f64, spec: &Spec) -> String {
    let sign = if x.is_sign_negative() && !x.is_nan() {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };
    sign.to_string()
}

fn format_float_spec(x: f64, spec: &Spec) -> String {
    let sign = float_sign(x, spec);
    let upper = spec.conversion.is_ascii_uppercase();
    if !x.is_finite() {
        let body = if x.is_nan() { "nan" } else { "inf" };
        let body = if upper { body.to_uppercase() } else { body.to_string() };
        let mut no_zero = *spec;
        no_zero.zero = false;
        return pad_number(sign, body, &no_zero);
    }
    let precision = spec.precision.unwrap_or(6);
    let ax = x.abs();
    let body = match spec.conversion.to_ascii_lowercase() {
        b'f' => format!("{:.*}", precision, ax),
        b'e' => exponent_form(ax, precision),
        _ => general_form(ax, precision, spec.alt),
    };
    let body = if upper { body.to_uppercase() } else { body };
    pad_number(sign, body, spec)
}

/// `d.ddde+XX` with at least two exponent digits.
fn exponent_form(x: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, x);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (exp_sign, exp_digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, exp_sign, exp_digits)
        }
        None => raw,
    }
}

/// `%g`: the shorter of fixed and exponent forms, trailing zeros removed
/// unless `#` was given.
fn general_form(x: f64, precision: usize, alt: bool) -> String {
    let p = if precision == 0 { 1 } else { precision };
    let exp = if x == 0.0 {
        0
    } else {
        let e = exponent_form(x, p - 1);
        e.split_once('e')
            .and_then(|(_, exp)| exp.parse::<i32>().ok())
            .unwrap_or(0)
    };
    let mut body = if exp < -4 || exp >= p as i32 {
        exponent_form(x, p - 1)
    } else {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, x)
    };
    if !alt {
        body = strip_trailing_zeros(&body);
    }
    body
}

fn strip_trailing_zeros(body: &str) -> String {
    let (mantissa, exponent) = match body.find('e') {
        Some(at) => body.split_at(at),
        None => (body, ""),
    };
    if !mantissa.contains('.') {
        return body.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, exponent)
}

/// `%a` body for a non-negative float: `0x1.8p+1`.
fn hex_float(x: f64) -> String {
    if x.is_infinite() {
        return "inf".to_string();
    }
    if x.is_nan() {
        return "nan".to_string();
    }
    if x == 0.0 {
        return "0x0p+0".to_string();
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & ((1u64 << 52) - 1);
    let (lead, exp) = if biased == 0 {
        (0, -1022)
    } else {
        (1, biased - 1023)
    };
    let digits = format!("{:013x}", mantissa);
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        format!("0x{}p{:+}", lead, exp)
    } else {
        format!("0x{}.{}p{:+}", lead, digits, exp)
    }
}

/// `%q`: a literal that reads back as the same value.
fn quoted(value: &Value) -> Result<Vec<u8>, &'static str> {
    match value {
        Value::Str(s) => {
            let mut out = vec![b'"'];
            for (i, &b) in s.iter().enumerate() {
                match b {
                    b'"' | b'\\' => {
                        out.push(b'\\');
                        out.push(b);
                    }
                    b'\n' => out.extend_from_slice(b"\\\n"),
                    b'\r' => out.extend_from_slice(b"\\r"),
                    0 => {
                        let next_is_digit = s.get(i + 1).map_or(false, u8::is_ascii_digit);
                        out.extend_from_slice(if next_is_digit { b"\\000" } else { b"\\0" });
                    }
                    c if c.is_ascii_control() => {
                        let next_is_digit = s.get(i + 1).map_or(false, u8::is_ascii_digit);
                        let escaped = if next_is_digit {
                            format!("\\{:03}", c)
                        } else {
                            format!("\\{}", c)
                        };
                        out.extend_from_slice(escaped.as_bytes());
                    }
                    c => out.push(c),
                }
            }
            out.push(b'"');
            Ok(out)
        }
        Value::Int(i) if *i == i64::MIN => Ok(b"0x8000000000000000".to_vec()),
        Value::Int(i) => Ok(i.to_string().into_bytes()),
        Value::Float(f) if f.is_nan() => Ok(b"(0/0)".to_vec()),
        Value::Float(f) if f.is_infinite() => {
            Ok(if *f > 0.0 { b"1e9999".to_vec() } else { b"-1e9999".to_vec() })
        }
        Value::Float(f) => {
            let sign = if f.is_sign_negative() { "-" } else { "" };
            Ok(format!("{}{}", sign, hex_float(f.abs())).into_bytes())
        }
        Value::Nil | Value::Bool(_) => Ok(value.to_string().into_bytes()),
        _ => Err("value has no literal form"),
    }
}
