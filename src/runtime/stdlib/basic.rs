//! Global functions: `print`, `pcall`, `setmetatable`, `tonumber`, ...

use std::cell::Cell;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::runtime::native::{arg, bad_argument, NativeFunction};
use crate::runtime::ops;
use crate::runtime::value::{Number, TableRef, Value};
use crate::runtime::{Interpreter, RuntimeError};

use super::script_error;

pub const VERSION: &str = "Lua 5.4";

pub fn open(interp: &mut Interpreter) {
    let next = NativeFunction::raw("next", &["table", "index"], 1, false, next).into_value();
    let ipairs_step =
        NativeFunction::raw("ipairs_step", &["table", "i"], 2, false, ipairs_step).into_value();
    let warnings = Rc::new(Cell::new(interp.options().warnings));

    let functions = vec![
        NativeFunction::raw("assert", &["v", "message"], 1, true, assert),
        NativeFunction::raw("error", &["message", "level"], 0, false, error),
        NativeFunction::raw("getmetatable", &["object"], 1, false, getmetatable),
        NativeFunction::raw("setmetatable", &["table", "metatable"], 2, false, setmetatable),
        NativeFunction::raw("ipairs", &["t"], 1, false, move |_, args| {
            Ok(vec![ipairs_step.clone(), args[0].clone(), Value::Int(0)])
        }),
        {
            let next = next.clone();
            NativeFunction::raw("pairs", &["t"], 1, false, move |interp, args| {
                let t = args[0].clone();
                if let Some(handler) = interp.get_metamethod(&t, "__pairs") {
                    let mut results = interp.call(&handler, vec![t])?;
                    results.resize(3, Value::Nil);
                    return Ok(results);
                }
                if !matches!(t, Value::Table(_)) {
                    let reason = format!("table expected, got {}", t.type_name());
                    return Err(bad_argument(0, "pairs", &reason));
                }
                Ok(vec![next.clone(), t, Value::Nil])
            })
        },
        NativeFunction::raw("pcall", &["f"], 1, true, pcall),
        NativeFunction::raw("xpcall", &["f", "msgh"], 2, true, xpcall),
        NativeFunction::raw("print", &[], 0, true, print),
        NativeFunction::raw("rawequal", &["v1", "v2"], 2, false, |_, args| {
            Ok(vec![Value::Bool(ops::raw_equals(&args[0], &args[1]))])
        }),
        NativeFunction::raw("rawget", &["table", "index"], 2, false, |_, args| {
            let t: TableRef = arg(&args, 0, "rawget")?;
            let v = t.borrow().get(&args[1]);
            Ok(vec![v])
        }),
        NativeFunction::raw("rawlen", &["v"], 1, false, |_, args| match &args[0] {
            Value::Table(t) => Ok(vec![Value::Int(t.borrow().border())]),
            Value::Str(s) => Ok(vec![Value::Int(s.len() as i64)]),
            _ => Err(bad_argument(0, "rawlen", "table or string expected")),
        }),
        NativeFunction::raw("rawset", &["table", "index", "value"], 3, false, |_, args| {
            let t: TableRef = arg(&args, 0, "rawset")?;
            t.borrow_mut().put(args[1].clone(), args[2].clone())?;
            Ok(vec![args[0].clone()])
        }),
        NativeFunction::raw("select", &["index"], 1, true, select),
        NativeFunction::raw("tonumber", &["e", "base"], 1, false, tonumber),
        NativeFunction::raw("tostring", &["v"], 1, false, |interp, args| {
            Ok(vec![interp.tostring(&args[0])?])
        }),
        NativeFunction::raw("type", &["v"], 1, false, |_, args| {
            Ok(vec![Value::from(args[0].type_name())])
        }),
        NativeFunction::raw("load", &["chunk", "chunkname", "mode"], 1, false, load),
        NativeFunction::raw("dofile", &["filename"], 0, false, dofile),
        NativeFunction::raw("warn", &["msg1"], 1, true, move |_, args| {
            warn(&warnings, args)
        }),
    ];

    for function in functions {
        interp.register(function);
    }
    interp.set_global("next", next);
    let globals = interp.globals().clone();
    interp.set_global("_G", Value::from(globals));
    interp.set_global("_VERSION", Value::from(VERSION));
}

fn assert(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    if args[0].is_truthy() {
        return Ok(args);
    }
    match args.get(1) {
        Some(message) => Err(RuntimeError::Raised(message.clone())),
        None => Err(RuntimeError::Raised(Value::from("assertion failed!"))),
    }
}

fn error(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let message = args.first().cloned().unwrap_or(Value::Nil);
    let level: Option<i64> = arg(&args, 1, "error")?;
    let level = level.unwrap_or(1);
    if let (Value::Str(s), true) = (&message, level > 0) {
        let mut located = interp.where_(level as usize).into_bytes();
        located.extend_from_slice(s);
        return Err(RuntimeError::Raised(Value::from(located)));
    }
    Err(RuntimeError::Raised(message))
}

fn getmetatable(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let Some(mt) = interp.get_metatable(&args[0]) else {
        return Ok(vec![Value::Nil]);
    };
    let protected = mt.borrow().get_str("__metatable");
    if protected.is_nil() {
        Ok(vec![Value::Table(mt)])
    } else {
        Ok(vec![protected])
    }
}

fn setmetatable(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let t: TableRef = arg(&args, 0, "setmetatable")?;
    let mt = match &args[1] {
        Value::Nil => None,
        Value::Table(mt) => Some(mt.clone()),
        _ => return Err(bad_argument(1, "setmetatable", "nil or table expected")),
    };
    let current = t.borrow().metatable();
    if let Some(current) = current {
        if !current.borrow().get_str("__metatable").is_nil() {
            return Err(RuntimeError::Raised(Value::from(
                "cannot change a protected metatable",
            )));
        }
    }
    t.borrow_mut().set_metatable(mt);
    Ok(vec![args[0].clone()])
}

fn next(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let t: TableRef = arg(&args, 0, "next")?;
    let key = args.get(1).cloned().unwrap_or(Value::Nil);
    let entry = t.borrow().next(&key)?;
    Ok(match entry {
        Some((k, v)) => vec![k, v],
        None => vec![Value::Nil],
    })
}

fn ipairs_step(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let i: i64 = arg(&args, 1, "ipairs_step")?;
    let i = i.wrapping_add(1);
    let v = interp.index(&args[0], &Value::Int(i))?;
    if v.is_nil() {
        Ok(vec![Value::Nil])
    } else {
        Ok(vec![Value::Int(i), v])
    }
}

fn pcall(interp: &mut Interpreter, mut args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let f = args.remove(0);
    Ok(match interp.pcall(&f, args) {
        Ok(mut results) => {
            results.insert(0, Value::Bool(true));
            results
        }
        Err(e) => vec![Value::Bool(false), e],
    })
}

fn xpcall(interp: &mut Interpreter, mut args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let f = args.remove(0);
    let handler = args.remove(0);
    Ok(match interp.pcall(&f, args) {
        Ok(mut results) => {
            results.insert(0, Value::Bool(true));
            results
        }
        Err(e) => {
            let handled = match interp.pcall(&handler, vec![e]) {
                Ok(results) => results.into_iter().next().unwrap_or(Value::Nil),
                Err(e) => e,
            };
            vec![Value::Bool(false), handled]
        }
    })
}

fn print(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let mut line = Vec::new();
    for (i, v) in args.iter().enumerate() {
        if i > 0 {
            line.push(b'\t');
        }
        match interp.tostring(v)? {
            Value::Str(s) => line.extend_from_slice(&s),
            other => line.extend_from_slice(other.to_string().as_bytes()),
        }
    }
    line.push(b'\n');
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    out.write_all(&line)
        .and_then(|_| out.flush())
        .map_err(|e| RuntimeError::Raised(Value::from(e.to_string())))?;
    Ok(Vec::new())
}

fn select(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let count = args.len() as i64 - 1;
    if let Value::Str(s) = &args[0] {
        if &**s == b"#" {
            return Ok(vec![Value::Int(count)]);
        }
    }
    let n: i64 = arg(&args, 0, "select")?;
    let start = if n < 0 {
        if n.checked_neg().map_or(true, |m| m > count) {
            return Err(bad_argument(0, "select", "index out of range"));
        }
        count + n
    } else if n == 0 {
        return Err(bad_argument(0, "select", "index out of range"));
    } else {
        (n - 1).min(count)
    };
    Ok(args.into_iter().skip(1 + start as usize).collect())
}

fn tonumber(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let base = args.get(1).cloned().unwrap_or(Value::Nil);
    if base.is_nil() {
        let converted = match &args[0] {
            Value::Int(_) | Value::Float(_) => args[0].clone(),
            Value::Str(_) => ops::to_number(&args[0]).map_or(Value::Nil, Value::from),
            _ => Value::Nil,
        };
        return Ok(vec![converted]);
    }

    let base: i64 = arg(&args, 1, "tonumber")?;
    let Value::Str(text) = &args[0] else {
        return Err(bad_argument(
            0,
            "tonumber",
            &format!("string expected, got {}", args[0].type_name()),
        ));
    };
    if !(2..=36).contains(&base) {
        return Err(bad_argument(1, "tonumber", "base out of range"));
    }
    Ok(vec![parse_in_base(text, base as u32)
        .map_or(Value::Nil, |n| Value::from(Number::Int(n)))])
}

/// Integer numeral in `base`, wrapping around on overflow.
fn parse_in_base(text: &[u8], base: u32) -> Option<i64> {
    let text = std::str::from_utf8(text).ok()?;
    let text = text.trim_matches(|c: char| " \t\n\r\x0b\x0c".contains(c));
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(base)?;
        value = value.wrapping_mul(base as i64).wrapping_add(digit as i64);
    }
    Some(if negative { value.wrapping_neg() } else { value })
}

fn load(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let source = match &args[0] {
        Value::Str(s) => s.to_vec(),
        Value::Function(_) => {
            // Concatenate pieces until the reader returns nil or "".
            let mut source = Vec::new();
            loop {
                match interp.call_first(&args[0], Vec::new())? {
                    Value::Str(piece) if !piece.is_empty() => source.extend_from_slice(&piece),
                    Value::Nil | Value::Str(_) => break,
                    _ => {
                        return Ok(vec![
                            Value::Nil,
                            Value::from("reader function must return a string"),
                        ])
                    }
                }
            }
            source
        }
        other => {
            return Err(bad_argument(
                0,
                "load",
                &format!("string expected, got {}", other.type_name()),
            ))
        }
    };
    let chunkname: Option<String> = arg(&args, 1, "load")?;
    let chunkname = chunkname.unwrap_or_else(|| "load".to_string());
    let source = String::from_utf8_lossy(&source);
    match interp.load(&source, &chunkname) {
        Ok(f) => Ok(vec![f]),
        Err(e) => Ok(vec![Value::Nil, Value::from(e.to_string())]),
    }
}

fn dofile(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let filename: Option<String> = arg(&args, 0, "dofile")?;
    match filename {
        Some(path) => interp.exec_file(&path).map_err(script_error),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map_err(|e| RuntimeError::Raised(Value::from(e.to_string())))?;
            interp.exec_named(&source, "stdin").map_err(script_error)
        }
    }
}

fn warn(enabled: &Cell<bool>, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let mut message = Vec::new();
    for i in 0..args.len() {
        let Value::Str(piece) = &args[i] else {
            return Err(bad_argument(
                i,
                "warn",
                &format!("string expected, got {}", args[i].type_name()),
            ));
        };
        message.extend_from_slice(piece);
    }
    if args.len() == 1 && message.first() == Some(&b'@') {
        match &message[..] {
            b"@on" => enabled.set(true),
            b"@off" => enabled.set(false),
            _ => {}
        }
        return Ok(Vec::new());
    }
    if enabled.get() {
        eprintln!("Lua warning: {}", String::from_utf8_lossy(&message));
    }
    Ok(Vec::new())
}
