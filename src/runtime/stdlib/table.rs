//! `table` library.

use crate::runtime::native::{arg, bad_argument, NativeFunction};
use crate::runtime::ops;
use crate::runtime::value::{Table, TableRef, Value};
use crate::runtime::{Interpreter, RuntimeError};

use super::library;

/// Most values `unpack` will spread onto the stack.
const MAX_UNPACK: i128 = 1_000_000;

pub fn open(interp: &mut Interpreter) {
    let table = library(vec![
        NativeFunction::raw("insert", &["list", "pos", "value"], 2, true, insert),
        NativeFunction::raw("remove", &["list", "pos"], 1, false, remove),
        NativeFunction::raw("concat", &["list", "sep", "i", "j"], 1, false, concat),
        NativeFunction::raw("unpack", &["list", "i", "j"], 1, false, unpack),
        NativeFunction::raw("pack", &[], 0, true, |_, args| {
            let n = args.len() as i64;
            let mut packed = Table::from_sequence(args);
            packed.set_str("n", Value::Int(n));
            Ok(vec![Value::from_table(packed)])
        }),
        NativeFunction::raw("sort", &["list", "comp"], 1, false, sort),
    ]);
    interp.set_global("table", Value::from(table));
}

/// `#list` honouring `__len`; the result must be an integer.
fn length(interp: &mut Interpreter, list: &Value) -> Result<i64, RuntimeError> {
    match interp.len(list)? {
        Value::Int(n) => Ok(n),
        other => ops::to_integer(&other)
            .ok_or_else(|| RuntimeError::Raised(Value::from("object length is not an integer"))),
    }
}

/// Element reads and writes go through `__index`/`__newindex`.
fn insert(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let _: TableRef = arg(&args, 0, "insert")?;
    let list = &args[0];
    let n = length(interp, list)?;
    match args.len() {
        2 => interp.set_index(list, Value::Int(n.wrapping_add(1)), args[1].clone())?,
        3 => {
            let pos: i64 = arg(&args, 1, "insert")?;
            // pos must lie in [1, n + 1]
            if (pos as u64).wrapping_sub(1) >= (n as u64).wrapping_add(1) {
                return Err(bad_argument(1, "insert", "position out of bounds"));
            }
            let mut i = n.wrapping_add(1);
            while i > pos {
                let moved = interp.index(list, &Value::Int(i - 1))?;
                interp.set_index(list, Value::Int(i), moved)?;
                i -= 1;
            }
            interp.set_index(list, Value::Int(pos), args[2].clone())?;
        }
        _ => {
            return Err(RuntimeError::Raised(Value::from(
                "wrong number of arguments to 'insert'",
            )))
        }
    }
    Ok(Vec::new())
}

fn remove(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let t: TableRef = arg(&args, 0, "remove")?;
    let size = t.borrow().border();
    let pos: Option<i64> = arg(&args, 1, "remove")?;
    let mut pos = pos.unwrap_or(size);
    // An explicit position must lie in [1, size + 1].
    if pos != size && (pos as u64).wrapping_sub(1) > size as u64 {
        return Err(bad_argument(1, "remove", "position out of bounds"));
    }
    let mut t = t.borrow_mut();
    let removed = t.get_int(pos);
    while pos < size {
        let moved = t.get_int(pos + 1);
        t.set_int(pos, moved);
        pos += 1;
    }
    if pos >= 1 || t.has(&Value::Int(pos)) {
        t.set_int(pos, Value::Nil);
    }
    Ok(vec![removed])
}

fn concat(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let t: TableRef = arg(&args, 0, "concat")?;
    let sep: Option<Vec<u8>> = arg(&args, 1, "concat")?;
    let sep = sep.unwrap_or_default();
    let i: Option<i64> = arg(&args, 2, "concat")?;
    let j: Option<i64> = arg(&args, 3, "concat")?;
    let t = t.borrow();
    let first = i.unwrap_or(1);
    let last = j.unwrap_or_else(|| t.border());
    let mut out = Vec::new();
    let mut k = first;
    while k <= last {
        let v = t.get_int(k);
        let Some(piece) = ops::concat_operand(&v) else {
            return Err(RuntimeError::Raised(Value::from(format!(
                "invalid value (at index {}) in table for 'concat'",
                k
            ))));
        };
        out.extend_from_slice(&piece);
        if k == last {
            break;
        }
        out.extend_from_slice(&sep);
        k += 1;
    }
    Ok(vec![Value::from(out)])
}

fn unpack(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let list = args[0].clone();
    let i: Option<i64> = arg(&args, 1, "unpack")?;
    let j: Option<i64> = arg(&args, 2, "unpack")?;
    let first = i.unwrap_or(1);
    let last = match j {
        Some(j) => j,
        None => length(interp, &list)?,
    };
    if first > last {
        return Ok(Vec::new());
    }
    let count = last as i128 - first as i128 + 1;
    if count >= MAX_UNPACK {
        return Err(RuntimeError::Raised(Value::from("too many results to unpack")));
    }
    let mut values = Vec::with_capacity(count as usize);
    for k in first..=last {
        values.push(interp.index(&list, &Value::Int(k))?);
    }
    Ok(values)
}

fn sort(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let t: TableRef = arg(&args, 0, "sort")?;
    let comparator = match args.get(1) {
        None | Some(Value::Nil) => None,
        Some(f @ Value::Function(_)) => Some(f.clone()),
        Some(other) => {
            let reason = format!("function expected, got {}", other.type_name());
            return Err(bad_argument(1, "sort", &reason));
        }
    };
    let n = t.borrow().border();
    let items: Vec<Value> = {
        let t = t.borrow();
        (1..=n).map(|k| t.get_int(k)).collect()
    };
    let sorted = merge_sort(interp, items, comparator.as_ref())?;
    let mut t = t.borrow_mut();
    for (k, v) in (1..=n).zip(sorted) {
        t.set_int(k, v);
    }
    Ok(Vec::new())
}

fn less(
    interp: &mut Interpreter,
    comparator: Option<&Value>,
    a: &Value,
    b: &Value,
) -> Result<bool, RuntimeError> {
    match comparator {
        Some(f) => Ok(interp.call_first(f, vec![a.clone(), b.clone()])?.is_truthy()),
        None => interp.less_than(a, b),
    }
}

/// Bottom-up merge sort; the comparison may call back into scripts and fail.
fn merge_sort(
    interp: &mut Interpreter,
    mut items: Vec<Value>,
    comparator: Option<&Value>,
) -> Result<Vec<Value>, RuntimeError> {
    let n = items.len();
    let mut width = 1;
    while width < n {
        let mut merged = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if less(interp, comparator, &items[j], &items[i])? {
                    merged.push(items[j].clone());
                    j += 1;
                } else {
                    merged.push(items[i].clone());
                    i += 1;
                }
            }
            merged.extend_from_slice(&items[i..mid]);
            merged.extend_from_slice(&items[j..end]);
            start = end;
        }
        items = merged;
        width *= 2;
    }
    Ok(items)
}
