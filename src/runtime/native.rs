//! Native-function bridge.
//!
//! Host code exposes functions to scripts as [`NativeFunction`]s, in one of
//! two modes:
//!
//! - **raw**: the callable receives the interpreter and the argument
//!   `Value`s and returns result `Value`s.
//! - **typed**: the callable works on [`HostValue`]s; arguments and results
//!   are converted automatically. Tables become shared [`HostMap`]s and a
//!   table reachable from itself becomes a map reachable from itself.
//!
//! When the interpreter converts, a `__host` metamethod on a table or
//! userdata replaces the value: its first result is converted instead.
//! Functions cross as opaque values that [`HostValue::call`] can invoke.
//!
//! Host values also convert to and from `serde_json::Value`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use super::error::RuntimeError;
use super::ops;
use super::value::{Function, Table, TableRef, Value};
use super::Interpreter;

pub type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>, RuntimeError>;

/// A function implemented by the host.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub params: Vec<String>,
    pub min_required: usize,
    pub variadic: bool,
    f: Rc<NativeFn>,
}

impl NativeFunction {
    /// Raw mode. When the function is not variadic it receives at most
    /// `params.len()` arguments; it is never called with fewer than
    /// `min_required`.
    pub fn raw<F>(name: &str, params: &[&str], min_required: usize, variadic: bool, f: F) -> Self
    where
        F: Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>, RuntimeError> + 'static,
    {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            min_required: min_required.min(params.len()),
            variadic,
            f: Rc::new(f),
        }
    }

    /// Typed mode: values cross the boundary as [`HostValue`]s. An `Err`
    /// becomes a script error carrying the message.
    pub fn typed<F>(name: &str, params: &[&str], min_required: usize, variadic: bool, f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<Vec<HostValue>, String> + 'static,
    {
        Self::typed_with(name, params, min_required, variadic, move |_, args| f(args))
    }

    /// Typed mode with the interpreter at hand, for natives that call back
    /// into script functions.
    pub fn typed_with<F>(
        name: &str,
        params: &[&str],
        min_required: usize,
        variadic: bool,
        f: F,
    ) -> Self
    where
        F: Fn(&mut Interpreter, Vec<HostValue>) -> Result<Vec<HostValue>, String> + 'static,
    {
        Self::raw(name, params, min_required, variadic, move |interp, args| {
            let host_args = interp.to_host_values(&args)?;
            let results =
                f(interp, host_args).map_err(|msg| RuntimeError::Raised(Value::from(msg)))?;
            Ok(from_host_values(&results))
        })
    }

    pub fn into_value(self) -> Value {
        Value::from_function(Function::Native(self))
    }

    pub(crate) fn invoke(
        &self,
        interp: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, RuntimeError> {
        (self.f)(interp, args)
    }
}

// ── Host values ─────────────────────────────────────────────────────────

/// Shared, mutable key/value list: the host-side image of a table.
pub type HostMap = Rc<RefCell<Vec<(HostValue, HostValue)>>>;

#[derive(Clone)]
pub enum HostValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Map(HostMap),
    /// Functions, userdata and threads cross unchanged.
    Opaque(Value),
}

impl HostValue {
    pub fn new_map(pairs: Vec<(HostValue, HostValue)>) -> HostValue {
        HostValue::Map(Rc::new(RefCell::new(pairs)))
    }

    pub fn str(s: &str) -> HostValue {
        HostValue::Bytes(s.as_bytes().to_vec())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Call an opaque function (or a value with `__call`) with host
    /// arguments. Errors come back as their message.
    pub fn call(
        &self,
        interp: &mut Interpreter,
        args: Vec<HostValue>,
    ) -> Result<Vec<HostValue>, String> {
        let HostValue::Opaque(callee) = self else {
            return Err(format!("attempt to call a host {}", self.kind()));
        };
        let results = interp
            .call(callee, from_host_values(&args))
            .map_err(|e| e.to_string())?;
        interp.to_host_values(&results).map_err(|e| e.to_string())
    }

    fn kind(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "boolean",
            HostValue::Int(_) | HostValue::Float(_) => "number",
            HostValue::Bytes(_) => "string",
            HostValue::Map(_) => "map",
            HostValue::Opaque(v) => v.type_name(),
        }
    }

    /// Entry of a map by key (first match).
    pub fn get(&self, key: &HostValue) -> Option<HostValue> {
        match self {
            HostValue::Map(m) => m
                .borrow()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }
}

/// Scalars and bytes compare by content, maps by identity.
impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Nil, HostValue::Nil) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => Rc::ptr_eq(a, b),
            (HostValue::Opaque(a), HostValue::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => f.write_str("Nil"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int(i) => write!(f, "Int({})", i),
            HostValue::Float(x) => write!(f, "Float({:?})", x),
            HostValue::Bytes(b) => write!(f, "Bytes({:?})", String::from_utf8_lossy(b)),
            HostValue::Map(m) => write!(f, "Map({:p}, {} entries)", Rc::as_ptr(m), m.borrow().len()),
            HostValue::Opaque(v) => write!(f, "Opaque({:?})", v),
        }
    }
}

/// Convert a script value to its host image. Metamethods are not
/// consulted; see [`Interpreter::to_host`].
pub fn to_host(value: &Value) -> HostValue {
    let mut no_hook = |_: &Value| Ok::<Option<Value>, Infallible>(None);
    match HostConversion::new(&mut no_hook).convert(value) {
        Ok(host) => host,
        Err(never) => match never {},
    }
}

type Hook<'a, E> = dyn FnMut(&Value) -> Result<Option<Value>, E> + 'a;

/// One conversion pass. Reference values already converted map to the same
/// host value, so sharing and cycles survive.
struct HostConversion<'h, 'a, E> {
    memo: HashMap<usize, HostValue>,
    /// Values whose hook is running; meeting one again converts it plainly.
    hooking: HashSet<usize>,
    hook: &'h mut Hook<'a, E>,
}

impl<'h, 'a, E> HostConversion<'h, 'a, E> {
    fn new(hook: &'h mut Hook<'a, E>) -> Self {
        Self {
            memo: HashMap::new(),
            hooking: HashSet::new(),
            hook,
        }
    }

    fn convert(&mut self, value: &Value) -> Result<HostValue, E> {
        let id = match value {
            Value::Nil => return Ok(HostValue::Nil),
            Value::Bool(b) => return Ok(HostValue::Bool(*b)),
            Value::Int(i) => return Ok(HostValue::Int(*i)),
            Value::Float(x) => return Ok(HostValue::Float(*x)),
            Value::Str(s) => return Ok(HostValue::Bytes(s.to_vec())),
            Value::Table(_) | Value::Userdata(_) => value.identity().unwrap_or(0),
            other => return Ok(HostValue::Opaque(other.clone())),
        };
        if let Some(done) = self.memo.get(&id) {
            return Ok(done.clone());
        }
        if self.hooking.insert(id) {
            let replaced = (self.hook)(value).and_then(|stand_in| match stand_in {
                Some(stand_in) => self.convert(&stand_in).map(Some),
                None => Ok(None),
            });
            self.hooking.remove(&id);
            if let Some(host) = replaced? {
                self.memo.insert(id, host.clone());
                return Ok(host);
            }
        }
        let Value::Table(t) = value else {
            return Ok(HostValue::Opaque(value.clone()));
        };
        let map: HostMap = Rc::new(RefCell::new(Vec::new()));
        self.memo.insert(id, HostValue::Map(map.clone()));
        let pairs: Vec<(Value, Value)> = t
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in pairs {
            let entry = (self.convert(&k)?, self.convert(&v)?);
            map.borrow_mut().push(entry);
        }
        Ok(HostValue::Map(map))
    }
}

impl Interpreter {
    /// Host image of `value`, honouring `__host` metamethods.
    pub fn to_host(&mut self, value: &Value) -> Result<HostValue, RuntimeError> {
        Ok(self.to_host_values(std::slice::from_ref(value))?.remove(0))
    }

    /// Convert several values in one pass, so a table passed twice maps to
    /// one shared host map.
    pub fn to_host_values(&mut self, values: &[Value]) -> Result<Vec<HostValue>, RuntimeError> {
        let mut hook = |v: &Value| -> Result<Option<Value>, RuntimeError> {
            match self.get_metamethod(v, "__host") {
                Some(handler) => Ok(Some(self.call_first(&handler, vec![v.clone()])?)),
                None => Ok(None),
            }
        };
        let mut conversion = HostConversion::new(&mut hook);
        values.iter().map(|v| conversion.convert(v)).collect()
    }
}

/// Convert a host value back into a script value. Map entries whose key
/// cannot index a table (nil or NaN) are dropped.
pub fn from_host(host: &HostValue) -> Value {
    from_host_memo(host, &mut HashMap::new())
}

fn from_host_values(hosts: &[HostValue]) -> Vec<Value> {
    let mut memo = HashMap::new();
    hosts.iter().map(|h| from_host_memo(h, &mut memo)).collect()
}

fn from_host_memo(host: &HostValue, memo: &mut HashMap<usize, TableRef>) -> Value {
    match host {
        HostValue::Nil => Value::Nil,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Int(i) => Value::Int(*i),
        HostValue::Float(x) => Value::Float(*x),
        HostValue::Bytes(b) => Value::from(b.as_slice()),
        HostValue::Map(m) => {
            let id = Rc::as_ptr(m) as *const () as usize;
            if let Some(existing) = memo.get(&id) {
                return Value::Table(existing.clone());
            }
            let table: TableRef = Rc::new(RefCell::new(Table::new()));
            memo.insert(id, table.clone());
            let pairs: Vec<(HostValue, HostValue)> = m.borrow().clone();
            for (k, v) in &pairs {
                let key = from_host_memo(k, memo);
                let value = from_host_memo(v, memo);
                // nil and NaN keys have no table slot
                let _ = table.borrow_mut().put(key, value);
            }
            Value::Table(table)
        }
        HostValue::Opaque(v) => v.clone(),
    }
}

// ── JSON ────────────────────────────────────────────────────────────────

/// JSON objects become maps keyed by strings; arrays become maps keyed
/// `1..=n`.
pub fn host_from_json(json: &serde_json::Value) -> HostValue {
    match json {
        serde_json::Value::Null => HostValue::Nil,
        serde_json::Value::Bool(b) => HostValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                HostValue::Int(i)
            } else {
                HostValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => HostValue::str(s),
        serde_json::Value::Array(items) => HostValue::new_map(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (HostValue::Int(i as i64 + 1), host_from_json(v)))
                .collect(),
        ),
        serde_json::Value::Object(obj) => HostValue::new_map(
            obj.iter()
                .map(|(k, v)| (HostValue::str(k), host_from_json(v)))
                .collect(),
        ),
    }
}

/// Inverse of [`host_from_json`]. A map whose keys are exactly `1..=n`
/// becomes an array; a map with only string keys becomes an object; the
/// empty map becomes `{}`. Cycles, non-finite floats and opaque values have
/// no JSON form.
pub fn host_to_json(host: &HostValue) -> Result<serde_json::Value, String> {
    host_to_json_inner(host, &mut HashSet::new())
}

fn host_to_json_inner(
    host: &HostValue,
    visiting: &mut HashSet<usize>,
) -> Result<serde_json::Value, String> {
    match host {
        HostValue::Nil => Ok(serde_json::Value::Null),
        HostValue::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        HostValue::Int(i) => Ok(serde_json::Value::Number((*i).into())),
        HostValue::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or_else(|| format!("cannot encode {} as JSON", x)),
        HostValue::Bytes(b) => String::from_utf8(b.clone())
            .map(serde_json::Value::String)
            .map_err(|_| "cannot encode non-UTF-8 string as JSON".to_string()),
        HostValue::Map(m) => {
            let id = Rc::as_ptr(m) as *const () as usize;
            if !visiting.insert(id) {
                return Err("cannot encode a cyclic structure as JSON".to_string());
            }
            let pairs = m.borrow().clone();
            let result = map_to_json(&pairs, visiting);
            visiting.remove(&id);
            result
        }
        HostValue::Opaque(v) => Err(format!("cannot encode a {} as JSON", v.type_name())),
    }
}

fn map_to_json(
    pairs: &[(HostValue, HostValue)],
    visiting: &mut HashSet<usize>,
) -> Result<serde_json::Value, String> {
    let live: Vec<&(HostValue, HostValue)> = pairs
        .iter()
        .filter(|(_, v)| !matches!(v, HostValue::Nil))
        .collect();

    let mut slots: Vec<Option<&HostValue>> = vec![None; live.len()];
    let is_sequence = !live.is_empty()
        && live.iter().all(|(k, v)| match k {
            HostValue::Int(i) if *i >= 1 && (*i as usize) <= live.len() => {
                let slot = &mut slots[*i as usize - 1];
                let fresh = slot.is_none();
                *slot = Some(v);
                fresh
            }
            _ => false,
        });
    if is_sequence {
        let items = slots
            .into_iter()
            .flatten()
            .map(|v| host_to_json_inner(v, visiting))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(serde_json::Value::Array(items));
    }

    let mut obj = serde_json::Map::new();
    for (k, v) in live {
        let key = k
            .as_str()
            .ok_or_else(|| format!("cannot encode key {:?} as a JSON object key", k))?;
        obj.insert(key.to_string(), host_to_json_inner(v, visiting)?);
    }
    Ok(serde_json::Value::Object(obj))
}

// ── Argument conversion ─────────────────────────────────────────────────

/// Conversion from a script value, used to check native arguments. The
/// error is the reason shown in `bad argument` messages.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

pub trait IntoValue {
    fn into_value(self) -> Value;
}

fn expected(what: &str, got: &Value) -> String {
    let got = if got.is_nil() { "no value" } else { got.type_name() };
    format!("{} expected, got {}", what, got)
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for HostValue {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(to_host(value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.is_truthy())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match ops::to_number(value) {
            Some(n) => n
                .to_i64()
                .ok_or_else(|| "number has no integer representation".to_string()),
            None => Err(expected("number", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        ops::to_number(value)
            .map(|n| n.to_f64())
            .ok_or_else(|| expected("number", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        ops::concat_operand(value).ok_or_else(|| expected("string", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        Vec::<u8>::from_value(value).map(|b| String::from_utf8_lossy(&b).into_owned())
    }
}

impl FromValue for TableRef {
    fn from_value(value: &Value) -> Result<Self, String> {
        value
            .as_table()
            .cloned()
            .ok_or_else(|| expected("table", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for HostValue {
    fn into_value(self) -> Value {
        from_host(&self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::from(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Nil,
        }
    }
}

/// Check argument `index` (0-based) of native function `fname`.
pub fn arg<T: FromValue>(args: &[Value], index: usize, fname: &str) -> Result<T, RuntimeError> {
    let value = args.get(index).unwrap_or(&Value::Nil);
    T::from_value(value).map_err(|reason| bad_argument(index, fname, &reason))
}

/// `bad argument #n to 'f' (reason)`.
pub fn bad_argument(index: usize, fname: &str, reason: &str) -> RuntimeError {
    RuntimeError::Type(format!(
        "bad argument #{} to '{}' ({})",
        index + 1,
        fname,
        reason
    ))
}
