//! Runtime values: the tagged `Value` union, the reference `Table` with its
//! metatable slot, and function/userdata/thread objects.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use super::error::{domain_error, type_error, RuntimeError};
use super::native::NativeFunction;
use super::scope::ScopeRef;
use crate::ast::FuncBody;

pub type TableRef = Rc<RefCell<Table>>;

// ── Numbers ─────────────────────────────────────────────────────────────

/// A number with its kind tag. The tag selects arithmetic rules, so `1` and
/// `1.0` are equal but not interchangeable.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integer value if the number has an exact integer representation.
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i),
            Number::Float(f) => float_to_int(f),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Exact float → integer conversion; `None` for fractional, NaN or
/// out-of-range values.
pub fn float_to_int(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; every finite float below it and at or
    // above -2^63 with no fraction converts exactly.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() == 0.0 && f >= -LIMIT && f < LIMIT {
        Some(f as i64)
    } else {
        None
    }
}

/// Shortest round-trip rendering; integral floats keep a trailing `.0` so
/// they never read back as integers.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return if x.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let repr = format!("{:?}", x);
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

// ── Values ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<[u8]>),
    Table(TableRef),
    Function(Rc<Function>),
    Userdata(Rc<Userdata>),
    Thread(Rc<Thread>),
}

impl Value {
    pub fn new_table() -> Value {
        Value::Table(Rc::new(RefCell::new(Table::new())))
    }

    pub fn from_table(table: Table) -> Value {
        Value::Table(Rc::new(RefCell::new(table)))
    }

    pub fn from_function(function: Function) -> Value {
        Value::Function(Rc::new(function))
    }

    /// Wrap host data as a userdata value with no metatable.
    pub fn new_userdata(data: impl Any) -> Value {
        Value::Userdata(Rc::new(Userdata::new(Box::new(data))))
    }

    pub fn new_thread(label: impl Into<String>) -> Value {
        Value::Thread(Rc::new(Thread {
            label: label.into(),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(_) => "userdata",
            Value::Thread(_) => "thread",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&Rc<Userdata>> {
        match self {
            Value::Userdata(u) => Some(u),
            _ => None,
        }
    }

    /// Address of a reference value, used for `tostring` and identity maps.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Table(t) => Some(Rc::as_ptr(t) as *const () as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::Userdata(u) => Some(Rc::as_ptr(u) as *const () as usize),
            Value::Thread(t) => Some(Rc::as_ptr(t) as *const () as usize),
            _ => None,
        }
    }

    /// The metatable stored on the value itself. Strings share a
    /// per-interpreter metatable, resolved by the interpreter.
    pub fn raw_metatable(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => t.borrow().metatable(),
            Value::Userdata(u) => u.metatable.borrow().clone(),
            _ => None,
        }
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) -> Result<(), RuntimeError> {
        match self {
            Value::Table(t) => {
                t.borrow_mut().set_metatable(metatable);
                Ok(())
            }
            Value::Userdata(u) => {
                *u.metatable.borrow_mut() = metatable;
                Ok(())
            }
            other => Err(type_error(format!(
                "cannot set the metatable of a {} value",
                other.type_name()
            ))),
        }
    }

    /// Lossy text view, for messages and rendering.
    pub fn to_string_lossy(&self) -> String {
        match self {
            Value::Str(s) => String::from_utf8_lossy(s).into_owned(),
            other => other.to_string(),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Table(t) => {
                let id = Rc::as_ptr(t) as *const () as usize;
                if seen.contains(&id) {
                    return f.write_str("{<...>}");
                }
                seen.push(id);
                f.write_str("{")?;
                let table = t.borrow();
                for (i, (k, v)) in table.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str("(")?;
                    k.render(f, seen)?;
                    f.write_str(")=(")?;
                    v.render(f, seen)?;
                    f.write_str(")")?;
                }
                f.write_str("}")
            }
            other => write!(f, "{}", other),
        }
    }
}

/// Raw equality: numbers by mathematical value, strings by content,
/// everything else by identity. Never consults `__eq`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(i), Value::Float(x)) | (Value::Float(x), Value::Int(i)) => {
                float_to_int(*x) == Some(*i)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
            Value::Table(_) => self.render(f, &mut Vec::new()),
            Value::Function(func) => write!(f, "{}", func),
            Value::Userdata(u) => write!(f, "userdata: {:p}", Rc::as_ptr(u)),
            Value::Thread(t) => write!(f, "thread: {:p}", Rc::as_ptr(t)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Str(s) => write!(f, "Str({:?})", String::from_utf8_lossy(s)),
            Value::Table(t) => write!(f, "Table({:p})", Rc::as_ptr(t)),
            Value::Function(func) => write!(f, "Function({})", func),
            Value::Userdata(u) => write!(f, "Userdata({:p})", Rc::as_ptr(u)),
            Value::Thread(t) => write!(f, "Thread({:p})", Rc::as_ptr(t)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Str(Rc::from(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Str(Rc::from(b))
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

// ── Tables ──────────────────────────────────────────────────────────────

/// Hash-map key wrapper. Only normalized keys are ever wrapped: never nil,
/// never NaN, never an integral float.
#[derive(Clone)]
struct TableKey(Value);

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Nil => 0u8.hash(state),
            Value::Bool(b) => (1u8, *b).hash(state),
            Value::Int(i) => (2u8, *i).hash(state),
            Value::Float(x) => (3u8, x.to_bits()).hash(state),
            Value::Str(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            other => (5u8, other.identity().unwrap_or(0)).hash(state),
        }
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => false,
            (a, b) => a == b,
        }
    }
}

impl Eq for TableKey {}

/// Lookup form of a key: integral floats become integers; nil and NaN can
/// never be present.
fn lookup_key(key: &Value) -> Option<Value> {
    match key {
        Value::Nil => None,
        Value::Float(x) if x.is_nan() => None,
        Value::Float(x) => Some(match float_to_int(*x) {
            Some(i) => Value::Int(i),
            None => Value::Float(*x),
        }),
        other => Some(other.clone()),
    }
}

/// A mutable Value → Value map with an optional metatable.
///
/// Entries keep insertion order so `next` can walk them by position.
/// Assigning nil to an existing key leaves a tombstone in place, which keeps
/// an in-progress traversal valid. Tombstones are swept when a new key is
/// inserted and they outnumber the live entries.
#[derive(Default)]
pub struct Table {
    entries: IndexMap<TableKey, Value>,
    live: usize,
    metatable: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
            live: 0,
            metatable: None,
        }
    }

    /// Build a sequence `{v1, v2, ...}`.
    pub fn from_sequence(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Table::new();
        for (i, v) in values.into_iter().enumerate() {
            table.set_int(i as i64 + 1, v);
        }
        table
    }

    pub fn get(&self, key: &Value) -> Value {
        match lookup_key(key) {
            Some(k) => self.entries.get(&TableKey(k)).cloned().unwrap_or(Value::Nil),
            None => Value::Nil,
        }
    }

    pub fn get_int(&self, i: i64) -> Value {
        self.entries
            .get(&TableKey(Value::Int(i)))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.get(&Value::from(key))
    }

    pub fn has(&self, key: &Value) -> bool {
        !self.get(key).is_nil()
    }

    /// Store `value` under `key`. A nil key is a type error and a NaN key a
    /// domain error; integral float keys are stored as integers.
    pub fn put(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let key = match key {
            Value::Nil => return Err(type_error("table index is nil")),
            Value::Float(x) if x.is_nan() => return Err(domain_error("table index is NaN")),
            Value::Float(x) => match float_to_int(x) {
                Some(i) => Value::Int(i),
                None => Value::Float(x),
            },
            other => other,
        };
        self.put_normalized(key, value);
        Ok(())
    }

    pub fn set_int(&mut self, i: i64, value: Value) {
        self.put_normalized(Value::Int(i), value);
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        self.put_normalized(Value::from(key), value);
    }

    fn put_normalized(&mut self, key: Value, value: Value) {
        let key = TableKey(key);
        if let Some(slot) = self.entries.get_mut(&key) {
            match (slot.is_nil(), value.is_nil()) {
                (true, false) => self.live += 1,
                (false, true) => self.live -= 1,
                _ => {}
            }
            *slot = value;
            return;
        }
        if value.is_nil() {
            return;
        }
        if self.tombstones() > self.live {
            self.entries.retain(|_, v| !v.is_nil());
        }
        self.entries.insert(key, value);
        self.live += 1;
    }

    fn tombstones(&self) -> usize {
        self.entries.len() - self.live
    }

    /// A border: `n` with `t[n] ~= nil` and `t[n+1] == nil`, or 0 when
    /// `t[1]` is nil. Dense sequences always report their full length.
    pub fn border(&self) -> i64 {
        let n = self.live as i64;
        if n > 0 && !self.get_int(n).is_nil() && self.get_int(n + 1).is_nil() {
            return n;
        }
        if self.get_int(1).is_nil() {
            return 0;
        }
        // Unbound search: grow `hi` until it lands on nil, keeping `lo`
        // non-nil, then bisect.
        let (mut lo, mut hi) = (1i64, 2i64);
        while !self.get_int(hi).is_nil() {
            lo = hi;
            if hi > i64::MAX / 2 {
                if !self.get_int(i64::MAX).is_nil() {
                    return i64::MAX;
                }
                hi = i64::MAX;
                break;
            }
            hi *= 2;
        }
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.get_int(mid).is_nil() {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo
    }

    /// The entry after `key` in traversal order (`nil` starts a traversal).
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, RuntimeError> {
        let start = if key.is_nil() {
            0
        } else {
            let slot = lookup_key(key).and_then(|k| self.entries.get_index_of(&TableKey(k)));
            match slot {
                Some(i) => i + 1,
                None => return Err(type_error("invalid key to 'next'")),
            }
        };
        Ok((start..self.entries.len())
            .filter_map(|i| self.entries.get_index(i))
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.0.clone(), v.clone())))
    }

    /// Live (non-nil) entries in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (&k.0, v))
    }

    /// Number of non-nil entries.
    pub fn count(&self) -> usize {
        self.live
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }
}

// ── Functions ───────────────────────────────────────────────────────────

pub struct Closure {
    pub body: Rc<FuncBody>,
    pub scope: ScopeRef,
    pub name: Option<String>,
}

pub enum Function {
    Closure(Closure),
    Native(NativeFunction),
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Closure(c) => c.name.as_deref(),
            Function::Native(n) => Some(&n.name),
        }
    }

    pub fn params(&self) -> &[String] {
        match self {
            Function::Closure(c) => &c.body.params,
            Function::Native(n) => &n.params,
        }
    }

    pub fn is_variadic(&self) -> bool {
        match self {
            Function::Closure(c) => c.body.variadic,
            Function::Native(n) => n.variadic,
        }
    }

    /// Closures pad missing arguments with nil, so they require none.
    pub fn min_required(&self) -> usize {
        match self {
            Function::Closure(_) => 0,
            Function::Native(n) => n.min_required,
        }
    }

    /// `(a[, b[, ...]])` style parameter list. Parameters a native function
    /// can do without are bracketed; closure parameters are all listed plain.
    fn signature(&self) -> String {
        let params = self.params();
        let required = match self {
            Function::Closure(_) => params.len(),
            Function::Native(n) => n.min_required.min(params.len()),
        };
        let mut out = String::from("(");
        for (i, p) in params.iter().enumerate() {
            if i >= required {
                out.push('[');
            }
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(p);
        }
        if self.is_variadic() {
            let sep = if params.is_empty() { "" } else { ", " };
            match self {
                Function::Closure(_) => out.push_str(&format!("{}...", sep)),
                Function::Native(_) => out.push_str(&format!("[{}...]", sep)),
            }
        }
        out.push_str(&"]".repeat(params.len() - required));
        out.push(')');
        out
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self as *const Function;
        match self.name() {
            Some(name) => write!(f, "function {}{}: {:p}", name, self.signature(), addr),
            None => write!(f, "function{}: {:p}", self.signature(), addr),
        }
    }
}

// ── Userdata and threads ────────────────────────────────────────────────

/// Opaque host data, with its own metatable slot.
pub struct Userdata {
    pub data: RefCell<Box<dyn Any>>,
    metatable: RefCell<Option<TableRef>>,
}

impl Userdata {
    pub fn new(data: Box<dyn Any>) -> Self {
        Self {
            data: RefCell::new(data),
            metatable: RefCell::new(None),
        }
    }

    /// Run `f` on the payload when it has type `T`.
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.data.borrow_mut().downcast_mut::<T>().map(f)
    }
}

/// Coroutine handle. The engine has no coroutine scheduler; threads exist so
/// hosts can round-trip them as opaque values.
#[derive(Debug, Default)]
pub struct Thread {
    pub label: String,
}
