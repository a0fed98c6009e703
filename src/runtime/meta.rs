//! Metatable dispatch.
//!
//! Every operator first tries the raw operation from [`ops`]. Only when the
//! raw operation rejects its operand types is a metamethod looked up, first
//! on the left operand, then on the right. Errors produced here get the
//! current source position; errors raised by a metamethod pass through as
//! they are.

use std::rc::Rc;

use crate::ast::{BinOp, UnOp};

use super::error::{type_error, RuntimeError};
use super::ops;
use super::value::{Function, TableRef, Value};
use super::Interpreter;

/// Bound on `__index`/`__newindex`/`__call` chains.
const MAX_META_CHAIN: usize = 2000;

pub(crate) fn binary_event(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add",
        BinOp::Sub => "__sub",
        BinOp::Mul => "__mul",
        BinOp::Div => "__div",
        BinOp::IDiv => "__idiv",
        BinOp::Mod => "__mod",
        BinOp::Pow => "__pow",
        BinOp::BitAnd => "__band",
        BinOp::BitOr => "__bor",
        BinOp::BitXor => "__bxor",
        BinOp::Shl => "__shl",
        BinOp::Shr => "__shr",
        BinOp::Concat => "__concat",
        BinOp::Eq | BinOp::Ne => "__eq",
        BinOp::Lt | BinOp::Gt => "__lt",
        BinOp::Le | BinOp::Ge => "__le",
        BinOp::And | BinOp::Or => "",
    }
}

impl Interpreter {
    // ── Lookup ──────────────────────────────────────────────────────────

    pub fn get_metatable(&self, value: &Value) -> Option<TableRef> {
        match value {
            Value::Str(_) => self.string_meta.clone(),
            other => other.raw_metatable(),
        }
    }

    /// The `event` entry of the value's metatable, when present and not nil.
    pub fn get_metamethod(&self, value: &Value, event: &str) -> Option<Value> {
        let mt = self.get_metatable(value)?;
        let handler = mt.borrow().get_str(event);
        if handler.is_nil() {
            None
        } else {
            Some(handler)
        }
    }

    pub fn has_metamethod(&self, value: &Value, event: &str) -> bool {
        self.get_metamethod(value, event).is_some()
    }

    fn binary_metamethod(&self, a: &Value, b: &Value, event: &str) -> Option<Value> {
        self.get_metamethod(a, event)
            .or_else(|| self.get_metamethod(b, event))
    }

    // ── Operators ───────────────────────────────────────────────────────

    /// Arithmetic and bitwise binary operators.
    pub fn arith(&mut self, op: BinOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        let raw = if ops::is_bitwise(op) {
            ops::bitwise(op, a, b)
        } else {
            ops::arith(op, a, b)
        };
        match raw {
            Ok(v) => Ok(v),
            // Integer division by zero is final; there is nothing to dispatch.
            Err(e @ RuntimeError::Domain(_)) if !ops::is_bitwise(op) => Err(self.locate(e)),
            Err(e) => match self.binary_metamethod(a, b, binary_event(op)) {
                Some(handler) => self.call_first(&handler, vec![a.clone(), b.clone()]),
                None => Err(self.locate(e)),
            },
        }
    }

    pub fn unary(&mut self, op: UnOp, v: &Value) -> Result<Value, RuntimeError> {
        let (raw, event) = match op {
            UnOp::Not => return Ok(Value::Bool(!v.is_truthy())),
            UnOp::Neg => (ops::negate(v), "__unm"),
            UnOp::BitNot => (ops::bitwise_not(v), "__bnot"),
            UnOp::Len => return self.len(v),
        };
        match raw {
            Ok(result) => Ok(result),
            Err(e) => match self.get_metamethod(v, event) {
                Some(handler) => self.call_first(&handler, vec![v.clone(), v.clone()]),
                None => Err(self.locate(e)),
            },
        }
    }

    pub fn len(&mut self, v: &Value) -> Result<Value, RuntimeError> {
        if let Value::Str(s) = v {
            return Ok(Value::Int(s.len() as i64));
        }
        if let Some(handler) = self.get_metamethod(v, "__len") {
            return self.call_first(&handler, vec![v.clone()]);
        }
        ops::length(v).map_err(|e| self.locate(e))
    }

    pub fn concat(&mut self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        match ops::concat(a, b) {
            Ok(v) => Ok(v),
            Err(e) => match self.binary_metamethod(a, b, "__concat") {
                Some(handler) => self.call_first(&handler, vec![a.clone(), b.clone()]),
                None => Err(self.locate(e)),
            },
        }
    }

    /// `==` with `__eq` for two distinct tables or two distinct userdata.
    pub fn equals(&mut self, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        if ops::raw_equals(a, b) {
            return Ok(true);
        }
        let comparable = matches!(
            (a, b),
            (Value::Table(_), Value::Table(_)) | (Value::Userdata(_), Value::Userdata(_))
        );
        if !comparable {
            return Ok(false);
        }
        match self.binary_metamethod(a, b, "__eq") {
            Some(handler) => Ok(self
                .call_first(&handler, vec![a.clone(), b.clone()])?
                .is_truthy()),
            None => Ok(false),
        }
    }

    pub fn less_than(&mut self, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        match ops::less_than(a, b) {
            Ok(r) => Ok(r),
            Err(e) => self.compare_meta(a, b, "__lt", e),
        }
    }

    pub fn less_equal(&mut self, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        match ops::less_equal(a, b) {
            Ok(r) => Ok(r),
            Err(e) => self.compare_meta(a, b, "__le", e),
        }
    }

    fn compare_meta(
        &mut self,
        a: &Value,
        b: &Value,
        event: &str,
        error: RuntimeError,
    ) -> Result<bool, RuntimeError> {
        match self.binary_metamethod(a, b, event) {
            Some(handler) => Ok(self
                .call_first(&handler, vec![a.clone(), b.clone()])?
                .is_truthy()),
            None => Err(self.locate(error)),
        }
    }

    // ── Calls ───────────────────────────────────────────────────────────

    /// The function a call on `callee` lands in, following `__call`
    /// handlers. Each hop prepends the object it passed through.
    pub(crate) fn resolve_call(
        &self,
        callee: &Value,
        mut args: Vec<Value>,
    ) -> Result<(Rc<Function>, Vec<Value>), RuntimeError> {
        let mut current = callee.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Function(f) => return Ok((f.clone(), args)),
                other => match self.get_metamethod(other, "__call") {
                    Some(h) => h,
                    None => {
                        return Err(self.locate(type_error(format!(
                            "attempt to call a {} value",
                            other.type_name()
                        ))))
                    }
                },
            };
            args.insert(0, current);
            current = handler;
        }
        Err(self.locate(type_error("'__call' chain too long; possible loop")))
    }

    // ── Indexing ────────────────────────────────────────────────────────

    /// `obj[key]` following `__index` chains.
    pub fn index(&mut self, obj: &Value, key: &Value) -> Result<Value, RuntimeError> {
        let mut current = obj.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let raw = t.borrow().get(key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    match self.get_metamethod(&current, "__index") {
                        Some(h) => h,
                        None => return Ok(Value::Nil),
                    }
                }
                other => match self.get_metamethod(other, "__index") {
                    Some(h) => h,
                    None => {
                        return Err(self.locate(type_error(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        ))))
                    }
                },
            };
            if let Value::Function(_) = handler {
                return self.call_first(&handler, vec![current, key.clone()]);
            }
            current = handler;
        }
        Err(self.locate(type_error("'__index' chain too long; possible loop")))
    }

    /// `obj[key] = value` following `__newindex` chains.
    pub fn set_index(&mut self, obj: &Value, key: Value, value: Value) -> Result<(), RuntimeError> {
        let mut current = obj.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let present = t.borrow().has(&key);
                    let handler = if present {
                        None
                    } else {
                        self.get_metamethod(&current, "__newindex")
                    };
                    match handler {
                        Some(h) => h,
                        None => {
                            let result = t.borrow_mut().put(key, value);
                            return result.map_err(|e| self.locate(e));
                        }
                    }
                }
                other => match self.get_metamethod(other, "__newindex") {
                    Some(h) => h,
                    None => {
                        return Err(self.locate(type_error(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        ))))
                    }
                },
            };
            if let Value::Function(_) = handler {
                self.call(&handler, vec![current, key, value])?;
                return Ok(());
            }
            current = handler;
        }
        Err(self.locate(type_error("'__newindex' chain too long; possible loop")))
    }

    // ── Conversions and resources ───────────────────────────────────────

    /// `tostring` semantics: `__tostring`, then `__name`, then the default
    /// rendering with identities for reference types.
    pub fn tostring(&mut self, v: &Value) -> Result<Value, RuntimeError> {
        if let Some(handler) = self.get_metamethod(v, "__tostring") {
            let result = self.call_first(&handler, vec![v.clone()])?;
            return match result {
                Value::Str(_) => Ok(result),
                Value::Int(_) | Value::Float(_) => Ok(Value::from(result.to_string())),
                _ => Err(type_error("'__tostring' must return a string")),
            };
        }
        let kind = match self.get_metatable(v).map(|mt| mt.borrow().get_str("__name")) {
            Some(Value::Str(name)) if !matches!(v, Value::Str(_)) => {
                String::from_utf8_lossy(&name).into_owned()
            }
            _ => v.type_name().to_string(),
        };
        Ok(match v {
            Value::Str(_) => v.clone(),
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                Value::from(v.to_string())
            }
            _ => Value::from(format!("{}: {:#x}", kind, v.identity().unwrap_or(0))),
        })
    }

    /// Run the `__close` handler of a to-be-closed value. `error` is the
    /// unwinding error value, or nil on a normal exit.
    pub(crate) fn close_value(&mut self, v: &Value, error: Value) -> Result<(), RuntimeError> {
        if !v.is_truthy() {
            return Ok(());
        }
        match self.get_metamethod(v, "__close") {
            Some(handler) => {
                self.call(&handler, vec![v.clone(), error])?;
                Ok(())
            }
            None => Err(self.locate(type_error(format!(
                "attempt to close a {} value (metamethod 'close' is missing)",
                v.type_name()
            )))),
        }
    }

    /// A to-be-closed value must be false, nil, or carry `__close`.
    pub(crate) fn check_closable(&self, name: &str, v: &Value) -> Result<(), RuntimeError> {
        if !v.is_truthy() || self.has_metamethod(v, "__close") {
            Ok(())
        } else {
            Err(self.locate(type_error(format!(
                "variable '{}' got a non-closable value",
                name
            ))))
        }
    }
}
