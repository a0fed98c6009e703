//! Standard libraries.
//!
//! basic (global functions), math, string, table, os. Each library is a set
//! of native functions put into the global table; nothing else is special
//! about them.

pub mod basic;
pub mod math;
pub mod os;
pub mod string;
pub mod table;

use std::cell::RefCell;
use std::rc::Rc;

use super::native::NativeFunction;
use super::value::{Table, TableRef, Value};
use super::{Interpreter, RuntimeError};

pub fn open_all(interp: &mut Interpreter) {
    basic::open(interp);
    math::open(interp);
    string::open(interp);
    table::open(interp);
    os::open(interp);
}

/// A library table holding `functions` under their names.
pub(crate) fn library(functions: Vec<NativeFunction>) -> TableRef {
    let mut table = Table::with_capacity(functions.len());
    for function in functions {
        let name = function.name.clone();
        table.set_str(&name, function.into_value());
    }
    Rc::new(RefCell::new(table))
}

/// Surface a front-end failure inside a running script as an error value.
pub(crate) fn script_error(error: crate::Error) -> RuntimeError {
    match error {
        crate::Error::Runtime(e) => e,
        other => RuntimeError::Raised(Value::from(other.to_string())),
    }
}
