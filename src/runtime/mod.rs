//! Tree-walking runtime.
//!
//! An [`Interpreter`] is one independent VM instance: it owns a global table
//! and the root scope every chunk runs under. Values created by one instance
//! must not be handed to another.
//!
//! Memory is reference counted with no cycle collector. Dropping an
//! interpreter empties its global table and every scope it created, which
//! frees the cycles closures form with their scopes. A table that reaches
//! itself only through other tables (`t.self = t`) stays allocated until
//! the host breaks the cycle.

pub mod error;
mod eval;
mod meta;
pub mod native;
pub mod ops;
pub mod scope;
pub mod stdlib;
pub mod value;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Block, Chunk, FuncBody, SourceLocation, Statement};
use crate::lexer::Lexer;
use crate::parser::{parse_source, Parser};

pub use error::{ErrorKind, RuntimeError};
pub use native::{FromValue, HostMap, HostValue, IntoValue, NativeFunction};
pub use scope::{Binding, ScopeRef, Variable};
pub use value::{Closure, Function, Number, Table, TableRef, Thread, Userdata, Value};

/// Default bound on nested calls before a `StackOverflow` error.
pub const MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Clone)]
pub struct Options {
    /// Initial state of the `warn` switch (`@on`/`@off` toggle it later).
    pub warnings: bool,
    pub max_call_depth: usize,
    /// Open the standard libraries into the global table.
    pub stdlib: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            warnings: false,
            max_call_depth: MAX_CALL_DEPTH,
            stdlib: true,
        }
    }
}

pub struct Interpreter {
    globals: TableRef,
    root: ScopeRef,
    string_meta: Option<TableRef>,
    options: Options,
    call_depth: usize,
    /// Position of the statement being executed.
    current: Option<SourceLocation>,
    /// Call-site positions of the active closure invocations.
    call_sites: Vec<Option<SourceLocation>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.root.teardown();
        let globals = std::mem::take(&mut *self.globals.borrow_mut());
        drop(globals);
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let globals: TableRef = Rc::new(RefCell::new(Table::new()));
        let mut interp = Self {
            root: ScopeRef::root(globals.clone()),
            globals,
            string_meta: None,
            options,
            call_depth: 0,
            current: None,
            call_sites: Vec::new(),
        };
        if interp.options.stdlib {
            stdlib::open_all(&mut interp);
        }
        interp
    }

    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    pub fn root_scope(&self) -> &ScopeRef {
        &self.root
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().set_str(name, value);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.borrow().get_str(name)
    }

    /// Install a native function as a global under its own name.
    pub fn register(&mut self, function: NativeFunction) {
        let name = function.name.clone();
        self.set_global(&name, function.into_value());
    }

    /// Metatable shared by all strings.
    pub fn set_string_metatable(&mut self, metatable: Option<TableRef>) {
        self.string_meta = metatable;
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Compile `source` into a vararg function closing over the root scope.
    pub fn load(&mut self, source: &str, chunkname: &str) -> Result<Value, crate::Error> {
        let chunk = parse_source(source, chunkname)?;
        Ok(self.chunk_function(chunk.block, &chunk.name))
    }

    pub fn exec(&mut self, source: &str) -> Result<Vec<Value>, crate::Error> {
        self.exec_named(source, "input")
    }

    pub fn exec_named(&mut self, source: &str, chunkname: &str) -> Result<Vec<Value>, crate::Error> {
        let main = self.load(source, chunkname)?;
        debug!(chunk = chunkname, "exec");
        Ok(self.call(&main, Vec::new())?)
    }

    /// Evaluate an expression list and return all of its values.
    pub fn eval(&mut self, source: &str) -> Result<Vec<Value>, crate::Error> {
        let tokens = Lexer::new(source, "input").tokenize()?;
        let mut parser = Parser::new(tokens, "input");
        let values = parser.parse_expression_list_chunk()?;
        let loc = SourceLocation::new("input", 1, 1);
        let block = Block {
            statements: vec![Statement::Return { values, loc }],
        };
        let main = self.chunk_function(block, "input");
        debug!("eval");
        Ok(self.call(&main, Vec::new())?)
    }

    pub fn exec_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<Value>, crate::Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("cannot open {}: {}", path.display(), e))
        })?;
        let source = String::from_utf8_lossy(&bytes);
        let name = path.display().to_string();
        self.exec_named(&source, &name)
    }

    /// Run an already parsed chunk.
    pub fn exec_chunk(&mut self, chunk: &Chunk) -> Result<Vec<Value>, RuntimeError> {
        let main = self.chunk_function(chunk.block.clone(), &chunk.name);
        debug!(chunk = %chunk.name, "exec_chunk");
        self.call(&main, Vec::new())
    }

    fn chunk_function(&self, block: Block, name: &str) -> Value {
        let body = FuncBody {
            params: Vec::new(),
            variadic: true,
            body: block,
            loc: SourceLocation::new(name, 0, 0),
        };
        Value::from_function(Function::Closure(Closure {
            body: Rc::new(body),
            scope: self.root.clone(),
            name: Some("main chunk".to_string()),
        }))
    }

    // ── Call protocol ───────────────────────────────────────────────────

    /// Call any value: functions directly, anything else through `__call`.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let (function, args) = self.resolve_call(callee, args)?;

        if self.call_depth >= self.options.max_call_depth {
            return Err(RuntimeError::StackOverflow(self.options.max_call_depth));
        }
        self.call_depth += 1;
        debug!(
            callee = function.name().unwrap_or("?"),
            args = args.len(),
            depth = self.call_depth,
            "call"
        );
        let result = self.call_function(&function, args);
        self.call_depth -= 1;
        result
    }

    /// First result of a call, or nil.
    pub fn call_first(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        Ok(self.call(callee, args)?.into_iter().next().unwrap_or(Value::Nil))
    }

    /// Protected call: errors come back as `Err(error value)`.
    pub fn pcall(&mut self, callee: &Value, args: Vec<Value>) -> Result<Vec<Value>, Value> {
        let depth = self.call_depth;
        let sites = self.call_sites.len();
        let current = self.current.clone();
        match self.call(callee, args) {
            Ok(values) => Ok(values),
            Err(e) => {
                self.call_depth = depth;
                self.call_sites.truncate(sites);
                self.current = current;
                Err(e.value())
            }
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        mut args: Vec<Value>,
    ) -> Result<Vec<Value>, RuntimeError> {
        match function {
            Function::Native(native) => {
                if args.len() < native.min_required {
                    return Err(native::bad_argument(
                        args.len(),
                        &native.name,
                        "value expected",
                    ));
                }
                if !native.variadic {
                    args.truncate(native.params.len());
                }
                native.invoke(self, args)
            }
            Function::Closure(closure) => {
                self.call_sites.push(self.current.clone());
                let saved = self.current.clone();
                let result = self.call_closure(closure, args);
                self.current = saved;
                self.call_sites.pop();
                result
            }
        }
    }

    // ── Positions ───────────────────────────────────────────────────────

    /// Prefix an engine error with the current source position.
    pub(crate) fn locate(&self, error: RuntimeError) -> RuntimeError {
        match &self.current {
            Some(loc) => error.located(&loc.file, loc.line),
            None => error,
        }
    }

    /// `"file:line: "` for the given level: 1 is the statement being run,
    /// 2 the call site of the running function, and so on. Empty when the
    /// level is out of range.
    pub fn where_(&self, level: usize) -> String {
        let loc = match level {
            0 => None,
            1 => self.current.as_ref(),
            n => self
                .call_sites
                .len()
                .checked_sub(n - 1)
                .and_then(|i| self.call_sites.get(i))
                .and_then(|site| site.as_ref()),
        };
        match loc {
            Some(loc) => format!("{}:{}: ", loc.file, loc.line),
            None => String::new(),
        }
    }
}
