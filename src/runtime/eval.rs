//! Statement execution and expression evaluation.
//!
//! Statements return a [`Flow`] signal; each construct intercepts the
//! signals meant for it and hands the rest to its parent. Errors travel
//! separately as `Err(RuntimeError)`.

use std::iter;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::ast::{Attrib, BinOp, Block, Expr, Field, FuncBody, Statement};

use super::error::{domain_error, type_error, RuntimeError};
use super::ops;
use super::scope::{Binding, ScopeRef, Variable};
use super::value::{Closure, Function, Number, Table, Value};
use super::Interpreter;

#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Vec<Value>),
    Break,
    Goto(String),
}

/// Per-block execution state.
struct Frame {
    /// Innermost scope; every local declaration opens a new one.
    scope: ScopeRef,
    /// To-be-closed values in declaration order.
    tbc: Vec<Value>,
    /// Labels reached so far: statement index, scope and pending-close
    /// depth at that point.
    labels: Vec<(usize, ScopeRef, usize)>,
}

impl Frame {
    fn new(scope: ScopeRef) -> Self {
        Self {
            scope,
            tbc: Vec::new(),
            labels: Vec::new(),
        }
    }
}

/// Assignment target with its object and key already evaluated.
enum Place<'a> {
    Name(&'a str),
    Index(Value, Value),
}

fn make_closure(body: &Rc<FuncBody>, scope: &ScopeRef, name: Option<String>) -> Value {
    Value::from_function(Function::Closure(Closure {
        body: body.clone(),
        scope: scope.clone(),
        name,
    }))
}

/// `" (global 'x')"`-style suffix naming the expression that produced a bad
/// value, when it has a name.
fn describe(expr: &Expr, scope: &ScopeRef) -> String {
    match expr {
        Expr::Name { name, .. } => match scope.binding(name) {
            Binding::Local => format!(" (local '{}')", name),
            Binding::Upvalue => format!(" (upvalue '{}')", name),
            Binding::Global => format!(" (global '{}')", name),
        },
        Expr::Index { key, .. } => match &**key {
            Expr::StringLiteral { value, .. } => {
                format!(" (field '{}')", String::from_utf8_lossy(value))
            }
            _ => String::new(),
        },
        Expr::MethodCall { method, .. } => format!(" (method '{}')", method),
        _ => String::new(),
    }
}

impl Interpreter {
    // ── Functions ───────────────────────────────────────────────────────

    /// Bind arguments in a child of the captured scope and run the body.
    pub(crate) fn call_closure(
        &mut self,
        closure: &Closure,
        mut args: Vec<Value>,
    ) -> Result<Vec<Value>, RuntimeError> {
        let body = &closure.body;
        let nparams = body.params.len();
        let varargs = body.variadic.then(|| {
            if args.len() > nparams {
                args.split_off(nparams)
            } else {
                Vec::new()
            }
        });
        let scope = closure.scope.push_function(varargs);
        args.resize(nparams, Value::Nil);
        for (name, value) in body.params.iter().zip(args) {
            scope.put_local(name, Variable::new(value));
        }

        match self.exec_block(&body.body, scope)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
            Flow::Goto(label) => Err(self.locate(RuntimeError::GotoTarget(format!(
                "no visible label '{}' for goto",
                label
            )))),
        }
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Run `block` in `scope`, closing its to-be-closed variables on every
    /// exit path.
    pub(crate) fn exec_block(&mut self, block: &Block, scope: ScopeRef) -> Result<Flow, RuntimeError> {
        let mut frame = Frame::new(scope);
        let result = self.run_statements(block, &mut frame);
        self.close_pending(&mut frame.tbc, 0, result)
    }

    fn run_statements(&mut self, block: &Block, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        let statements = &block.statements;
        let mut pc = 0;
        while pc < statements.len() {
            let stmt = &statements[pc];
            if let Statement::Label { .. } = stmt {
                frame.labels.retain(|(at, ..)| *at != pc);
                frame.labels.push((pc, frame.scope.clone(), frame.tbc.len()));
                pc += 1;
                continue;
            }
            match self.exec_statement(stmt, frame)? {
                Flow::Normal => pc += 1,
                Flow::Goto(label) => match block.label_index(&label) {
                    Some(target) => {
                        trace!(label = %label, target, "goto");
                        let reached = frame
                            .labels
                            .iter()
                            .find(|(at, ..)| *at == target)
                            .map(|(_, scope, depth)| (scope.clone(), *depth));
                        // Jumping back leaves every local declared after the label.
                        if let Some((scope, depth)) = reached {
                            self.close_pending(&mut frame.tbc, depth, Ok(Flow::Normal))?;
                            frame.scope = scope;
                        }
                        pc = target;
                    }
                    None => return Ok(Flow::Goto(label)),
                },
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    /// Close pending values above `keep`, newest first. Each handler gets
    /// the error in flight (or nil); a failing handler chains onto it.
    fn close_pending(
        &mut self,
        tbc: &mut Vec<Value>,
        keep: usize,
        mut result: Result<Flow, RuntimeError>,
    ) -> Result<Flow, RuntimeError> {
        while tbc.len() > keep {
            let Some(value) = tbc.pop() else { break };
            let error = match &result {
                Err(e) => e.value(),
                Ok(_) => Value::Nil,
            };
            if let Err(close_error) = self.close_value(&value, error) {
                result = Err(match result {
                    Err(previous) => {
                        warn!(error = %close_error, previous = %previous, "close handler failed while unwinding");
                        close_error.chain(previous)
                    }
                    Ok(_) => close_error,
                });
            }
        }
        result
    }

    /// One loop iteration in a fresh scope holding `bindings`. `None` means
    /// keep looping.
    fn loop_iteration<'a>(
        &mut self,
        body: &Block,
        scope: &ScopeRef,
        bindings: impl IntoIterator<Item = (&'a String, Value)>,
    ) -> Result<Option<Flow>, RuntimeError> {
        let iteration = scope.push();
        for (name, value) in bindings {
            iteration.put_local(name, Variable::new(value));
        }
        Ok(match self.exec_block(body, iteration)? {
            Flow::Normal => None,
            Flow::Break => Some(Flow::Normal),
            other => Some(other),
        })
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn exec_statement(&mut self, stmt: &Statement, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        self.current = Some(stmt.loc().clone());
        let scope = frame.scope.clone();
        match stmt {
            Statement::Empty { .. } | Statement::Label { .. } => Ok(Flow::Normal),

            Statement::Assignment { targets, values, .. } => {
                let mut places = Vec::with_capacity(targets.len());
                for target in targets {
                    match target {
                        Expr::Name { name, .. } => places.push(Place::Name(name)),
                        Expr::Index { object, key, .. } => {
                            let obj = self.eval_expr(object, &scope)?;
                            let key = self.eval_expr(key, &scope)?;
                            self.check_indexable(&obj, "__newindex", object, &scope)?;
                            places.push(Place::Index(obj, key));
                        }
                        _ => return Err(self.locate(type_error("cannot assign to this expression"))),
                    }
                }
                let values = self.eval_list_adjusted(values, targets.len(), &scope)?;
                for (place, value) in places.into_iter().zip(values) {
                    match place {
                        Place::Name(name) => scope
                            .put_nonlocal(name, value)
                            .map_err(|e| self.locate(e))?,
                        Place::Index(obj, key) => self.set_index(&obj, key, value)?,
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::LocalAssignment { names, values, .. } => {
                let values = self.eval_list_adjusted(values, names.len(), &scope)?;
                let inner = scope.push();
                for (decl, value) in names.iter().zip(values) {
                    let variable = match decl.attrib {
                        None => Variable::new(value),
                        Some(Attrib::Const) => Variable::constant(value),
                        Some(Attrib::Close) => {
                            self.check_closable(&decl.name, &value)?;
                            frame.tbc.push(value.clone());
                            Variable::to_be_closed(value)
                        }
                    };
                    inner.put_local(&decl.name, variable);
                }
                frame.scope = inner;
                Ok(Flow::Normal)
            }

            Statement::LocalFunction { name, body, .. } => {
                let inner = scope.push();
                inner.put_local(name, Variable::new(Value::Nil));
                let closure = make_closure(body, &inner, Some(name.clone()));
                inner.put_local(name, Variable::new(closure));
                frame.scope = inner;
                Ok(Flow::Normal)
            }

            Statement::Function { name, body, .. } => {
                let closure = make_closure(body, &scope, Some(name.display_name()));
                let Some((first, rest)) = name.path.split_first() else {
                    return Ok(Flow::Normal);
                };
                let field = match (&name.method, rest.split_last()) {
                    (Some(method), _) => Some((method, rest)),
                    (None, Some((last, middle))) => Some((last, middle)),
                    (None, None) => None,
                };
                match field {
                    None => scope
                        .put_nonlocal(first, closure)
                        .map_err(|e| self.locate(e))?,
                    Some((field, path)) => {
                        let mut target = scope.get(first).map_err(|e| self.locate(e))?;
                        for segment in path {
                            target = self.index(&target, &Value::from(segment.as_str()))?;
                        }
                        self.set_index(&target, Value::from(field.as_str()), closure)?;
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::Call { call, .. } => {
                self.eval_call(call, &scope)?;
                Ok(Flow::Normal)
            }

            Statement::Do { body, .. } => self.exec_block(body, scope.push()),

            Statement::If {
                clauses, else_body, ..
            } => {
                for clause in clauses {
                    if self.eval_expr(&clause.condition, &scope)?.is_truthy() {
                        return self.exec_block(&clause.body, scope.push());
                    }
                }
                match else_body {
                    Some(body) => self.exec_block(body, scope.push()),
                    None => Ok(Flow::Normal),
                }
            }

            Statement::While {
                condition, body, loc,
            } => {
                loop {
                    self.current = Some(loc.clone());
                    if !self.eval_expr(condition, &scope)?.is_truthy() {
                        break;
                    }
                    if let Some(flow) = self.loop_iteration(body, &scope, iter::empty())? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::Repeat {
                body, condition, ..
            } => loop {
                // The condition sees the body's locals, so it runs before
                // the body's scope is closed.
                let mut inner = Frame::new(scope.push());
                let result = match self.run_statements(body, &mut inner) {
                    Ok(Flow::Normal) => self
                        .eval_expr(condition, &inner.scope)
                        .map(|v| if v.is_truthy() { Flow::Break } else { Flow::Normal }),
                    other => other,
                };
                match self.close_pending(&mut inner.tbc, 0, result)? {
                    Flow::Normal => continue,
                    Flow::Break => return Ok(Flow::Normal),
                    other => return Ok(other),
                }
            },

            Statement::For {
                var,
                start,
                stop,
                step,
                body,
                ..
            } => {
                let start = self.eval_expr(start, &scope)?;
                let stop = self.eval_expr(stop, &scope)?;
                let step = match step {
                    Some(step) => self.eval_expr(step, &scope)?,
                    None => Value::Int(1),
                };
                let start = self.for_number(&start, "initial")?;
                let stop = self.for_number(&stop, "limit")?;
                let step = self.for_number(&step, "step")?;
                self.numeric_for(var, start, stop, step, body, &scope)
            }

            Statement::ForIn {
                names, exprs, body, ..
            } => {
                let mut values = self.eval_list_adjusted(exprs, 4, &scope)?.into_iter();
                let iterator = values.next().unwrap_or(Value::Nil);
                let state = values.next().unwrap_or(Value::Nil);
                let control = values.next().unwrap_or(Value::Nil);
                let closing = values.next().unwrap_or(Value::Nil);
                let mut tbc = Vec::new();
                if closing.is_truthy() {
                    self.check_closable("(for state)", &closing)?;
                    tbc.push(closing);
                }
                let result = self.generic_for(names, iterator, state, control, body, &scope);
                self.close_pending(&mut tbc, 0, result)
            }

            Statement::Break { .. } => Ok(Flow::Break),

            Statement::Goto { label, .. } => Ok(Flow::Goto(label.clone())),

            Statement::Return { values, .. } => Ok(Flow::Return(self.eval_list(values, &scope)?)),
        }
    }

    fn for_number(&self, v: &Value, what: &str) -> Result<Number, RuntimeError> {
        v.as_number().ok_or_else(|| {
            self.locate(type_error(format!("'for' {} value must be a number", what)))
        })
    }

    fn numeric_for(
        &mut self,
        var: &String,
        start: Number,
        stop: Number,
        step: Number,
        body: &Block,
        scope: &ScopeRef,
    ) -> Result<Flow, RuntimeError> {
        match (start, step) {
            (Number::Int(first), Number::Int(step)) => {
                if step == 0 {
                    return Err(self.locate(domain_error("'for' step is zero")));
                }
                let mut i = first;
                loop {
                    let within = if step > 0 {
                        ops::num_le(Number::Int(i), stop)
                    } else {
                        ops::num_le(stop, Number::Int(i))
                    };
                    if !within {
                        break;
                    }
                    if let Some(flow) =
                        self.loop_iteration(body, scope, iter::once((var, Value::Int(i))))?
                    {
                        return Ok(flow);
                    }
                    // Overflow ends the loop instead of wrapping.
                    i = match i.checked_add(step) {
                        Some(next) => next,
                        None => break,
                    };
                }
            }
            _ => {
                let (mut x, stop, step) = (start.to_f64(), stop.to_f64(), step.to_f64());
                if step == 0.0 {
                    return Err(self.locate(domain_error("'for' step is zero")));
                }
                while (step > 0.0 && x <= stop) || (step < 0.0 && x >= stop) {
                    if let Some(flow) =
                        self.loop_iteration(body, scope, iter::once((var, Value::Float(x))))?
                    {
                        return Ok(flow);
                    }
                    x += step;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn generic_for(
        &mut self,
        names: &[String],
        iterator: Value,
        state: Value,
        mut control: Value,
        body: &Block,
        scope: &ScopeRef,
    ) -> Result<Flow, RuntimeError> {
        loop {
            let mut results = self.call(&iterator, vec![state.clone(), control.clone()])?;
            results.resize(names.len().max(1), Value::Nil);
            if results[0].is_nil() {
                return Ok(Flow::Normal);
            }
            control = results[0].clone();
            if let Some(flow) = self.loop_iteration(body, scope, names.iter().zip(results))? {
                return Ok(flow);
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Evaluate to exactly one value; multi-value expressions are truncated.
    pub(crate) fn eval_expr(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Nil { .. } => Ok(Value::Nil),
            Expr::BoolLiteral { value, .. } => Ok(Value::Bool(*value)),
            Expr::IntegerLiteral { value, .. } => Ok(Value::Int(*value)),
            Expr::FloatLiteral { value, .. } => Ok(Value::Float(*value)),
            Expr::StringLiteral { value, .. } => Ok(Value::Str(value.clone())),
            Expr::Vararg { .. } => Ok(scope.varargs().first().cloned().unwrap_or(Value::Nil)),
            Expr::Name { name, .. } => scope.get(name).map_err(|e| self.locate(e)),
            Expr::Index { object, key, .. } => {
                let obj = self.eval_expr(object, scope)?;
                let key = self.eval_expr(key, scope)?;
                self.check_indexable(&obj, "__index", object, scope)?;
                self.index(&obj, &key)
            }
            Expr::Table { fields, .. } => self.eval_table(fields, scope),
            Expr::Function { body, .. } => Ok(make_closure(body, scope, None)),
            Expr::Call { .. } | Expr::MethodCall { .. } => Ok(self
                .eval_call(expr, scope)?
                .into_iter()
                .next()
                .unwrap_or(Value::Nil)),
            Expr::UnaryOp { op, operand, .. } => {
                let v = self.eval_expr(operand, scope)?;
                self.unary(*op, &v)
            }
            Expr::BinaryOp {
                left, op, right, ..
            } => self.eval_binary(*op, left, right, scope),
            Expr::Paren { inner, .. } => self.eval_expr(inner, scope),
        }
    }

    /// All values of a call or `...`; one value for anything else.
    fn eval_multi(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Vec<Value>, RuntimeError> {
        match expr {
            Expr::Call { .. } | Expr::MethodCall { .. } => self.eval_call(expr, scope),
            Expr::Vararg { .. } => Ok(scope.varargs().to_vec()),
            other => Ok(vec![self.eval_expr(other, scope)?]),
        }
    }

    /// Left to right; only the last expression may contribute several values.
    fn eval_list(&mut self, exprs: &[Expr], scope: &ScopeRef) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.is_multires() {
                values.extend(self.eval_multi(expr, scope)?);
            } else {
                values.push(self.eval_expr(expr, scope)?);
            }
        }
        Ok(values)
    }

    fn eval_list_adjusted(
        &mut self,
        exprs: &[Expr],
        n: usize,
        scope: &ScopeRef,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut values = self.eval_list(exprs, scope)?;
        values.resize(n, Value::Nil);
        Ok(values)
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        scope: &ScopeRef,
    ) -> Result<Value, RuntimeError> {
        match op {
            BinOp::And => {
                let l = self.eval_expr(left, scope)?;
                if l.is_truthy() {
                    self.eval_expr(right, scope)
                } else {
                    Ok(l)
                }
            }
            BinOp::Or => {
                let l = self.eval_expr(left, scope)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval_expr(right, scope)
                }
            }
            _ => {
                let a = self.eval_expr(left, scope)?;
                let b = self.eval_expr(right, scope)?;
                match op {
                    BinOp::Eq => Ok(Value::Bool(self.equals(&a, &b)?)),
                    BinOp::Ne => Ok(Value::Bool(!self.equals(&a, &b)?)),
                    BinOp::Lt => Ok(Value::Bool(self.less_than(&a, &b)?)),
                    BinOp::Le => Ok(Value::Bool(self.less_equal(&a, &b)?)),
                    BinOp::Gt => Ok(Value::Bool(self.less_than(&b, &a)?)),
                    BinOp::Ge => Ok(Value::Bool(self.less_equal(&b, &a)?)),
                    BinOp::Concat => self.concat(&a, &b),
                    _ => self.arith(op, &a, &b),
                }
            }
        }
    }

    fn eval_table(&mut self, fields: &[Field], scope: &ScopeRef) -> Result<Value, RuntimeError> {
        let positional = fields
            .iter()
            .filter(|f| matches!(f, Field::Positional(_)))
            .count();
        let mut table = Table::with_capacity(positional);
        let mut counter: i64 = 1;
        for (i, field) in fields.iter().enumerate() {
            match field {
                Field::Positional(expr) if i + 1 == fields.len() && expr.is_multires() => {
                    for value in self.eval_multi(expr, scope)? {
                        table.set_int(counter, value);
                        counter += 1;
                    }
                }
                Field::Positional(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    table.set_int(counter, value);
                    counter += 1;
                }
                Field::Named { name, value } => {
                    let value = self.eval_expr(value, scope)?;
                    table.set_str(name, value);
                }
                Field::Keyed { key, value } => {
                    let key = self.eval_expr(key, scope)?;
                    let value = self.eval_expr(value, scope)?;
                    table.put(key, value).map_err(|e| self.locate(e))?;
                }
            }
        }
        Ok(Value::from_table(table))
    }

    /// Evaluate a call or method call and return all of its results.
    fn eval_call(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Vec<Value>, RuntimeError> {
        match expr {
            Expr::Call {
                function,
                arguments,
                ..
            } => {
                let callee = self.eval_expr(function, scope)?;
                let args = self.eval_list(arguments, scope)?;
                self.check_callable(&callee, function, scope)?;
                self.call(&callee, args)
            }
            Expr::MethodCall {
                object,
                method,
                arguments,
                ..
            } => {
                let obj = self.eval_expr(object, scope)?;
                self.check_indexable(&obj, "__index", object, scope)?;
                let callee = self.index(&obj, &Value::from(method.as_str()))?;
                let mut args = Vec::with_capacity(arguments.len() + 1);
                args.push(obj);
                args.extend(self.eval_list(arguments, scope)?);
                self.check_callable(&callee, expr, scope)?;
                self.call(&callee, args)
            }
            other => Ok(vec![self.eval_expr(other, scope)?]),
        }
    }

    fn check_callable(&self, callee: &Value, expr: &Expr, scope: &ScopeRef) -> Result<(), RuntimeError> {
        if matches!(callee, Value::Function(_)) || self.has_metamethod(callee, "__call") {
            return Ok(());
        }
        Err(self.locate(type_error(format!(
            "attempt to call a {} value{}",
            callee.type_name(),
            describe(expr, scope)
        ))))
    }

    fn check_indexable(
        &self,
        obj: &Value,
        event: &str,
        expr: &Expr,
        scope: &ScopeRef,
    ) -> Result<(), RuntimeError> {
        if matches!(obj, Value::Table(_)) || self.has_metamethod(obj, event) {
            return Ok(());
        }
        Err(self.locate(type_error(format!(
            "attempt to index a {} value{}",
            obj.type_name(),
            describe(expr, scope)
        ))))
    }
}
