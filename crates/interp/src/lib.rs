#![forbid(unsafe_code)]

use frontend::ast::*;
use frontend::lexer::Pos;
use frontend::parser::{ParseError, Parser};
use frontend::template::Segment;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

/// Names resolved before user functions; a program may not redefine them.
const BUILTINS: [&str; 3] = ["print", "println", "length"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    /// Fixed length, mutable in place. Passing or whole-assigning an array
    /// copies it (value semantics).
    Array(Vec<i64>),
    None,
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Array(_) => "array",
            Value::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("{pos}: name '{name}' is already declared in this scope")]
    Redeclared { name: String, pos: Pos },
    #[error("{pos}: undefined name '{name}'")]
    Undefined { name: String, pos: Pos },
    #[error("{pos}: type mismatch: {message}")]
    Type { message: String, pos: Pos },
    #[error("{pos}: index {index} out of bounds for array of length {len}")]
    ArrayBounds { index: i64, len: usize, pos: Pos },
    #[error("{pos}: division by zero")]
    DivisionByZero { pos: Pos },
    #[error("write to output sink failed: {0}")]
    Io(String),
}

/// The single failure outcome handed back to the host. Output already written
/// to the sink before a runtime error stays written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Lex, parse and execute `src`, writing all print output to `out`.
pub fn run(src: &str, out: &mut dyn Write) -> Result<(), Error> {
    let mut parser = Parser::new(src)?;
    let program = parser.parse_program()?;
    let mut interp = Interpreter::new(out);
    interp.load_program(&program)?;
    interp.run_main()?;
    Ok(())
}

enum Flow {
    Normal,
    Return(Value),
}

/// Tree-walking evaluator. Each function activation gets its own environment
/// rooted at the global function table; scopes within it nest as a stack.
pub struct Interpreter<'a> {
    funcs: IndexMap<String, FuncDecl>,
    out: &'a mut dyn Write,
}

impl<'a> Interpreter<'a> {
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self {
            funcs: IndexMap::new(),
            out,
        }
    }

    /// Bind all top-level functions. Duplicates, and names clashing with a
    /// built-in, fail before anything runs.
    pub fn load_program(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for func in &program.funcs {
            if BUILTINS.contains(&func.name.as_str()) || self.funcs.contains_key(&func.name) {
                return Err(RuntimeError::Redeclared {
                    name: func.name.clone(),
                    pos: func.pos,
                });
            }
            self.funcs.insert(func.name.clone(), func.clone());
        }
        Ok(())
    }

    /// Validate and invoke `main`: it must exist, take no parameters and
    /// return none.
    pub fn run_main(&mut self) -> Result<(), RuntimeError> {
        let Some(main_fn) = self.funcs.get("main").cloned() else {
            return Err(RuntimeError::Undefined {
                name: "main".into(),
                pos: Pos { line: 1, column: 1 },
            });
        };
        if !main_fn.params.is_empty() {
            return Err(RuntimeError::Type {
                message: "main must not take parameters".into(),
                pos: main_fn.pos,
            });
        }
        if main_fn.ret != RetType::None {
            return Err(RuntimeError::Type {
                message: "main must return none".into(),
                pos: main_fn.pos,
            });
        }
        self.call_function(&main_fn, Vec::new(), main_fn.pos)?;
        Ok(())
    }

    fn call_function(
        &mut self,
        func: &FuncDecl,
        args: Vec<Value>,
        call_pos: Pos,
    ) -> Result<Value, RuntimeError> {
        if func.params.len() != args.len() {
            return Err(RuntimeError::Type {
                message: format!(
                    "'{}' expects {} argument(s), got {}",
                    func.name,
                    func.params.len(),
                    args.len()
                ),
                pos: call_pos,
            });
        }
        let mut env = Env::new();
        env.push_scope();
        for (param, arg) in func.params.iter().zip(args) {
            env.declare(param, arg, func.pos)?;
        }
        let flow = self.exec_stmts(&func.body.stmts, &mut env)?;
        match (func.ret, flow) {
            (RetType::Int, Flow::Return(Value::Int(v))) => Ok(Value::Int(v)),
            (RetType::Int, Flow::Return(other)) => Err(RuntimeError::Type {
                message: format!(
                    "'{}' is declared int but returned {}",
                    func.name,
                    other.kind()
                ),
                pos: func.pos,
            }),
            (RetType::Int, Flow::Normal) => Err(RuntimeError::Type {
                message: format!("'{}' is declared int but did not return a value", func.name),
                pos: func.pos,
            }),
            (RetType::None, Flow::Return(Value::None)) | (RetType::None, Flow::Normal) => {
                Ok(Value::None)
            }
            (RetType::None, Flow::Return(other)) => Err(RuntimeError::Type {
                message: format!(
                    "'{}' is declared none but returned {}",
                    func.name,
                    other.kind()
                ),
                pos: func.pos,
            }),
        }
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &mut Env) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if let Flow::Return(v) = self.exec_stmt(stmt, env)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, block: &Block, env: &mut Env) -> Result<Flow, RuntimeError> {
        env.push_scope();
        let flow = self.exec_stmts(&block.stmts, env);
        env.pop_scope();
        flow
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut Env) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Decl(decl) => {
                self.exec_decl(decl, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign(assign) => {
                self.exec_assign(assign, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Print(print) => {
                self.exec_print(print, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let v = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::None,
                };
                Ok(Flow::Return(v))
            }
            Stmt::If(stmt) => {
                if self.eval_cond(&stmt.cond, env)? {
                    self.exec_block(&stmt.then_body, env)
                } else if let Some(else_body) = &stmt.else_body {
                    self.exec_block(else_body, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(stmt) => loop {
                if !self.eval_cond(&stmt.cond, env)? {
                    return Ok(Flow::Normal);
                }
                if let Flow::Return(v) = self.exec_block(&stmt.body, env)? {
                    return Ok(Flow::Return(v));
                }
            },
            Stmt::For(stmt) => {
                // the loop scope outlives all iterations and holds the init
                // binding; each iteration's body runs in a fresh child scope
                env.push_scope();
                let result = (|| {
                    match &stmt.init {
                        Some(ForInit::Decl(decl)) => self.exec_decl(decl, env)?,
                        Some(ForInit::Assign(assign)) => self.exec_assign(assign, env)?,
                        None => {}
                    }
                    loop {
                        if !self.eval_cond(&stmt.cond, env)? {
                            return Ok(Flow::Normal);
                        }
                        if let Flow::Return(v) = self.exec_block(&stmt.body, env)? {
                            return Ok(Flow::Return(v));
                        }
                        self.exec_assign(&stmt.step, env)?;
                    }
                })();
                env.pop_scope();
                result
            }
        }
    }

    fn exec_decl(&mut self, decl: &VarDecl, env: &mut Env) -> Result<(), RuntimeError> {
        let value = match decl.size {
            Some(size) => {
                let len = size as usize;
                match &decl.init {
                    None => Value::Array(vec![0; len]),
                    Some(Expr::Array { elems, .. }) if elems.len() == 1 => {
                        // broadcast-fill: one element initializes every slot
                        let fill = self.eval_int(&elems[0], env)?;
                        Value::Array(vec![fill; len])
                    }
                    Some(Expr::Array { elems, .. }) => {
                        let mut items = Vec::with_capacity(len);
                        for elem in elems {
                            items.push(self.eval_int(elem, env)?);
                        }
                        Value::Array(items)
                    }
                    Some(other) => {
                        // unreachable through the parser, which rejects
                        // non-literal initializers on sized declarations
                        return Err(RuntimeError::Type {
                            message: "a sized declaration requires an array literal".into(),
                            pos: other.pos(),
                        });
                    }
                }
            }
            None => match &decl.init {
                None => Value::Int(0),
                Some(init) => {
                    let v = self.eval_expr(init, env)?;
                    if v == Value::None {
                        return Err(RuntimeError::Type {
                            message: format!("cannot initialize '{}' from none", decl.name),
                            pos: init.pos(),
                        });
                    }
                    v
                }
            },
        };
        env.declare(&decl.name, value, decl.pos)
    }

    fn exec_assign(&mut self, assign: &Assign, env: &mut Env) -> Result<(), RuntimeError> {
        let compound = match assign.op {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
        };
        let value = self.eval_expr(&assign.value, env)?;
        match &assign.target {
            Target::Name(name) => {
                if let Some(op) = compound {
                    let v = expect_int(value, "compound assignment", assign.pos)?;
                    match resolve(env, name, assign.pos)? {
                        Value::Int(cur) => {
                            *cur = eval_arith(op, *cur, v, assign.pos)?;
                            Ok(())
                        }
                        other => Err(RuntimeError::Type {
                            message: format!(
                                "compound assignment targets an integer, got {}",
                                other.kind()
                            ),
                            pos: assign.pos,
                        }),
                    }
                } else {
                    match (resolve(env, name, assign.pos)?, value) {
                        (Value::Int(slot), Value::Int(v)) => {
                            *slot = v;
                            Ok(())
                        }
                        (Value::Array(slot), Value::Array(v)) => {
                            // array length is fixed at declaration
                            if slot.len() != v.len() {
                                return Err(RuntimeError::Type {
                                    message: format!(
                                        "cannot assign an array of length {} to '{}' of length {}",
                                        v.len(),
                                        name,
                                        slot.len()
                                    ),
                                    pos: assign.pos,
                                });
                            }
                            *slot = v;
                            Ok(())
                        }
                        (slot, v) => Err(RuntimeError::Type {
                            message: format!("cannot assign {} to {}", v.kind(), slot.kind()),
                            pos: assign.pos,
                        }),
                    }
                }
            }
            Target::Index(name, index) => {
                let idx = self.eval_int(index, env)?;
                let v = expect_int(value, "an array element", assign.pos)?;
                let elems = match resolve(env, name, assign.pos)? {
                    Value::Array(elems) => elems,
                    other => {
                        return Err(RuntimeError::Type {
                            message: format!("cannot index into {}", other.kind()),
                            pos: assign.pos,
                        })
                    }
                };
                if idx < 0 || idx as usize >= elems.len() {
                    return Err(RuntimeError::ArrayBounds {
                        index: idx,
                        len: elems.len(),
                        pos: assign.pos,
                    });
                }
                let i = idx as usize;
                match compound {
                    None => elems[i] = v,
                    Some(op) => elems[i] = eval_arith(op, elems[i], v, assign.pos)?,
                }
                Ok(())
            }
        }
    }

    /// Evaluate the compiled segments and perform one ordered write.
    fn exec_print(&mut self, stmt: &PrintStmt, env: &mut Env) -> Result<(), RuntimeError> {
        let mut text = String::new();
        for segment in &stmt.template.segments {
            match segment {
                Segment::Text(s) => text.push_str(s),
                Segment::Expr(expr) => match self.eval_expr(expr, env)? {
                    Value::Int(v) => text.push_str(&v.to_string()),
                    other => {
                        return Err(RuntimeError::Type {
                            message: format!(
                                "cannot interpolate {} into a template",
                                other.kind()
                            ),
                            pos: stmt.pos,
                        })
                    }
                },
            }
        }
        if stmt.newline {
            text.push('\n');
        }
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| RuntimeError::Io(e.to_string()))?;
        self.out.flush().ok();
        Ok(())
    }

    fn eval_expr(&mut self, expr: &Expr, env: &mut Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Int { value, .. } => Ok(Value::Int(*value)),
            Expr::Ident { name, pos } => {
                env.get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Undefined {
                        name: name.clone(),
                        pos: *pos,
                    })
            }
            Expr::Unary {
                op, expr: inner, ..
            } => {
                let v = self.eval_int(inner, env)?;
                Ok(Value::Int(match op {
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => (v == 0) as i64,
                }))
            }
            Expr::Binary {
                op,
                left,
                right,
                pos,
            } => {
                let l = self.eval_int(left, env)?;
                let r = self.eval_int(right, env)?;
                Ok(Value::Int(eval_arith(*op, l, r, *pos)?))
            }
            Expr::Call { name, args, pos } => self.eval_call(name, args, env, *pos),
            Expr::Index { name, index, pos } => {
                let idx = self.eval_int(index, env)?;
                match env.get(name) {
                    Some(Value::Array(elems)) => {
                        if idx < 0 || idx as usize >= elems.len() {
                            return Err(RuntimeError::ArrayBounds {
                                index: idx,
                                len: elems.len(),
                                pos: *pos,
                            });
                        }
                        Ok(Value::Int(elems[idx as usize]))
                    }
                    Some(other) => Err(RuntimeError::Type {
                        message: format!("cannot index into {}", other.kind()),
                        pos: *pos,
                    }),
                    None => Err(RuntimeError::Undefined {
                        name: name.clone(),
                        pos: *pos,
                    }),
                }
            }
            Expr::Array { elems, .. } => {
                let mut items = Vec::with_capacity(elems.len());
                for elem in elems {
                    items.push(self.eval_int(elem, env)?);
                }
                Ok(Value::Array(items))
            }
        }
    }

    fn eval_call(
        &mut self,
        name: &str,
        args: &[Expr],
        env: &mut Env,
        pos: Pos,
    ) -> Result<Value, RuntimeError> {
        if let Some(func) = self.funcs.get(name).cloned() {
            // arguments evaluate left to right in the caller's environment
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                let v = self.eval_expr(arg, env)?;
                if v == Value::None {
                    return Err(RuntimeError::Type {
                        message: format!("cannot pass none to '{name}'"),
                        pos: arg.pos(),
                    });
                }
                values.push(v);
            }
            return self.call_function(&func, values, pos);
        }
        if let Some(value) = self.eval_builtin(name, args, env, pos)? {
            return Ok(value);
        }
        Err(RuntimeError::Undefined {
            name: name.to_string(),
            pos,
        })
    }

    fn eval_builtin(
        &mut self,
        name: &str,
        args: &[Expr],
        env: &mut Env,
        pos: Pos,
    ) -> Result<Option<Value>, RuntimeError> {
        match name {
            "length" => {
                if args.len() != 1 {
                    return Err(RuntimeError::Type {
                        message: format!("length expects one argument, got {}", args.len()),
                        pos,
                    });
                }
                // resolve a bare name directly so length stays O(1)
                if let Expr::Ident { name: arr, pos } = &args[0] {
                    return match env.get(arr) {
                        Some(Value::Array(elems)) => Ok(Some(Value::Int(elems.len() as i64))),
                        Some(other) => Err(RuntimeError::Type {
                            message: format!("length expects an array, got {}", other.kind()),
                            pos: *pos,
                        }),
                        None => Err(RuntimeError::Undefined {
                            name: arr.clone(),
                            pos: *pos,
                        }),
                    };
                }
                match self.eval_expr(&args[0], env)? {
                    Value::Array(elems) => Ok(Some(Value::Int(elems.len() as i64))),
                    other => Err(RuntimeError::Type {
                        message: format!("length expects an array, got {}", other.kind()),
                        pos: args[0].pos(),
                    }),
                }
            }
            "print" | "println" => Err(RuntimeError::Type {
                message: format!("{name} is a statement, not an expression"),
                pos,
            }),
            _ => Ok(None),
        }
    }

    fn eval_int(&mut self, expr: &Expr, env: &mut Env) -> Result<i64, RuntimeError> {
        match self.eval_expr(expr, env)? {
            Value::Int(v) => Ok(v),
            other => Err(RuntimeError::Type {
                message: format!("expected an integer, got {}", other.kind()),
                pos: expr.pos(),
            }),
        }
    }

    fn eval_cond(&mut self, expr: &Expr, env: &mut Env) -> Result<bool, RuntimeError> {
        match self.eval_expr(expr, env)? {
            Value::Int(v) => Ok(v != 0),
            other => Err(RuntimeError::Type {
                message: format!("condition must be an integer, got {}", other.kind()),
                pos: expr.pos(),
            }),
        }
    }
}

/// Integer arithmetic wraps (two's complement); comparisons yield 1 or 0.
fn eval_arith(op: BinOp, a: i64, b: i64, pos: Pos) -> Result<i64, RuntimeError> {
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero { pos });
            }
            a.wrapping_div(b)
        }
        BinOp::Lt => (a < b) as i64,
        BinOp::LtEq => (a <= b) as i64,
        BinOp::Gt => (a > b) as i64,
        BinOp::GtEq => (a >= b) as i64,
        BinOp::Eq => (a == b) as i64,
        BinOp::NotEq => (a != b) as i64,
    })
}

fn expect_int(value: Value, what: &str, pos: Pos) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(v) => Ok(v),
        other => Err(RuntimeError::Type {
            message: format!("{what} needs an integer, got {}", other.kind()),
            pos,
        }),
    }
}

fn resolve<'e>(env: &'e mut Env, name: &str, pos: Pos) -> Result<&'e mut Value, RuntimeError> {
    env.get_mut(name).ok_or_else(|| RuntimeError::Undefined {
        name: name.to_string(),
        pos,
    })
}

/// Lexical scope stack for one function activation, innermost scope last.
#[derive(Debug, Default)]
struct Env {
    scopes: Vec<HashMap<String, Value>>,
}

impl Env {
    fn new() -> Self {
        Self::default()
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind in the current scope. Shadowing an outer scope is fine; a
    /// duplicate in this exact scope is not.
    fn declare(&mut self, name: &str, value: Value, pos: Pos) -> Result<(), RuntimeError> {
        let Some(scope) = self.scopes.last_mut() else {
            self.scopes.push(HashMap::from([(name.to_string(), value)]));
            return Ok(());
        };
        if scope.contains_key(name) {
            return Err(RuntimeError::Redeclared {
                name: name.to_string(),
                pos,
            });
        }
        scope.insert(name.to_string(), value);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_src(src: &str) -> String {
        let mut out = Vec::new();
        run(src, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn run_err(src: &str) -> Error {
        let mut out = Vec::new();
        run(src, &mut out).unwrap_err()
    }

    #[test]
    fn sample_program_end_to_end() {
        let src = r#"
        fun sum(a, b) int {
            return a + b;
        }

        fun main() {
            decl baz[64] = [ 1 ]; // baz 0..63 = 1
            decl bar = 37;
            for (decl i = 0; i < length(baz); i += 1) {
                print("values: {baz[i]}, {bar}; sum: ");
                println("{sum(bar, baz[i])}");
            }
        }
        "#;
        let expected = "values: 1, 37; sum: 38\n".repeat(64);
        assert_eq!(run_src(src), expected);
    }

    #[test]
    fn broadcast_fill_reaches_every_index() {
        let src = r#"
        fun main() {
            decl arr[5] = [ 9 ];
            println("{arr[0]} {arr[2]} {arr[4]} {length(arr)}");
        }
        "#;
        assert_eq!(run_src(src), "9 9 9 5\n");
    }

    #[test]
    fn positional_initializer_fills_in_order() {
        let src = r#"
        fun main() {
            decl arr[3] = [ 4, 5, 6 ];
            println("{arr[0]}{arr[1]}{arr[2]}");
        }
        "#;
        assert_eq!(run_src(src), "456\n");
    }

    #[test]
    fn zero_size_array_loop_never_runs() {
        let src = r#"
        fun main() {
            decl arr[0] = [ 1 ];
            for (decl i = 0; i < length(arr); i += 1) {
                println("never");
            }
            println("done {length(arr)}");
        }
        "#;
        assert_eq!(run_src(src), "done 0\n");
    }

    #[test]
    fn decl_without_initializer_zero_fills() {
        let src = r#"
        fun main() {
            decl x;
            decl arr[3];
            println("{x} {arr[1]} {length(arr)}");
        }
        "#;
        assert_eq!(run_src(src), "0 0 3\n");
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let err = run_err("fun main() { decl x = 1; decl x = 2; }");
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::Redeclared { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        let src = r#"
        fun main() {
            decl x = 1;
            for (decl i = 0; i < 1; i += 1) {
                decl x = 2;
                println("{x}");
            }
            println("{x}");
        }
        "#;
        assert_eq!(run_src(src), "2\n1\n");
    }

    #[test]
    fn body_declarations_do_not_leak_across_iterations() {
        let src = r#"
        fun main() {
            for (decl i = 0; i < 3; i += 1) {
                decl t = i * 2;
                println("{t}");
            }
        }
        "#;
        assert_eq!(run_src(src), "0\n2\n4\n");
    }

    #[test]
    fn valued_return_from_none_function_fails() {
        let err = run_err("fun f() none { return 1; } fun main() { f(); }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn int_function_falling_through_fails() {
        let err = run_err("fun f() int { } fun main() { decl x = f(); }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn bare_return_in_int_function_fails() {
        let err = run_err("fun f() int { return; } fun main() { decl x = f(); }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn none_call_cannot_initialize_a_binding() {
        let err = run_err("fun f() { } fun main() { decl x = f(); }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn undefined_assignment_reports_use_site() {
        let err = run_err("fun main() {\n    bogus = 1;\n}");
        let Error::Runtime(RuntimeError::Undefined { name, pos }) = err else {
            panic!("expected undefined-name error");
        };
        assert_eq!(name, "bogus");
        assert_eq!(pos, Pos { line: 2, column: 5 });
    }

    #[test]
    fn undefined_function_call_fails() {
        let err = run_err("fun main() { missing(1); }");
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::Undefined { ref name, .. }) if name == "missing"
        ));
    }

    #[test]
    fn wrong_arity_fails() {
        let err = run_err(
            "fun sum(a, b) int { return a + b; } fun main() { decl x = sum(1); }",
        );
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn arrays_pass_by_value() {
        let src = r#"
        fun smash(arr) {
            arr[0] = 99;
        }

        fun main() {
            decl b[2] = [ 7 ];
            smash(b);
            println("{b[0]}");
        }
        "#;
        assert_eq!(run_src(src), "7\n");
    }

    #[test]
    fn arithmetic_wraps_on_overflow() {
        let src = r#"
        fun main() {
            decl x = 9223372036854775807;
            x += 1;
            println("{x}");
        }
        "#;
        assert_eq!(run_src(src), "-9223372036854775808\n");
    }

    #[test]
    fn division_truncates_and_rejects_zero() {
        assert_eq!(run_src(r#"fun main() { println("{7 / 2}"); }"#), "3\n");
        let err = run_err(r#"fun main() { println("{1 / 0}"); }"#);
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn index_out_of_bounds() {
        let err = run_err(r#"fun main() { decl a[2] = [ 1 ]; println("{a[2]}"); }"#);
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::ArrayBounds { index: 2, len: 2, .. })
        ));
        let err = run_err("fun main() { decl a[2] = [ 1 ]; a[5] = 0; }");
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::ArrayBounds { index: 5, len: 2, .. })
        ));
    }

    #[test]
    fn compound_assignment_operators() {
        let src = r#"
        fun main() {
            decl x = 8;
            x += 2;
            x -= 1;
            x *= 3;
            x /= 2;
            println("{x}");
        }
        "#;
        assert_eq!(run_src(src), "13\n");
    }

    #[test]
    fn compound_assignment_on_array_element() {
        let src = r#"
        fun main() {
            decl a[2] = [ 10, 20 ];
            a[1] += 5;
            println("{a[1]}");
        }
        "#;
        assert_eq!(run_src(src), "25\n");
    }

    #[test]
    fn print_appends_no_newline() {
        let src = r#"
        fun main() {
            print("a");
            print("b");
            println("c");
        }
        "#;
        assert_eq!(run_src(src), "abc\n");
    }

    #[test]
    fn escaped_braces_print_literally() {
        let src = r#"
        fun main() {
            decl a = 5;
            println("{{x}} {a}");
        }
        "#;
        assert_eq!(run_src(src), "{x} 5\n");
    }

    #[test]
    fn interpolating_an_array_fails() {
        let err = run_err(r#"fun main() { decl a[2] = [ 1 ]; println("{a}"); }"#);
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn condition_must_be_an_integer() {
        let err = run_err("fun main() { decl a[2] = [ 1 ]; while (a) { } }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn length_requires_an_array() {
        let err = run_err(r#"fun main() { decl x = 1; println("{length(x)}"); }"#);
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn while_and_if_execute() {
        let src = r#"
        fun main() {
            decl n = 3;
            while (n > 0) {
                if (n == 2) {
                    println("two");
                } else {
                    println("{n}");
                }
                n -= 1;
            }
        }
        "#;
        assert_eq!(run_src(src), "3\ntwo\n1\n");
    }

    #[test]
    fn whole_array_assignment_keeps_length() {
        let src = r#"
        fun main() {
            decl a[2] = [ 1 ];
            decl b[2] = [ 3, 4 ];
            a = b;
            println("{a[0]}{a[1]}");
        }
        "#;
        assert_eq!(run_src(src), "34\n");

        let err = run_err(
            "fun main() { decl a[2] = [ 1 ]; decl b[3] = [ 1 ]; a = b; }",
        );
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn output_before_a_runtime_error_is_kept() {
        let src = r#"
        fun main() {
            println("before");
            println("{1 / 0}");
        }
        "#;
        let mut out = Vec::new();
        let err = run(src, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::DivisionByZero { .. })
        ));
        assert_eq!(String::from_utf8(out).unwrap(), "before\n");
    }

    #[test]
    fn missing_main_fails() {
        let err = run_err("fun helper() { }");
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::Undefined { ref name, .. }) if name == "main"
        ));
    }

    #[test]
    fn main_with_parameters_is_rejected() {
        let err = run_err("fun main(x) { }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn main_must_return_none() {
        let err = run_err("fun main() int { return 1; }");
        assert!(matches!(err, Error::Runtime(RuntimeError::Type { .. })));
    }

    #[test]
    fn duplicate_function_names_fail_at_load() {
        let err = run_err("fun f() { } fun f() { } fun main() { }");
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::Redeclared { ref name, .. }) if name == "f"
        ));
    }

    #[test]
    fn redefining_a_builtin_fails_at_load() {
        let err = run_err("fun length(a) int { return 0; } fun main() { }");
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::Redeclared { ref name, .. }) if name == "length"
        ));
    }

    #[test]
    fn recursion_works() {
        let src = r#"
        fun fact(n) int {
            if (n <= 1) {
                return 1;
            }
            return n * fact(n - 1);
        }

        fun main() {
            println("{fact(5)}");
        }
        "#;
        assert_eq!(run_src(src), "120\n");
    }

    #[test]
    fn functions_resolve_regardless_of_declaration_order() {
        let src = r#"
        fun main() {
            println("{double(21)}");
        }

        fun double(n) int {
            return n * 2;
        }
        "#;
        assert_eq!(run_src(src), "42\n");
    }
}
