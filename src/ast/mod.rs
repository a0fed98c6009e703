use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: &str, line: usize, column: usize) -> Self {
        Self {
            file: Rc::from(file),
            line,
            column,
        }
    }

    /// Location sharing an already interned file name.
    pub fn in_file(file: &Rc<str>, line: usize, column: usize) -> Self {
        Self {
            file: file.clone(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ── Operators ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "~=",
            BinOp::BitOr => "|",
            BinOp::BitXor => "~",
            BinOp::BitAnd => "&",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Concat => "..",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
    BitNot,
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "not",
            UnOp::Len => "#",
            UnOp::BitNot => "~",
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────────

/// Parameter list and body of a function definition. Shared (`Rc`) so that
/// closures created from it can outlive the tree walk that produced them.
#[derive(Debug, Clone)]
pub struct FuncBody {
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Block,
    pub loc: SourceLocation,
}

/// `a.b.c` or `a.b:c` in `function a.b.c() ... end`.
#[derive(Debug, Clone)]
pub struct FuncName {
    pub path: Vec<String>,
    pub method: Option<String>,
}

impl FuncName {
    pub fn display_name(&self) -> String {
        let mut name = self.path.join(".");
        if let Some(method) = &self.method {
            name.push(':');
            name.push_str(method);
        }
        name
    }
}

// ── Expressions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Field {
    /// `expr`, taking the next array slot.
    Positional(Expr),
    /// `name = expr`
    Named { name: String, value: Expr },
    /// `[key] = expr`
    Keyed { key: Expr, value: Expr },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Nil {
        loc: SourceLocation,
    },
    BoolLiteral {
        value: bool,
        loc: SourceLocation,
    },
    IntegerLiteral {
        value: i64,
        loc: SourceLocation,
    },
    FloatLiteral {
        value: f64,
        loc: SourceLocation,
    },
    StringLiteral {
        value: Rc<[u8]>,
        loc: SourceLocation,
    },
    Vararg {
        loc: SourceLocation,
    },
    Name {
        name: String,
        loc: SourceLocation,
    },
    Index {
        object: Box<Expr>,
        key: Box<Expr>,
        loc: SourceLocation,
    },
    Table {
        fields: Vec<Field>,
        loc: SourceLocation,
    },
    Function {
        body: Rc<FuncBody>,
        loc: SourceLocation,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
        loc: SourceLocation,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        arguments: Vec<Expr>,
        loc: SourceLocation,
    },
    UnaryOp {
        op: UnOp,
        operand: Box<Expr>,
        loc: SourceLocation,
    },
    BinaryOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
        loc: SourceLocation,
    },
    Paren {
        inner: Box<Expr>,
        loc: SourceLocation,
    },
}

impl Expr {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Expr::Nil { loc } => loc,
            Expr::BoolLiteral { loc, .. } => loc,
            Expr::IntegerLiteral { loc, .. } => loc,
            Expr::FloatLiteral { loc, .. } => loc,
            Expr::StringLiteral { loc, .. } => loc,
            Expr::Vararg { loc } => loc,
            Expr::Name { loc, .. } => loc,
            Expr::Index { loc, .. } => loc,
            Expr::Table { loc, .. } => loc,
            Expr::Function { loc, .. } => loc,
            Expr::Call { loc, .. } => loc,
            Expr::MethodCall { loc, .. } => loc,
            Expr::UnaryOp { loc, .. } => loc,
            Expr::BinaryOp { loc, .. } => loc,
            Expr::Paren { loc, .. } => loc,
        }
    }

    /// Calls and `...` can produce any number of values; everything else
    /// produces exactly one.
    pub fn is_multires(&self) -> bool {
        matches!(
            self,
            Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Vararg { .. }
        )
    }
}

// ── Statements ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attrib {
    Const,
    Close,
}

#[derive(Debug, Clone)]
pub struct AttribName {
    pub name: String,
    pub attrib: Option<Attrib>,
}

#[derive(Debug, Clone)]
pub struct IfClause {
    pub condition: Expr,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Empty {
        loc: SourceLocation,
    },
    Assignment {
        targets: Vec<Expr>,
        values: Vec<Expr>,
        loc: SourceLocation,
    },
    LocalAssignment {
        names: Vec<AttribName>,
        values: Vec<Expr>,
        loc: SourceLocation,
    },
    Call {
        call: Expr,
        loc: SourceLocation,
    },
    If {
        clauses: Vec<IfClause>,
        else_body: Option<Block>,
        loc: SourceLocation,
    },
    While {
        condition: Expr,
        body: Block,
        loc: SourceLocation,
    },
    Repeat {
        body: Block,
        condition: Expr,
        loc: SourceLocation,
    },
    For {
        var: String,
        start: Expr,
        stop: Expr,
        step: Option<Expr>,
        body: Block,
        loc: SourceLocation,
    },
    ForIn {
        names: Vec<String>,
        exprs: Vec<Expr>,
        body: Block,
        loc: SourceLocation,
    },
    Function {
        name: FuncName,
        body: Rc<FuncBody>,
        loc: SourceLocation,
    },
    LocalFunction {
        name: String,
        body: Rc<FuncBody>,
        loc: SourceLocation,
    },
    Break {
        loc: SourceLocation,
    },
    Goto {
        label: String,
        loc: SourceLocation,
    },
    Label {
        name: String,
        loc: SourceLocation,
    },
    Do {
        body: Block,
        loc: SourceLocation,
    },
    Return {
        values: Vec<Expr>,
        loc: SourceLocation,
    },
}

impl Statement {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Statement::Empty { loc } => loc,
            Statement::Assignment { loc, .. } => loc,
            Statement::LocalAssignment { loc, .. } => loc,
            Statement::Call { loc, .. } => loc,
            Statement::If { loc, .. } => loc,
            Statement::While { loc, .. } => loc,
            Statement::Repeat { loc, .. } => loc,
            Statement::For { loc, .. } => loc,
            Statement::ForIn { loc, .. } => loc,
            Statement::Function { loc, .. } => loc,
            Statement::LocalFunction { loc, .. } => loc,
            Statement::Break { loc } => loc,
            Statement::Goto { loc, .. } => loc,
            Statement::Label { loc, .. } => loc,
            Statement::Do { loc, .. } => loc,
            Statement::Return { loc, .. } => loc,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    /// Position of `::name::` among this block's own statements.
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.statements.iter().position(|stmt| {
            matches!(stmt, Statement::Label { name: label, .. } if label == name)
        })
    }
}

/// A parsed source unit. Executed as the body of an implicit vararg function.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub block: Block,
    pub name: String,
}
