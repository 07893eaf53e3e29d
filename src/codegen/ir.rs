//! Shader IR shared by the WGSL renderer and the CPU interpreter.
//!
//! Synthesizers build these trees from shapes and layouts; nothing upstream
//! of `codegen::wgsl` concatenates shader text.

use super::coords::CoordsType;

/// Value type of a local or a function result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    I32,
    F32,
    Bool,
    Vec4F,
    Coords(CoordsType),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Mul,
    Ge,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Mul => "*",
            BinOp::Ge => ">=",
            BinOp::Or => "||",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i32),
    Float(f32),
    Local(String),
    /// One component of a coordinate local. `name` is the rendered spelling
    /// chosen by the channel namer; `index` is the positional component.
    CoordComponent {
        var: String,
        index: usize,
        name: String,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Coordinates of the output element being produced.
    OutputCoords,
    /// Read input `sampler` at a logical index. Packed samplers yield the
    /// whole texel containing that element, unpacked ones a scalar.
    Sample {
        sampler: String,
        packed: bool,
        index: Vec<Expr>,
    },
    Vec4(Vec<Expr>),
    Splat(Box<Expr>),
    /// Four-lane swizzle of a `vec4`, lanes in `0..4`.
    Swizzle {
        value: Box<Expr>,
        lanes: [usize; 4],
    },
}

impl Expr {
    pub fn local(name: &str) -> Self {
        Expr::Local(name.to_string())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(self, rhs: Expr) -> Self {
        Self::binary(BinOp::Add, self, rhs)
    }

    pub fn mul(self, rhs: Expr) -> Self {
        Self::binary(BinOp::Mul, self, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Self {
        Self::binary(BinOp::Ge, self, rhs)
    }

    pub fn or(self, rhs: Expr) -> Self {
        Self::binary(BinOp::Or, self, rhs)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn swizzle(self, lanes: [usize; 4]) -> Self {
        Expr::Swizzle {
            value: Box::new(self),
            lanes,
        }
    }

    pub fn zero_vec4() -> Self {
        Expr::Splat(Box::new(Expr::Float(0.0)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let { name: String, ty: Type, value: Expr },
    Var { name: String, ty: Type, value: Expr },
    Assign { name: String, value: Expr },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `for (var var = 0; var < count; var = var + 1)`
    ForRange {
        var: String,
        count: i32,
        body: Vec<Stmt>,
    },
    Return(Expr),
}

impl Stmt {
    pub fn let_(name: &str, ty: Type, value: Expr) -> Self {
        Stmt::Let {
            name: name.to_string(),
            ty,
            value,
        }
    }

    pub fn var(name: &str, ty: Type, value: Expr) -> Self {
        Stmt::Var {
            name: name.to_string(),
            ty,
            value,
        }
    }

    pub fn assign(name: &str, value: Expr) -> Self {
        Stmt::Assign {
            name: name.to_string(),
            value,
        }
    }

    pub fn if_(cond: Expr, then_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body: Vec::new(),
        }
    }

    pub fn if_else(cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body,
        }
    }
}

/// A synthesized kernel body.
///
/// With `has_main` the body is the fragment entry point itself; otherwise it
/// is a `process` function spliced into the shared template, which supplies
/// the entry point. Either way the body returns the output texel as `vec4`.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderProgram {
    pub has_main: bool,
    pub body: Vec<Stmt>,
}
