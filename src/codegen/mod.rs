//! Kernel code generation.
//!
//! - `coords`: output-coordinate types and channel names
//! - `ir`: the statement/expression tree kernels are built from
//! - `wgsl`: renders the tree to WGSL
//! - `template`: the shared runtime a rendered kernel is spliced into
//! - `eval`: CPU interpreter for the same tree

pub mod coords;
pub mod eval;
pub mod ir;
pub mod template;
pub mod wgsl;

pub use coords::{CoordContext, CoordsType, MAX_RANK, channel_names};
pub use ir::{Expr, ShaderProgram, Stmt, Type};
pub use template::assemble_module;
