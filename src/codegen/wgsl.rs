//! Render shader IR to WGSL text.

use super::ir::{Expr, ShaderProgram, Stmt, Type};

/// Name of the spliced function for programs without their own entry point.
pub const PROCESS_FN: &str = "process";
/// Fragment entry point name, whether supplied by a kernel or the template.
pub const ENTRY_POINT: &str = "main";
/// Parameter carrying `@builtin(position)` through to `get_output_coords`.
pub const FRAG_COORD: &str = "frag_coord";

const OUTPUT_COORDS_FN: &str = "get_output_coords";
const LANES: [char; 4] = ['x', 'y', 'z', 'w'];

pub fn sampler_fn_name(sampler: &str) -> String {
    format!("get_{sampler}")
}

pub fn render_type(ty: Type) -> String {
    match ty {
        Type::I32 => "i32".to_string(),
        Type::F32 => "f32".to_string(),
        Type::Bool => "bool".to_string(),
        Type::Vec4F => "vec4<f32>".to_string(),
        Type::Coords(coords) => coords.wgsl(),
    }
}

fn render_float(v: f32) -> String {
    // Debug keeps a trailing `.0` on integral values, which WGSL needs to
    // infer a float literal.
    format!("{v:?}")
}

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Int(v) => v.to_string(),
        Expr::Float(v) => render_float(*v),
        Expr::Local(name) => name.clone(),
        Expr::CoordComponent { name, .. } => name.clone(),
        Expr::Binary { op, lhs, rhs } => {
            format!("({} {} {})", render_expr(lhs), op.symbol(), render_expr(rhs))
        }
        Expr::Not(inner) => format!("!{}", render_expr(inner)),
        Expr::OutputCoords => format!("{OUTPUT_COORDS_FN}({FRAG_COORD})"),
        Expr::Sample { sampler, index, .. } => format!(
            "{}({})",
            sampler_fn_name(sampler),
            index.iter().map(render_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Vec4(parts) => format!(
            "vec4<f32>({})",
            parts.iter().map(render_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Splat(inner) => format!("vec4<f32>({})", render_expr(inner)),
        Expr::Swizzle { value, lanes } => {
            let lanes: String = lanes.iter().map(|&l| LANES[l]).collect();
            format!("{}.{lanes}", render_expr(value))
        }
    }
}

fn render_block(body: &[Stmt], depth: usize, out: &mut String) {
    for stmt in body {
        render_stmt(stmt, depth, out);
    }
}

fn render_stmt(stmt: &Stmt, depth: usize, out: &mut String) {
    let indent = "    ".repeat(depth);
    match stmt {
        Stmt::Let { name, ty, value } => {
            out.push_str(&format!(
                "{indent}let {name}: {} = {};\n",
                render_type(*ty),
                render_expr(value)
            ));
        }
        Stmt::Var { name, ty, value } => {
            out.push_str(&format!(
                "{indent}var {name}: {} = {};\n",
                render_type(*ty),
                render_expr(value)
            ));
        }
        Stmt::Assign { name, value } => {
            out.push_str(&format!("{indent}{name} = {};\n", render_expr(value)));
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            out.push_str(&format!("{indent}if {} {{\n", render_expr(cond)));
            render_block(then_body, depth + 1, out);
            if else_body.is_empty() {
                out.push_str(&format!("{indent}}}\n"));
            } else {
                out.push_str(&format!("{indent}}} else {{\n"));
                render_block(else_body, depth + 1, out);
                out.push_str(&format!("{indent}}}\n"));
            }
        }
        Stmt::ForRange { var, count, body } => {
            out.push_str(&format!(
                "{indent}for (var {var}: i32 = 0; {var} < {count}; {var} = {var} + 1) {{\n"
            ));
            render_block(body, depth + 1, out);
            out.push_str(&format!("{indent}}}\n"));
        }
        Stmt::Return(value) => {
            out.push_str(&format!("{indent}return {};\n", render_expr(value)));
        }
    }
}

/// Render a kernel as either the fragment entry point or the `process`
/// function the shared template calls.
pub fn render_program(program: &ShaderProgram) -> String {
    let mut out = String::new();
    if program.has_main {
        out.push_str(&format!(
            "@fragment\nfn {ENTRY_POINT}(@builtin(position) {FRAG_COORD}: vec4<f32>) -> @location(0) vec4<f32> {{\n"
        ));
    } else {
        out.push_str(&format!(
            "fn {PROCESS_FN}({FRAG_COORD}: vec4<f32>) -> vec4<f32> {{\n"
        ));
    }
    render_block(&program.body, 1, &mut out);
    out.push_str("}\n");
    out
}
