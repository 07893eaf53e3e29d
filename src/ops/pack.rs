//! Pack: convert an unpacked tensor texture into the packed RGBA layout.

use anyhow::Result;

use crate::{
    codegen::{
        coords::CoordContext,
        ir::{Expr, ShaderProgram, Stmt, Type},
        wgsl::render_program,
    },
    error::KernelError,
    handler::TextureHandler,
    layout::{LayoutOptions, PACKED_CHANNELS, PackedAxis, TextureLayout},
    tensor::Tensor,
};

use super::{ProgramInfo, RunData, TextureOperator, bind_inputs, check_input_count};

const SAMPLER: &str = "A";

#[derive(Clone, Copy, Debug, Default)]
pub struct PackOp;

impl TextureOperator for PackOp {
    fn name(&self) -> &'static str {
        "Pack"
    }

    fn create_program_info(
        &self,
        handler: &dyn TextureHandler,
        inputs: &[Tensor],
    ) -> Result<ProgramInfo, KernelError> {
        check_input_count(self.name(), inputs, 1)?;
        let input_shape = inputs[0].dims();

        let output_layout = handler.create_texture_layout_from_shape(
            input_shape,
            PACKED_CHANNELS,
            input_shape,
            LayoutOptions { is_packed: true },
        )?;
        let program = build_pack_program(&output_layout)?;

        Ok(ProgramInfo {
            input_layouts: vec![handler.get_or_create_texture_layout(&inputs[0], 1, false)?],
            output_layout,
            samplers: vec![SAMPLER.to_string()],
            shader_source: render_program(&program),
            program,
            is_inputs_packed: false,
            is_output_packed: true,
            has_main: true,
        })
    }

    fn create_run_data(
        &self,
        handler: &dyn TextureHandler,
        program_info: &ProgramInfo,
        inputs: &[Tensor],
    ) -> Result<RunData> {
        check_input_count(self.name(), inputs, 1)?;
        bind_inputs(handler, program_info, inputs)
    }
}

fn sample(index: Vec<Expr>) -> Expr {
    Expr::Sample {
        sampler: SAMPLER.to_string(),
        packed: false,
        index,
    }
}

/// `var <name>: f32 = 0.0; if (!edge) { <name> = A[index]; }`
fn guarded_read(name: &str, edge: Expr, index: Vec<Expr>) -> Vec<Stmt> {
    vec![
        Stmt::var(name, Type::F32, Expr::Float(0.0)),
        Stmt::if_(edge.not(), vec![Stmt::assign(name, sample(index))]),
    ]
}

fn build_pack_program(output_layout: &TextureLayout) -> Result<ShaderProgram, KernelError> {
    let ctx = CoordContext::new("rc", output_layout.rank())?;
    let axes = output_layout.packed_axes();

    let body = match axes.as_slice() {
        [axis] => pack_vector(&ctx, *axis)?,
        [rows, cols] => pack_matrix(&ctx, *rows, *cols)?,
        _ => return Err(KernelError::UnsupportedRank(output_layout.rank())),
    };

    Ok(ShaderProgram {
        has_main: true,
        body,
    })
}

/// Rank 1: the texel holds `(i, i+1, 0, 0)` with `i = rc * 2`.
fn pack_vector(ctx: &CoordContext, axis: PackedAxis) -> Result<Vec<Stmt>, KernelError> {
    let i = Expr::local("i");

    let i_edge = axis.edge_flag(i.clone())?;
    let mut in_bounds = vec![Stmt::let_("i_edge", Type::Bool, i_edge)];
    in_bounds.extend(guarded_read(
        "v1",
        Expr::local("i_edge"),
        vec![i.clone().add(Expr::Int(1))],
    ));
    in_bounds.push(Stmt::Return(Expr::Vec4(vec![
        sample(vec![i.clone()]),
        Expr::local("v1"),
        Expr::Float(0.0),
        Expr::Float(0.0),
    ])));

    Ok(vec![
        ctx.declare(),
        Stmt::let_("i", Type::I32, ctx.col().mul(Expr::Int(2))),
        Stmt::if_else(
            axis.out_of_bounds(i)?,
            vec![Stmt::Return(Expr::zero_vec4())],
            in_bounds,
        ),
    ])
}

/// Rank ≥ 2: the texel holds the 2×2 block at `(r, c) = rc.rowcol * 2`,
/// batch components passed through.
fn pack_matrix(
    ctx: &CoordContext,
    rows: PackedAxis,
    cols: PackedAxis,
) -> Result<Vec<Stmt>, KernelError> {
    let r = Expr::local("r");
    let c = Expr::local("c");
    let rp1 = r.clone().add(Expr::Int(1));
    let cp1 = c.clone().add(Expr::Int(1));
    let at = |row: Expr, col: Expr| {
        let mut index = ctx.batch();
        index.push(row);
        index.push(col);
        index
    };

    let mut in_bounds = vec![
        Stmt::let_("r_edge", Type::Bool, rows.edge_flag(r.clone())?),
        Stmt::let_("c_edge", Type::Bool, cols.edge_flag(c.clone())?),
    ];
    in_bounds.extend(guarded_read(
        "v01",
        Expr::local("c_edge"),
        at(r.clone(), cp1.clone()),
    ));
    in_bounds.extend(guarded_read(
        "v10",
        Expr::local("r_edge"),
        at(rp1.clone(), c.clone()),
    ));
    in_bounds.extend(guarded_read(
        "v11",
        Expr::local("r_edge").or(Expr::local("c_edge")),
        at(rp1, cp1),
    ));
    in_bounds.push(Stmt::Return(Expr::Vec4(vec![
        sample(at(r.clone(), c.clone())),
        Expr::local("v01"),
        Expr::local("v10"),
        Expr::local("v11"),
    ])));

    let row = ctx.row().unwrap_or(Expr::Int(0));

    Ok(vec![
        ctx.declare(),
        Stmt::let_("r", Type::I32, row.mul(Expr::Int(2))),
        Stmt::let_("c", Type::I32, ctx.col().mul(Expr::Int(2))),
        Stmt::if_else(
            rows.out_of_bounds(r)?.or(cols.out_of_bounds(c)?),
            vec![Stmt::Return(Expr::zero_vec4())],
            in_bounds,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::packed_layout;

    #[test]
    fn matrix_program_guards_edges() {
        let program = build_pack_program(&packed_layout(&[3, 3]).unwrap()).unwrap();
        let text = render_program(&program);
        assert!(text.starts_with(
            "@fragment\nfn main(@builtin(position) frag_coord: vec4<f32>)"
        ));
        assert!(text.contains("let rc: vec2<i32> = get_output_coords(frag_coord);"));
        assert!(text.contains("let r: i32 = (rc.x * 2);"));
        assert!(text.contains("if ((r >= 3) || (c >= 3)) {"));
        assert!(text.contains("let r_edge: bool = ((r + 1) >= 3);"));
        assert!(text.contains("if !(r_edge || c_edge) {"));
        assert!(text.contains("return vec4<f32>(get_A(r, c), v01, v10, v11);"));
    }

    #[test]
    fn batch_components_pass_through() {
        let program = build_pack_program(&packed_layout(&[2, 4, 4]).unwrap()).unwrap();
        let text = render_program(&program);
        assert!(text.contains("v01 = get_A(rc.x, r, (c + 1));"));
    }

    #[test]
    fn vector_program_zeroes_upper_channels() {
        let program = build_pack_program(&packed_layout(&[5]).unwrap()).unwrap();
        let text = render_program(&program);
        assert!(text.contains("let i: i32 = (rc * 2);"));
        assert!(text.contains("let i_edge: bool = ((i + 1) >= 5);"));
        assert!(text.contains("if (i >= 5) {"));
        assert!(text.contains("return vec4<f32>(get_A(i), v1, 0.0, 0.0);"));
    }
}
