//! Packed matmul: multiply two packed tensors block by block.
//!
//! Each output texel is the 2×2 block at `(r, c)`. One loop step reads the
//! A texel covering rows `r..r+2` × contraction `2k..2k+2` and the B texel
//! covering contraction `2k..2k+2` × columns `c..c+2`, then adds their 2×2
//! product. Padding lanes of packed textures are zero, so odd sizes need no
//! special casing.

use anyhow::Result;

use crate::{
    codegen::{
        coords::CoordContext,
        ir::{Expr, ShaderProgram, Stmt, Type},
        wgsl::render_program,
    },
    error::KernelError,
    handler::TextureHandler,
    layout::{LayoutOptions, PACKED_CHANNELS},
    shape::{self, DimSource},
    tensor::Tensor,
};

use super::{ProgramInfo, RunData, TextureOperator, bind_inputs, check_input_count};

const SAMPLERS: [&str; 2] = ["A", "B"];

// acc += a.xxzz * b.xyxy + a.yyww * b.zwzw
const A_LO: [usize; 4] = [0, 0, 2, 2];
const B_LO: [usize; 4] = [0, 1, 0, 1];
const A_HI: [usize; 4] = [1, 1, 3, 3];
const B_HI: [usize; 4] = [2, 3, 2, 3];

#[derive(Clone, Copy, Debug, Default)]
pub struct MatMulPackedOp;

impl TextureOperator for MatMulPackedOp {
    fn name(&self) -> &'static str {
        "MatMulPacked"
    }

    fn create_program_info(
        &self,
        handler: &dyn TextureHandler,
        inputs: &[Tensor],
    ) -> Result<ProgramInfo, KernelError> {
        check_input_count(self.name(), inputs, 2)?;
        let (a, b) = (inputs[0].dims(), inputs[1].dims());
        let output_shape = shape::broadcast_shape(a, b, true)?;

        let output_layout = handler.create_texture_layout_from_shape(
            &output_shape,
            PACKED_CHANNELS,
            &output_shape,
            LayoutOptions { is_packed: true },
        )?;
        let input_layouts = inputs
            .iter()
            .map(|t| handler.get_or_create_texture_layout(t, PACKED_CHANNELS, true))
            .collect::<Result<Vec<_>, _>>()?;

        let program = build_matmul_program(&output_shape, a, b)?;

        Ok(ProgramInfo {
            input_layouts,
            output_layout,
            samplers: SAMPLERS.iter().map(|s| s.to_string()).collect(),
            shader_source: render_program(&program),
            program,
            is_inputs_packed: true,
            is_output_packed: true,
            has_main: false,
        })
    }

    fn create_run_data(
        &self,
        handler: &dyn TextureHandler,
        program_info: &ProgramInfo,
        inputs: &[Tensor],
    ) -> Result<RunData> {
        check_input_count(self.name(), inputs, 2)?;
        bind_inputs(handler, program_info, inputs)
    }
}

/// Operand index at the current output coordinate: broadcast batch
/// components, then the kernel-supplied `(row, col)` pair.
fn operand_index(ctx: &CoordContext, operand_shape: &[usize], row: Expr, col: Expr) -> Vec<Expr> {
    let mut trailing = [row, col].into_iter();
    shape::broadcast_sources(ctx.rank(), operand_shape, true)
        .into_iter()
        .map(|src| match src {
            DimSource::Output(i) => ctx.channel(i),
            DimSource::Zero => Expr::Int(0),
            DimSource::Kernel => trailing.next().unwrap_or(Expr::Int(0)),
        })
        .collect()
}

fn packed_sample(sampler: &str, index: Vec<Expr>) -> Expr {
    Expr::Sample {
        sampler: sampler.to_string(),
        packed: true,
        index,
    }
}

fn build_matmul_program(
    output_shape: &[usize],
    a_shape: &[usize],
    b_shape: &[usize],
) -> Result<ShaderProgram, KernelError> {
    let ctx = CoordContext::new("rc", output_shape.len())?;
    let shared = a_shape[a_shape.len() - 1];
    let steps = i32::try_from(shared.div_ceil(2))
        .map_err(|_| KernelError::DimensionTooLarge(shared))?;

    let r = Expr::local("r");
    let c = Expr::local("c");
    let k2 = Expr::local("k").mul(Expr::Int(2));
    let (a, b) = (Expr::local("a"), Expr::local("b"));

    let step = vec![
        Stmt::let_(
            "a",
            Type::Vec4F,
            packed_sample(
                SAMPLERS[0],
                operand_index(&ctx, a_shape, r.clone(), k2.clone()),
            ),
        ),
        Stmt::let_(
            "b",
            Type::Vec4F,
            packed_sample(SAMPLERS[1], operand_index(&ctx, b_shape, k2, c.clone())),
        ),
        Stmt::assign(
            "acc",
            Expr::local("acc").add(
                a.clone()
                    .swizzle(A_LO)
                    .mul(b.clone().swizzle(B_LO))
                    .add(a.swizzle(A_HI).mul(b.swizzle(B_HI))),
            ),
        ),
    ];

    let row = ctx.row().unwrap_or(Expr::Int(0));
    let body = vec![
        ctx.declare(),
        Stmt::let_("r", Type::I32, row.mul(Expr::Int(2))),
        Stmt::let_("c", Type::I32, ctx.col().mul(Expr::Int(2))),
        Stmt::var("acc", Type::Vec4F, Expr::zero_vec4()),
        Stmt::ForRange {
            var: "k".to_string(),
            count: steps,
            body: step,
        },
        Stmt::Return(Expr::local("acc")),
    ];

    Ok(ShaderProgram {
        has_main: false,
        body,
    })
}
