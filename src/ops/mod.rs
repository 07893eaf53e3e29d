//! Texture operators: kernels that synthesize a program and bind its inputs.

pub mod matmul_pack;
pub mod pack;

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;

use crate::{
    codegen::ir::ShaderProgram,
    error::KernelError,
    handler::{TextureData, TextureHandler},
    layout::TextureLayout,
    tensor::{DataType, Tensor},
};

pub use matmul_pack::MatMulPackedOp;
pub use pack::PackOp;

/// Everything a backend needs to compile and dispatch one kernel.
#[derive(Clone, Debug)]
pub struct ProgramInfo {
    /// One layout per input, in sampler order.
    pub input_layouts: Vec<TextureLayout>,
    pub output_layout: TextureLayout,
    /// Sampler names, one per input. `get_<name>` reads that input.
    pub samplers: Vec<String>,
    /// WGSL rendered from `program`.
    pub shader_source: String,
    pub program: ShaderProgram,
    pub is_inputs_packed: bool,
    pub is_output_packed: bool,
    /// True when `shader_source` defines the entry point itself rather than
    /// a `process` function for the shared template.
    pub has_main: bool,
}

/// Texture bindings for one execution of a program.
#[derive(Debug)]
pub struct RunData {
    pub input_texture_datas: Vec<Arc<TextureData>>,
    pub output_texture_data: TextureData,
    pub uniform_data: BTreeMap<String, f32>,
}

/// A kernel the texture backend can synthesize and run.
pub trait TextureOperator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesize the program for these inputs. Pure: touches no textures.
    fn create_program_info(
        &self,
        handler: &dyn TextureHandler,
        inputs: &[Tensor],
    ) -> Result<ProgramInfo, KernelError>;

    /// Materialize input textures under the program's layouts and allocate
    /// the output texture.
    fn create_run_data(
        &self,
        handler: &dyn TextureHandler,
        program_info: &ProgramInfo,
        inputs: &[Tensor],
    ) -> Result<RunData>;

    /// Programs depend only on the operator and the input shapes.
    fn cache_key(&self, inputs: &[Tensor]) -> String {
        let shapes: Vec<&[usize]> = inputs.iter().map(Tensor::dims).collect();
        format!("{}:{shapes:?}", self.name())
    }

    fn run(&self, handler: &dyn TextureHandler, inputs: &[Tensor]) -> Result<Vec<Tensor>>
    where
        Self: Sized,
    {
        handler.run(self, inputs)
    }
}

/// Shared `create_run_data` body: every input under its declared layout, an
/// output typed after the first input, no uniforms.
pub(crate) fn bind_inputs(
    handler: &dyn TextureHandler,
    program_info: &ProgramInfo,
    inputs: &[Tensor],
) -> Result<RunData> {
    let input_texture_datas = inputs
        .iter()
        .zip(&program_info.input_layouts)
        .map(|(tensor, layout)| handler.get_or_create_texture_data(tensor, layout))
        .collect::<Result<Vec<_>>>()?;
    let dtype = input_texture_datas
        .first()
        .map(|td| td.dtype)
        .unwrap_or(DataType::Float32);
    Ok(RunData {
        output_texture_data: handler
            .create_texture_data_from_layout(&program_info.output_layout, dtype),
        input_texture_datas,
        uniform_data: BTreeMap::new(),
    })
}

pub(crate) fn check_input_count(
    op: &'static str,
    inputs: &[Tensor],
    expected: usize,
) -> Result<(), KernelError> {
    if inputs.len() != expected {
        return Err(KernelError::InvalidInputCount {
            op,
            expected,
            actual: inputs.len(),
        });
    }
    Ok(())
}
