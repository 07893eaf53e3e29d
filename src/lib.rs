//! Packed-tensor kernel generation for texture-backed inference.
//!
//! Tensors live in 2-D textures either unpacked (one element per texel) or
//! packed (a 2×2 block of the last two dimensions per RGBA texel). This crate
//! plans those layouts, synthesizes the Pack and packed MatMul kernels as
//! WGSL, and runs them on a CPU reference backend.
//!
//! - `shape`: broadcast shape rules and operand index mapping
//! - `layout`: packed/unpacked texture layouts
//! - `codegen`: shader IR, WGSL rendering and the shared template
//! - `ops`: the `TextureOperator` kernels
//! - `handler`: the `TextureHandler` backend contract and `CpuInferenceHandler`
//! - `validation`: naga validation of assembled modules

pub mod codegen;
pub mod error;
pub mod handler;
pub mod layout;
pub mod ops;
pub mod shape;
pub mod tensor;
pub mod validation;

pub use error::KernelError;
pub use handler::{CpuInferenceHandler, HandlerOptions, TextureData, TextureHandler};
pub use layout::{LayoutOptions, TextureLayout, packed_layout, unpacked_layout};
pub use ops::{MatMulPackedOp, PackOp, ProgramInfo, RunData, TextureOperator};
pub use shape::{broadcast_index, broadcast_shape};
pub use tensor::{DataType, Tensor, TensorId};
pub use validation::{ValidatedModule, validate_wgsl, validate_wgsl_with_context};
