//! Checks assembled kernel modules with naga in two stages.
//!
//! The WGSL front end lowers the text to a `naga::Module`, then the IR
//! validator resolves types, uniformity and entry-point interfaces. A module
//! that only parses can still be rejected by a driver, so both stages run.

use anyhow::{Context, Result, anyhow};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

use crate::{codegen::template::assemble_module, ops::ProgramInfo};

/// A module that passed both naga stages.
#[derive(Debug)]
pub struct ValidatedModule {
    pub module: naga::Module,
    pub info: ModuleInfo,
}

/// Parse `source` as WGSL and run the naga validator over the result.
///
/// Kernels target baseline WebGPU, so no optional capabilities are enabled.
/// Errors carry the numbered source.
pub fn validate_wgsl(source: &str) -> Result<ValidatedModule> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL parse failed: {e}\n{}", numbered_source(source)))?;
    let info = Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| {
            anyhow!(
                "WGSL module rejected by validator: {:?}\n{}",
                e.into_inner(),
                numbered_source(source)
            )
        })?;
    Ok(ValidatedModule { module, info })
}

/// [`validate_wgsl`], naming the kernel that generated `source`.
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<ValidatedModule> {
    validate_wgsl(source).with_context(|| format!("{context} generated invalid WGSL"))
}

/// Splice a program into the runtime template and validate the module.
pub fn validate_program(info: &ProgramInfo, context: &str) -> Result<ValidatedModule> {
    let module = assemble_module(info)?;
    validate_wgsl_with_context(&module, context)
}

fn numbered_source(source: &str) -> String {
    let mut out = String::from("---\n");
    for (i, line) in source.lines().enumerate() {
        out.push_str(&format!("{:4} | {line}\n", i + 1));
    }
    out.push_str("---");
    out
}
