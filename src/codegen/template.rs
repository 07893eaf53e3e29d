//! Shared WGSL runtime a synthesized kernel is spliced into.
//!
//! Provides what kernels assume to exist: one texture binding and one
//! `get_<sampler>` reader per input, `get_output_coords`, and (for kernels
//! without their own entry point) a fragment `main` calling `process`.
//! Address arithmetic mirrors `TextureLayout::texel_of` / `coords_of_texel`.

use crate::{error::KernelError, layout::TextureLayout, ops::ProgramInfo, shape};

use super::{
    coords::CoordsType,
    wgsl::{ENTRY_POINT, FRAG_COORD, PROCESS_FN, sampler_fn_name},
};

fn texture_var(sampler: &str) -> String {
    format!("tex_{sampler}")
}

/// `((base / stride) % dim)` per dimension, i.e. a row-major unravel.
fn unravel_terms(base: &str, dims: &[usize]) -> Vec<String> {
    dims.iter()
        .zip(shape::strides(dims))
        .map(|(dim, stride)| format!("(({base} / {stride}) % {dim})"))
        .collect()
}

/// `i0 * s0 + i1 * s1 + ...` over the given parameter positions.
fn linear_terms(params: std::ops::Range<usize>, dims: &[usize]) -> String {
    let terms: Vec<String> = params
        .zip(shape::strides(dims))
        .map(|(i, stride)| format!("i{i} * {stride}"))
        .collect();
    if terms.is_empty() {
        "0".to_string()
    } else {
        terms.join(" + ")
    }
}

fn build_output_coords_fn(layout: &TextureLayout) -> Result<String, KernelError> {
    let ty = CoordsType::for_rank(layout.rank().max(1))?.wgsl();

    let (setup, parts): (String, Vec<String>) = if layout.is_packed {
        if layout.rank() == 1 {
            (String::new(), vec!["texel.x".to_string()])
        } else {
            let block_rows = layout.block_rows();
            let mut parts = unravel_terms("batch", layout.batch_shape());
            parts.push(format!("(texel.y % {block_rows})"));
            parts.push("texel.x".to_string());
            (
                format!("    let batch = texel.y / {block_rows};\n"),
                parts,
            )
        }
    } else {
        let parts = if layout.rank() == 0 {
            vec!["0".to_string()]
        } else {
            unravel_terms("offset", &layout.shape)
        };
        (
            format!("    let offset = texel.y * {} + texel.x;\n", layout.width),
            parts,
        )
    };

    let value = if parts.len() == 1 {
        parts.join("")
    } else {
        format!("{ty}({})", parts.join(", "))
    };

    Ok(format!(
        "fn get_output_coords({FRAG_COORD}: vec4<f32>) -> {ty} {{\n    let texel = vec2<i32>({FRAG_COORD}.xy);\n{setup}    return {value};\n}}\n"
    ))
}

fn build_sampler_fn(sampler: &str, layout: &TextureLayout) -> String {
    let rank = layout.rank();
    let params = (0..rank)
        .map(|i| format!("i{i}: i32"))
        .collect::<Vec<_>>()
        .join(", ");
    let tex = texture_var(sampler);
    let name = sampler_fn_name(sampler);

    if layout.is_packed {
        let (x, y) = if rank == 1 {
            ("i0 / 2".to_string(), "0".to_string())
        } else {
            let batch = linear_terms(0..rank - 2, layout.batch_shape());
            (
                format!("i{} / 2", rank - 1),
                format!("({batch}) * {} + i{} / 2", layout.block_rows(), rank - 2),
            )
        };
        format!(
            "fn {name}({params}) -> vec4<f32> {{\n    let x = {x};\n    let y = {y};\n    return textureLoad({tex}, vec2<i32>(x, y), 0);\n}}\n"
        )
    } else {
        let offset = linear_terms(0..rank, &layout.shape);
        let width = layout.width.max(1);
        format!(
            "fn {name}({params}) -> f32 {{\n    let offset = {offset};\n    return textureLoad({tex}, vec2<i32>(offset % {width}, offset / {width}), 0).x;\n}}\n"
        )
    }
}

/// Assemble a complete fragment-stage WGSL module for a program.
pub fn assemble_module(info: &ProgramInfo) -> Result<String, KernelError> {
    let mut out = String::new();

    for (binding, sampler) in info.samplers.iter().enumerate() {
        out.push_str(&format!(
            "@group(0) @binding({binding})\nvar {}: texture_2d<f32>;\n\n",
            texture_var(sampler)
        ));
    }

    out.push_str(&build_output_coords_fn(&info.output_layout)?);
    out.push('\n');

    for (sampler, layout) in info.samplers.iter().zip(&info.input_layouts) {
        out.push_str(&build_sampler_fn(sampler, layout));
        out.push('\n');
    }

    out.push_str(&info.shader_source);

    if !info.has_main {
        out.push_str(&format!(
            "\n@fragment\nfn {ENTRY_POINT}(@builtin(position) {FRAG_COORD}: vec4<f32>) -> @location(0) vec4<f32> {{\n    return {PROCESS_FN}({FRAG_COORD});\n}}\n"
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{packed_layout, unpacked_layout};

    #[test]
    fn packed_output_coords_unravel_batches() {
        let layout = packed_layout(&[2, 3, 5]).unwrap();
        let text = build_output_coords_fn(&layout).unwrap();
        assert!(text.contains("-> vec3<i32>"));
        assert!(text.contains("let batch = texel.y / 2;"));
        assert!(text.contains("return vec3<i32>(((batch / 1) % 2), (texel.y % 2), texel.x);"));
    }

    #[test]
    fn vector_output_coords_are_scalar() {
        let layout = packed_layout(&[7]).unwrap();
        let text = build_output_coords_fn(&layout).unwrap();
        assert!(text.contains("-> i32"));
        assert!(text.contains("return texel.x;"));
    }

    #[test]
    fn packed_sampler_addresses_block() {
        let text = build_sampler_fn("B", &packed_layout(&[4, 3, 2]).unwrap());
        assert!(text.starts_with("fn get_B(i0: i32, i1: i32, i2: i32) -> vec4<f32> {"));
        assert!(text.contains("let x = i2 / 2;"));
        assert!(text.contains("let y = (i0 * 1) * 2 + i1 / 2;"));
        assert!(text.contains("textureLoad(tex_B, vec2<i32>(x, y), 0)"));
    }

    #[test]
    fn unpacked_sampler_reads_red_channel() {
        let text = build_sampler_fn("A", &unpacked_layout(&[3, 3]));
        assert!(text.contains("let offset = i0 * 3 + i1 * 1;"));
        assert!(text.contains("vec2<i32>(offset % 3, offset / 3), 0).x;"));
    }
}
