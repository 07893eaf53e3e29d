//! Every synthesized program, spliced into the shared template, must parse as
//! WGSL and pass the naga validator.

use packed_tensor_kernels::{
    CpuInferenceHandler, MatMulPackedOp, PackOp, Tensor, TextureOperator,
    codegen::assemble_module, validate_wgsl, validate_wgsl_with_context,
    validation::validate_program,
};

fn assert_valid(op: &dyn TextureOperator, inputs: &[Tensor]) -> String {
    let handler = CpuInferenceHandler::new();
    let info = op.create_program_info(&handler, inputs).unwrap();
    let module = assemble_module(&info).unwrap();
    if let Err(e) = validate_wgsl(&module) {
        let shapes: Vec<&[usize]> = inputs.iter().map(Tensor::dims).collect();
        panic!("{} over {shapes:?}: {e:#}", op.name());
    }
    module
}

#[test]
fn pack_programs_validate_for_every_rank() {
    let shapes: [&[usize]; 6] = [
        &[5],
        &[3, 3],
        &[2, 3, 5],
        &[2, 1, 4, 3],
        &[1, 2, 2, 3, 3],
        &[2, 1, 1, 2, 2, 3],
    ];
    for dims in shapes {
        assert_valid(&PackOp, &[Tensor::iota(dims.to_vec())]);
    }
}

#[test]
fn matmul_programs_validate_for_every_rank() {
    let cases: [(&[usize], &[usize]); 5] = [
        (&[3, 5], &[5, 2]),
        (&[2, 3, 4], &[4, 5]),
        (&[2, 1, 3, 4], &[3, 4, 1]),
        (&[1, 2, 2, 3, 3], &[3, 3]),
        (&[2, 1, 1, 2, 2, 3], &[1, 2, 1, 2, 3, 2]),
    ];
    for (a, b) in cases {
        assert_valid(
            &MatMulPackedOp,
            &[Tensor::iota(a.to_vec()), Tensor::iota(b.to_vec())],
        );
    }
}

#[test]
fn matmul_module_wraps_process_in_entry_point() {
    let module = assert_valid(
        &MatMulPackedOp,
        &[Tensor::iota(vec![2, 2]), Tensor::iota(vec![2, 2])],
    );
    assert!(module.contains("@group(0) @binding(0)\nvar tex_A: texture_2d<f32>;"));
    assert!(module.contains("@group(0) @binding(1)\nvar tex_B: texture_2d<f32>;"));
    assert!(module.contains("fn get_A(i0: i32, i1: i32) -> vec4<f32> {"));
    assert!(module.contains("fn process(frag_coord: vec4<f32>) -> vec4<f32> {"));
    assert!(module.contains("    return process(frag_coord);\n"));
}

#[test]
fn pack_module_brings_its_own_entry_point() {
    let module = assert_valid(&PackOp, &[Tensor::iota(vec![3, 3])]);
    assert_eq!(module.matches("@fragment").count(), 1);
    assert!(module.contains("fn get_A(i0: i32, i1: i32) -> f32 {"));
    assert!(!module.contains("fn process("));
}

#[test]
fn validate_program_names_the_kernel() {
    let handler = CpuInferenceHandler::new();
    let mut info = PackOp
        .create_program_info(&handler, &[Tensor::iota(vec![2, 2])])
        .unwrap();
    let validated = validate_program(&info, "Pack").unwrap();
    assert_eq!(validated.module.entry_points[0].name, "main");

    info.shader_source.push_str("fn broken( {\n");
    let err = validate_program(&info, "Pack").unwrap_err();
    assert!(format!("{err:#}").contains("Pack generated invalid WGSL"));
    assert!(validate_wgsl_with_context(&info.shader_source, "Pack").is_err());
}
