//! End-to-end Pack kernel behaviour on the CPU handler.

use std::sync::Arc;

use packed_tensor_kernels::{
    CpuInferenceHandler, KernelError, PackOp, Tensor, TextureData, TextureHandler,
    TextureOperator, packed_layout,
};

fn pack(handler: &CpuInferenceHandler, tensor: &Tensor) -> Arc<TextureData> {
    let layout = handler
        .get_or_create_texture_layout(tensor, 4, true)
        .unwrap();
    handler.get_or_create_texture_data(tensor, &layout).unwrap()
}

fn texels(data: &TextureData) -> Vec<[f32; 4]> {
    let mut out = Vec::new();
    for y in 0..data.layout.height {
        for x in 0..data.layout.width {
            out.push(data.texel(x, y).unwrap());
        }
    }
    out
}

#[test]
fn packs_odd_matrix_with_zero_fill() {
    let handler = CpuInferenceHandler::new();
    let tensor = Tensor::iota(vec![3, 3]);
    let data = pack(&handler, &tensor);

    assert_eq!((data.layout.width, data.layout.height), (2, 2));
    assert_eq!(
        texels(&data),
        vec![
            [1.0, 2.0, 4.0, 5.0],
            [3.0, 0.0, 6.0, 0.0],
            [7.0, 8.0, 0.0, 0.0],
            [9.0, 0.0, 0.0, 0.0],
        ]
    );
    assert_eq!(data.tensor_id, Some(tensor.id()));
}

#[test]
fn run_returns_logical_tensor() {
    let handler = CpuInferenceHandler::new();
    let tensor = Tensor::iota(vec![3, 5]);
    let out = PackOp.run(&handler, &[tensor.clone()]).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dims(), &[3, 5]);
    assert_eq!(out[0].data(), tensor.data());
}

#[test]
fn packs_vector_into_two_channels() {
    let handler = CpuInferenceHandler::new();
    let tensor = Tensor::iota(vec![5]);
    let data = pack(&handler, &tensor);

    assert_eq!(data.layout, packed_layout(&[5]).unwrap());
    assert_eq!(
        texels(&data),
        vec![
            [1.0, 2.0, 0.0, 0.0],
            [3.0, 4.0, 0.0, 0.0],
            [5.0, 0.0, 0.0, 0.0],
        ]
    );
    assert_eq!(data.to_tensor().unwrap().data(), tensor.data());
}

#[test]
fn packs_batches_stacked_vertically() {
    let handler = CpuInferenceHandler::new();
    let tensor = Tensor::iota(vec![2, 3, 2]);
    let data = pack(&handler, &tensor);

    // Each batch owns ceil(3/2) = 2 texel rows.
    assert_eq!((data.layout.width, data.layout.height), (1, 4));
    assert_eq!(
        texels(&data),
        vec![
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 0.0, 0.0],
            [7.0, 8.0, 9.0, 10.0],
            [11.0, 12.0, 0.0, 0.0],
        ]
    );
    assert_eq!(data.to_tensor().unwrap().data(), tensor.data());
}

#[test]
fn rejects_wrong_input_count() {
    let handler = CpuInferenceHandler::new();
    let a = Tensor::iota(vec![2, 2]);

    let err = PackOp.create_program_info(&handler, &[]).unwrap_err();
    assert_eq!(
        err,
        KernelError::InvalidInputCount {
            op: "Pack",
            expected: 1,
            actual: 0
        }
    );

    let err = PackOp
        .run(&handler, &[a.clone(), a])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<KernelError>(),
        Some(KernelError::InvalidInputCount { actual: 2, .. })
    ));
    assert_eq!(handler.cached_texture_count(), 0);
}

#[test]
fn program_descriptor_flags() {
    let handler = CpuInferenceHandler::new();
    let info = PackOp
        .create_program_info(&handler, &[Tensor::iota(vec![4, 4])])
        .unwrap();
    assert!(!info.is_inputs_packed);
    assert!(info.is_output_packed);
    assert!(info.has_main);
    assert_eq!(info.samplers, vec!["A".to_string()]);
    assert!(!info.input_layouts[0].is_packed);
    assert_eq!(info.output_layout, packed_layout(&[4, 4]).unwrap());
}

#[test]
fn scalar_tensors_cannot_be_packed() {
    let handler = CpuInferenceHandler::new();
    let scalar = Tensor::new(vec![], vec![1.0]).unwrap();
    let err = PackOp.create_program_info(&handler, &[scalar]).unwrap_err();
    assert_eq!(err, KernelError::UnsupportedRank(0));
}
