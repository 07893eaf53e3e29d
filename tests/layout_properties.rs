//! Layout planner and broadcast rules, checked over generated shapes.

use std::collections::HashSet;

use packed_tensor_kernels::{
    CpuInferenceHandler, KernelError, Tensor, TextureHandler, broadcast_index, broadcast_shape,
    packed_layout, shape, unpacked_layout,
};
use proptest::prelude::*;

fn dims(max_rank: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..6, 1..=max_rank)
}

proptest! {
    #[test]
    fn packed_layout_covers_shape(shape in dims(6)) {
        let layout = packed_layout(&shape).unwrap();
        let rank = shape.len();
        prop_assert_eq!(layout.channels, 4);
        prop_assert!(layout.width * 2 >= shape[rank - 1]);
        if rank >= 2 {
            prop_assert!(layout.block_rows() * 2 >= shape[rank - 2]);
            let batch: usize = shape[..rank - 2].iter().product();
            prop_assert_eq!(layout.height, batch * layout.block_rows());
        } else {
            prop_assert_eq!(layout.height, 1);
        }
    }

    #[test]
    fn every_element_has_its_own_slot(shape in dims(5)) {
        let layout = packed_layout(&shape).unwrap();
        let mut seen = HashSet::new();
        for offset in 0..shape::size(&shape) {
            let index = shape::unravel(offset, &shape);
            let (x, y, ch) = layout.texel_of(&index).unwrap();
            prop_assert!(x < layout.width && y < layout.height && ch < 4);
            prop_assert!(seen.insert((x, y, ch)));
            // the texel's block origin is what the kernel sees as its coords
            let coords = layout.coords_of_texel(x, y).unwrap();
            let rank = shape.len();
            prop_assert_eq!(coords[rank - 1], index[rank - 1] / 2);
        }
    }

    #[test]
    fn pack_then_unpack_recovers_tensor(shape in dims(4)) {
        let handler = CpuInferenceHandler::new();
        let tensor = Tensor::iota(shape.clone());
        let layout = handler
            .get_or_create_texture_layout(&tensor, 4, true)
            .unwrap();
        let data = handler
            .get_or_create_texture_data(&tensor, &layout)
            .unwrap();
        let back = data.to_tensor().unwrap();
        prop_assert_eq!(back.dims(), tensor.dims());
        prop_assert_eq!(back.data(), tensor.data());
    }

    #[test]
    fn unpacked_layout_is_row_major(shape in dims(4)) {
        let layout = unpacked_layout(&shape);
        for offset in 0..shape::size(&shape) {
            let index = shape::unravel(offset, &shape);
            let (x, y, ch) = layout.texel_of(&index).unwrap();
            prop_assert_eq!((y * layout.width + x, ch), (offset, 0));
        }
    }

    #[test]
    fn broadcast_is_symmetric_and_dominates(a in dims(4), b in dims(4)) {
        match (broadcast_shape(&a, &b, false), broadcast_shape(&b, &a, false)) {
            (Ok(ab), Ok(ba)) => {
                prop_assert_eq!(&ab, &ba);
                prop_assert_eq!(ab.len(), a.len().max(b.len()));
                for operand in [&a, &b] {
                    let offset = ab.len() - operand.len();
                    for (i, &d) in operand.iter().enumerate() {
                        prop_assert!(d == 1 || d == ab[i + offset]);
                    }
                }
            }
            (Err(e1), Err(e2)) => {
                let is_shape_error =
                    |e: &KernelError| matches!(e, KernelError::IncompatibleShapes { .. });
                prop_assert!(is_shape_error(&e1));
                prop_assert!(is_shape_error(&e2));
            }
            _ => prop_assert!(false, "broadcast must not depend on operand order"),
        }
    }

    #[test]
    fn broadcast_index_stays_in_operand(a in dims(4), b in dims(4), seed in any::<u64>()) {
        if let Ok(out) = broadcast_shape(&a, &b, false) {
            let offset = (seed as usize) % shape::size(&out);
            let index = shape::unravel(offset, &out);
            for operand in [&a, &b] {
                let mapped = broadcast_index(&index, operand, false);
                prop_assert_eq!(mapped.len(), operand.len());
                prop_assert!(mapped.iter().zip(operand.iter()).all(|(i, d)| i < d));
            }
        }
    }
}

#[test]
fn broadcast_reference_examples() {
    assert_eq!(broadcast_shape(&[4, 1, 3], &[1, 5, 3], false).unwrap(), vec![4, 5, 3]);
    assert!(matches!(
        broadcast_shape(&[2, 3], &[5], false),
        Err(KernelError::IncompatibleShapes { .. })
    ));
    assert_eq!(broadcast_shape(&[2, 3, 4], &[4, 5], true).unwrap(), vec![2, 3, 5]);
    assert!(matches!(
        broadcast_shape(&[2, 3], &[5, 6], true),
        Err(KernelError::IncompatibleContractionDim { .. })
    ));
}
