//! Shape arithmetic and NumPy-style broadcasting.

use crate::error::KernelError;

/// Number of elements in a shape. A rank-0 shape holds one element.
pub fn size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut out = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        out[i] = out[i + 1] * shape[i + 1];
    }
    out
}

/// Row-major multi-index of a linear offset.
pub fn unravel(mut offset: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, &dim) in index.iter_mut().zip(shape).rev() {
        if dim > 0 {
            *slot = offset % dim;
            offset /= dim;
        }
    }
    index
}

/// Dimension `i` counted from the right (0 = last); missing leading dims are 1.
fn dim_from_right(shape: &[usize], i: usize) -> usize {
    if i < shape.len() {
        shape[shape.len() - 1 - i]
    } else {
        1
    }
}

/// Broadcast output shape of two operands.
///
/// With `is_mat_mul` the last two dimensions follow matrix-multiply rules
/// (`[.., m, k] x [.., k, n] -> [.., m, n]`) and only the leading batch
/// dimensions broadcast elementwise.
pub fn broadcast_shape(
    a: &[usize],
    b: &[usize],
    is_mat_mul: bool,
) -> Result<Vec<usize>, KernelError> {
    let incompatible = || KernelError::IncompatibleShapes {
        a: a.to_vec(),
        b: b.to_vec(),
    };

    if !is_mat_mul {
        if a.is_empty() {
            return Ok(b.to_vec());
        }
        if b.is_empty() {
            return Ok(a.to_vec());
        }
    }

    let out_rank = a.len().max(b.len());
    let mut out = vec![0; out_rank];
    let mut elementwise_from = 0;

    if is_mat_mul {
        if a.len() < 2 || b.len() < 2 {
            return Err(incompatible());
        }
        let (a_m, a_k) = (a[a.len() - 2], a[a.len() - 1]);
        let (b_k, b_n) = (b[b.len() - 2], b[b.len() - 1]);
        if a_k != b_k {
            return Err(KernelError::IncompatibleContractionDim {
                a: a.to_vec(),
                b: b.to_vec(),
                a_k,
                b_k,
            });
        }
        out[out_rank - 2] = a_m;
        out[out_rank - 1] = b_n;
        elementwise_from = 2;
    }

    for i in elementwise_from..out_rank {
        let a_len = dim_from_right(a, i);
        let b_len = dim_from_right(b, i);
        out[out_rank - 1 - i] = match (a_len, b_len) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(incompatible()),
        };
    }

    Ok(out)
}

/// Where one operand index component comes from when reading a broadcast
/// operand at a given output index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimSource {
    /// Copied from the output index component at this position.
    Output(usize),
    /// Size-1 operand dimension: always read at 0.
    Zero,
    /// Matmul row/col/contraction component, supplied by the kernel itself.
    Kernel,
}

/// Per-dimension source of an operand index, given the output rank.
///
/// This is the single broadcasting decision shared by the host-side mapping
/// (`broadcast_index`) and the matmul shader synthesizer.
pub fn broadcast_sources(
    output_rank: usize,
    operand_shape: &[usize],
    is_mat_mul: bool,
) -> Vec<DimSource> {
    let rank = operand_shape.len();
    let offset = output_rank.saturating_sub(rank);
    operand_shape
        .iter()
        .enumerate()
        .map(|(i, &dim)| {
            if is_mat_mul && i + 2 >= rank {
                DimSource::Kernel
            } else if dim == 1 {
                DimSource::Zero
            } else {
                DimSource::Output(i + offset)
            }
        })
        .collect()
}

/// Map an output index to the index it reads in a broadcast operand.
///
/// Matmul row/column/contraction components (the trailing two) are left at 0
/// for the caller to fill.
pub fn broadcast_index(
    output_index: &[usize],
    operand_shape: &[usize],
    is_mat_mul: bool,
) -> Vec<usize> {
    broadcast_sources(output_index.len(), operand_shape, is_mat_mul)
        .into_iter()
        .map(|src| match src {
            DimSource::Output(i) => output_index[i],
            DimSource::Zero | DimSource::Kernel => 0,
        })
        .collect()
}
