//! Texture layouts: how a logical tensor maps onto 2-D texel storage.
//!
//! Unpacked layouts store one element per single-channel texel. Packed
//! layouts store a 2×2 block of the last two logical dimensions per RGBA
//! texel, in row-major block order:
//!
//! | channel | element      |
//! |---------|--------------|
//! | 0 (x)   | `(r,   c)`   |
//! | 1 (y)   | `(r,   c+1)` |
//! | 2 (z)   | `(r+1, c)`   |
//! | 3 (w)   | `(r+1, c+1)` |
//!
//! Batch dimensions stay unpacked: each batch owns `ceil(rows/2)` texel rows
//! and batches are stacked vertically. Rank-1 tensors pack pairs into
//! channels 0-1 of a single texel row and leave channels 2-3 at zero.

use serde::{Deserialize, Serialize};

use crate::{codegen::ir::Expr, error::KernelError, shape};

pub const PACKED_CHANNELS: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutOptions {
    pub is_packed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureLayout {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub is_packed: bool,
    /// Logical shape the texel addressing is computed from.
    pub shape: Vec<usize>,
    /// Row-major strides of `shape`.
    pub strides: Vec<usize>,
    /// Shape the tensor was declared with; equal to `shape` unless the
    /// caller reinterprets storage.
    pub declared_shape: Vec<usize>,
}

/// One of the (at most two) axes folded into a packed texel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedAxis {
    /// Position of the axis in the logical shape.
    pub dim: usize,
    /// Logical size of the axis.
    pub size: usize,
}

impl PackedAxis {
    /// True when the second half of block `block` lies outside the tensor.
    pub fn is_edge(&self, block: usize) -> bool {
        block * 2 + 1 >= self.size
    }

    /// Shader form of [`Self::is_edge`], given the block's first logical
    /// coordinate (`block * 2`).
    pub fn edge_flag(&self, base: Expr) -> Result<Expr, KernelError> {
        Ok(base.add(Expr::Int(1)).ge(self.size_literal()?))
    }

    /// True in shader code when the whole block starts past the tensor.
    pub fn out_of_bounds(&self, base: Expr) -> Result<Expr, KernelError> {
        Ok(base.ge(self.size_literal()?))
    }

    fn size_literal(&self) -> Result<Expr, KernelError> {
        i32::try_from(self.size)
            .map(Expr::Int)
            .map_err(|_| KernelError::DimensionTooLarge(self.size))
    }
}

impl TextureLayout {
    /// Layout for `shape` with the given channel count and options.
    ///
    /// Packed layouts always use four channels; unpacked layouts are
    /// single-channel.
    pub fn from_shape(
        shape: &[usize],
        channels: usize,
        declared_shape: &[usize],
        options: LayoutOptions,
    ) -> Result<Self, KernelError> {
        let layout = if options.is_packed {
            if channels != PACKED_CHANNELS {
                return Err(KernelError::UnsupportedChannels {
                    channels,
                    is_packed: true,
                });
            }
            packed_layout(shape)?
        } else {
            if channels != 1 {
                return Err(KernelError::UnsupportedChannels {
                    channels,
                    is_packed: false,
                });
            }
            unpacked_layout(shape)
        };
        Ok(Self {
            declared_shape: declared_shape.to_vec(),
            ..layout
        })
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn texel_count(&self) -> usize {
        self.width * self.height
    }

    /// Length of a flat `f32` buffer holding every channel of every texel.
    pub fn storage_len(&self) -> usize {
        self.texel_count() * self.channels
    }

    /// Packed texel rows per batch (`ceil(rows / 2)`), 1 for rank 1.
    pub fn block_rows(&self) -> usize {
        if self.rank() >= 2 {
            self.shape[self.rank() - 2].div_ceil(2)
        } else {
            1
        }
    }

    /// Leading dimensions that stay unpacked in a packed layout.
    pub fn batch_shape(&self) -> &[usize] {
        &self.shape[..self.rank().saturating_sub(2)]
    }

    /// Axes folded into packed texels: `[row, col]` for rank ≥ 2, the only
    /// axis for rank 1. Empty for unpacked layouts.
    pub fn packed_axes(&self) -> Vec<PackedAxis> {
        if !self.is_packed {
            return Vec::new();
        }
        let rank = self.rank();
        (rank.saturating_sub(2)..rank)
            .map(|dim| PackedAxis {
                dim,
                size: self.shape[dim],
            })
            .collect()
    }

    /// Texel `(x, y)` and channel holding the element at a logical index,
    /// or `None` if the index is outside the tensor.
    pub fn texel_of(&self, index: &[usize]) -> Option<(usize, usize, usize)> {
        if index.len() != self.rank() || index.iter().zip(&self.shape).any(|(i, d)| i >= d) {
            return None;
        }
        if !self.is_packed {
            let offset: usize = index.iter().zip(&self.strides).map(|(i, s)| i * s).sum();
            return Some((offset % self.width, offset / self.width, 0));
        }
        let rank = self.rank();
        if rank == 1 {
            return Some((index[0] / 2, 0, index[0] % 2));
        }
        let (r, c) = (index[rank - 2], index[rank - 1]);
        let batch = self.batch_shape();
        let batch_linear: usize = index[..rank - 2]
            .iter()
            .zip(shape::strides(batch))
            .map(|(i, s)| i * s)
            .sum();
        Some((
            c / 2,
            batch_linear * self.block_rows() + r / 2,
            (r % 2) * 2 + c % 2,
        ))
    }

    /// Output coordinates a kernel sees for texel `(x, y)`: the logical index
    /// for unpacked layouts, `(batch.., blockRow, blockCol)` for packed ones.
    pub fn coords_of_texel(&self, x: usize, y: usize) -> Option<Vec<usize>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        if !self.is_packed {
            let offset = y * self.width + x;
            if offset >= shape::size(&self.shape) {
                return None;
            }
            return Some(shape::unravel(offset, &self.shape));
        }
        if self.rank() == 1 {
            return Some(vec![x]);
        }
        let block_rows = self.block_rows();
        let mut coords = shape::unravel(y / block_rows, self.batch_shape());
        coords.push(y % block_rows);
        coords.push(x);
        Some(coords)
    }

    /// Gather the logical tensor, row-major, out of flat texel storage.
    pub fn read_logical(&self, storage: &[f32]) -> Option<Vec<f32>> {
        (0..shape::size(&self.shape))
            .map(|offset| {
                let (x, y, ch) = self.texel_of(&shape::unravel(offset, &self.shape))?;
                storage
                    .get((y * self.width + x) * self.channels + ch)
                    .copied()
            })
            .collect()
    }
}

/// Plan the packed (RGBA, 2×2 block) layout of a logical shape.
pub fn packed_layout(shape: &[usize]) -> Result<TextureLayout, KernelError> {
    let rank = shape.len();
    if let Some(&dim) = shape.iter().find(|&&d| i32::try_from(d).is_err()) {
        return Err(KernelError::DimensionTooLarge(dim));
    }
    let (width, height) = match rank {
        0 => return Err(KernelError::UnsupportedRank(0)),
        1 => (shape[0].div_ceil(2), 1),
        _ => {
            let batch: usize = shape::size(&shape[..rank - 2]);
            (
                shape[rank - 1].div_ceil(2),
                batch * shape[rank - 2].div_ceil(2),
            )
        }
    };
    Ok(TextureLayout {
        width,
        height,
        channels: PACKED_CHANNELS,
        is_packed: true,
        shape: shape.to_vec(),
        strides: shape::strides(shape),
        declared_shape: shape.to_vec(),
    })
}

/// Plan the single-channel layout: the last dimension spans the width and
/// every leading dimension folds into the height.
pub fn unpacked_layout(shape: &[usize]) -> TextureLayout {
    let (width, height) = match shape.split_last() {
        None => (1, 1),
        Some((&last, rest)) => (last, shape::size(rest)),
    };
    TextureLayout {
        width,
        height,
        channels: 1,
        is_packed: false,
        shape: shape.to_vec(),
        strides: shape::strides(shape),
        declared_shape: shape.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_3x3_is_2x2_texels() {
        let layout = packed_layout(&[3, 3]).unwrap();
        assert_eq!((layout.width, layout.height, layout.channels), (2, 2, 4));
        assert_eq!(layout.texel_of(&[0, 1]), Some((0, 0, 1)));
        assert_eq!(layout.texel_of(&[1, 0]), Some((0, 0, 2)));
        assert_eq!(layout.texel_of(&[2, 2]), Some((1, 1, 0)));
        assert_eq!(layout.texel_of(&[3, 0]), None);
    }

    #[test]
    fn packed_batches_stack_vertically() {
        let layout = packed_layout(&[2, 3, 5]).unwrap();
        assert_eq!((layout.width, layout.height), (3, 4));
        assert_eq!(layout.texel_of(&[1, 2, 4]), Some((2, 3, 0)));
        assert_eq!(layout.texel_of(&[1, 1, 3]), Some((1, 2, 3)));
        assert_eq!(layout.coords_of_texel(2, 3), Some(vec![1, 1, 2]));
        assert_eq!(layout.coords_of_texel(3, 0), None);
    }

    #[test]
    fn packed_vector_uses_two_channels() {
        let layout = packed_layout(&[5]).unwrap();
        assert_eq!((layout.width, layout.height), (3, 1));
        assert_eq!(layout.texel_of(&[4]), Some((2, 0, 0)));
        assert_eq!(layout.texel_of(&[3]), Some((1, 0, 1)));
        assert_eq!(layout.coords_of_texel(1, 0), Some(vec![1]));
    }

    #[test]
    fn scalar_cannot_be_packed() {
        assert_eq!(packed_layout(&[]), Err(KernelError::UnsupportedRank(0)));
    }

    #[test]
    fn edge_flags_mark_odd_tails() {
        let layout = packed_layout(&[3, 4]).unwrap();
        let axes = layout.packed_axes();
        assert_eq!(axes, vec![PackedAxis { dim: 0, size: 3 }, PackedAxis { dim: 1, size: 4 }]);
        assert!(!axes[0].is_edge(0));
        assert!(axes[0].is_edge(1));
        assert!(!axes[1].is_edge(1));
    }

    #[test]
    fn oversized_dims_are_rejected() {
        let huge = i32::MAX as usize + 1;
        assert_eq!(
            packed_layout(&[2, huge]),
            Err(KernelError::DimensionTooLarge(huge))
        );
        let axis = PackedAxis { dim: 0, size: huge };
        assert_eq!(
            axis.edge_flag(Expr::local("r")),
            Err(KernelError::DimensionTooLarge(huge))
        );
        assert!(axis.out_of_bounds(Expr::local("r")).is_err());
        let axis = PackedAxis { dim: 0, size: 3 };
        assert_eq!(
            axis.out_of_bounds(Expr::local("r")),
            Ok(Expr::local("r").ge(Expr::Int(3)))
        );
    }

    #[test]
    fn unpacked_layout_is_row_major() {
        let layout = unpacked_layout(&[2, 3, 4]);
        assert_eq!((layout.width, layout.height, layout.channels), (4, 6, 1));
        assert_eq!(layout.texel_of(&[1, 2, 3]), Some((3, 5, 0)));
        assert_eq!(layout.coords_of_texel(3, 5), Some(vec![1, 2, 3]));
        assert!(layout.packed_axes().is_empty());
    }

    #[test]
    fn from_shape_checks_channels() {
        let opts = LayoutOptions { is_packed: true };
        assert!(TextureLayout::from_shape(&[2, 2], 4, &[2, 2], opts).is_ok());
        assert_eq!(
            TextureLayout::from_shape(&[2, 2], 1, &[2, 2], opts),
            Err(KernelError::UnsupportedChannels {
                channels: 1,
                is_packed: true
            })
        );
        let declared =
            TextureLayout::from_shape(&[4], 1, &[2, 2], LayoutOptions::default()).unwrap();
        assert_eq!(declared.declared_shape, vec![2, 2]);
        assert_eq!(declared.shape, vec![4]);
    }

    #[test]
    fn read_logical_gathers_packed_storage() {
        let layout = packed_layout(&[1, 3]).unwrap();
        // texel 0: (0,0) (0,1) pad pad; texel 1: (0,2) pad pad pad
        let storage = [1.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0];
        assert_eq!(layout.read_logical(&storage), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(layout.read_logical(&storage[..4]), None);
    }
}
