//! Coordinate types and channel names for generated kernels.
//!
//! `CoordContext` is the only way synthesizers reach output coordinates, so
//! the spelling used by a kernel always matches the type returned by the
//! template's `get_output_coords`.

use crate::error::KernelError;

use super::ir::{Expr, Stmt, Type};

pub const MAX_RANK: usize = 6;

const VECTOR_LANES: [&str; 4] = ["x", "y", "z", "w"];

/// Minimal structured type holding one output coordinate of a given rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoordsType {
    Int,
    IVec2,
    IVec3,
    IVec4,
    IArray(usize),
}

impl CoordsType {
    pub fn for_rank(rank: usize) -> Result<Self, KernelError> {
        match rank {
            1 => Ok(CoordsType::Int),
            2 => Ok(CoordsType::IVec2),
            3 => Ok(CoordsType::IVec3),
            4 => Ok(CoordsType::IVec4),
            5..=MAX_RANK => Ok(CoordsType::IArray(rank)),
            _ => Err(KernelError::UnsupportedRank(rank)),
        }
    }

    pub fn rank(self) -> usize {
        match self {
            CoordsType::Int => 1,
            CoordsType::IVec2 => 2,
            CoordsType::IVec3 => 3,
            CoordsType::IVec4 => 4,
            CoordsType::IArray(n) => n,
        }
    }

    /// WGSL type name.
    pub fn wgsl(self) -> String {
        match self {
            CoordsType::Int => "i32".to_string(),
            CoordsType::IVec2 => "vec2<i32>".to_string(),
            CoordsType::IVec3 => "vec3<i32>".to_string(),
            CoordsType::IVec4 => "vec4<i32>".to_string(),
            CoordsType::IArray(n) => format!("array<i32, {n}>"),
        }
    }
}

/// Ordered component names of a coordinate variable `base` of `rank`.
///
/// Leading names are batch components; the last two are row and column.
pub fn channel_names(base: &str, rank: usize) -> Vec<String> {
    match rank {
        0 => Vec::new(),
        1 => vec![base.to_string()],
        2..=4 => VECTOR_LANES[..rank]
            .iter()
            .map(|lane| format!("{base}.{lane}"))
            .collect(),
        _ => (0..rank).map(|i| format!("{base}[{i}]")).collect(),
    }
}

/// The output coordinate local of one kernel, with its type and names.
#[derive(Clone, Debug)]
pub struct CoordContext {
    var: String,
    ty: CoordsType,
    channels: Vec<String>,
}

impl CoordContext {
    pub fn new(var: &str, rank: usize) -> Result<Self, KernelError> {
        Ok(Self {
            var: var.to_string(),
            ty: CoordsType::for_rank(rank)?,
            channels: channel_names(var, rank),
        })
    }

    pub fn rank(&self) -> usize {
        self.ty.rank()
    }

    /// `let <var>: <type> = get_output_coords(..);`
    pub fn declare(&self) -> Stmt {
        Stmt::let_(&self.var, Type::Coords(self.ty), Expr::OutputCoords)
    }

    pub fn channel(&self, index: usize) -> Expr {
        Expr::CoordComponent {
            var: self.var.clone(),
            index,
            name: self.channels[index].clone(),
        }
    }

    /// Second-to-last component. Rank-1 coordinates have no row.
    pub fn row(&self) -> Option<Expr> {
        (self.rank() >= 2).then(|| self.channel(self.rank() - 2))
    }

    /// Last component.
    pub fn col(&self) -> Expr {
        self.channel(self.rank() - 1)
    }

    /// Leading batch components, unchanged.
    pub fn batch(&self) -> Vec<Expr> {
        (0..self.rank().saturating_sub(2))
            .map(|i| self.channel(i))
            .collect()
    }
}
