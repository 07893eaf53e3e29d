//! CPU interpreter for shader IR.
//!
//! Executes one invocation of a program the way the rendered WGSL would on
//! the GPU: `i32` arithmetic wraps, `f32` lanes are IEEE single precision,
//! and reads go through a caller-supplied [`Samplers`] binding.

use anyhow::{Result, anyhow, bail};

use super::ir::{BinOp, Expr, ShaderProgram, Stmt};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    Vec4([f32; 4]),
    Coords(Vec<i32>),
}

impl Value {
    fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => bail!("expected bool, got {other:?}"),
        }
    }

    fn as_vec4(&self) -> Result<[f32; 4]> {
        match self {
            Value::Vec4(v) => Ok(*v),
            other => bail!("expected vec4, got {other:?}"),
        }
    }
}

/// Texture reads for a bound program.
pub trait Samplers {
    /// Read `sampler` at a logical index: a `Vec4` texel when the input is
    /// packed, a `Float` otherwise. `packed` is what the program expects the
    /// bound texture to be.
    fn sample(&self, sampler: &str, packed: bool, index: &[i32]) -> Result<Value>;
}

/// Lexically scoped locals; a block truncates back to its entry length.
struct Frame<'a> {
    locals: Vec<(String, Value)>,
    output_coords: &'a [i32],
    samplers: &'a dyn Samplers,
}

impl Frame<'_> {
    fn lookup(&self, name: &str) -> Result<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| anyhow!("undefined local `{name}`"))
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        let slot = self
            .locals
            .iter_mut()
            .rev()
            .find(|(n, _)| n == name)
            .ok_or_else(|| anyhow!("assignment to undefined local `{name}`"))?;
        slot.1 = value;
        Ok(())
    }

    fn eval(&self, expr: &Expr) -> Result<Value> {
        Ok(match expr {
            Expr::Int(v) => Value::Int(*v),
            Expr::Float(v) => Value::Float(*v),
            Expr::Local(name) => self.lookup(name)?.clone(),
            Expr::CoordComponent { var, index, .. } => match self.lookup(var)? {
                Value::Coords(c) => Value::Int(
                    *c.get(*index)
                        .ok_or_else(|| anyhow!("coordinate component {index} out of range"))?,
                ),
                other => bail!("`{var}` is not a coordinate value: {other:?}"),
            },
            Expr::Binary { op, lhs, rhs } => binary(*op, self.eval(lhs)?, self.eval(rhs)?)?,
            Expr::Not(inner) => Value::Bool(!self.eval(inner)?.as_bool()?),
            Expr::OutputCoords => Value::Coords(self.output_coords.to_vec()),
            Expr::Sample {
                sampler,
                packed,
                index,
            } => {
                let index = index
                    .iter()
                    .map(|e| match self.eval(e)? {
                        Value::Int(i) => Ok(i),
                        other => bail!("sampler index must be i32, got {other:?}"),
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.samplers.sample(sampler, *packed, &index)?
            }
            Expr::Vec4(parts) => {
                if parts.len() != 4 {
                    bail!("vec4 constructor takes 4 parts, got {}", parts.len());
                }
                let mut out = [0.0; 4];
                for (lane, part) in out.iter_mut().zip(parts) {
                    *lane = match self.eval(part)? {
                        Value::Float(f) => f,
                        other => bail!("vec4 lane must be f32, got {other:?}"),
                    };
                }
                Value::Vec4(out)
            }
            Expr::Splat(inner) => match self.eval(inner)? {
                Value::Float(f) => Value::Vec4([f; 4]),
                other => bail!("splat takes f32, got {other:?}"),
            },
            Expr::Swizzle { value, lanes } => {
                let v = self.eval(value)?.as_vec4()?;
                Value::Vec4((*lanes).map(|l| v[l]))
            }
        })
    }

    /// Runs a block; `Some` carries a returned value.
    fn exec_block(&mut self, body: &[Stmt]) -> Result<Option<Value>> {
        let mark = self.locals.len();
        let mut result = None;
        for stmt in body {
            if let Some(ret) = self.exec(stmt)? {
                result = Some(ret);
                break;
            }
        }
        self.locals.truncate(mark);
        Ok(result)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<Value>> {
        match stmt {
            Stmt::Let { name, value, .. } | Stmt::Var { name, value, .. } => {
                let v = self.eval(value)?;
                self.locals.push((name.clone(), v));
            }
            Stmt::Assign { name, value } => {
                let v = self.eval(value)?;
                self.assign(name, v)?;
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = if self.eval(cond)?.as_bool()? {
                    then_body
                } else {
                    else_body
                };
                return self.exec_block(branch);
            }
            Stmt::ForRange { var, count, body } => {
                for k in 0..*count {
                    self.locals.push((var.clone(), Value::Int(k)));
                    let ret = self.exec_block(body)?;
                    self.locals.pop();
                    if ret.is_some() {
                        return Ok(ret);
                    }
                }
            }
            Stmt::Return(value) => return Ok(Some(self.eval(value)?)),
        }
        Ok(None)
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
    use Value::*;
    Ok(match (op, lhs, rhs) {
        (BinOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (BinOp::Ge, Int(a), Int(b)) => Bool(a >= b),
        (BinOp::Add, Float(a), Float(b)) => Float(a + b),
        (BinOp::Mul, Float(a), Float(b)) => Float(a * b),
        (BinOp::Ge, Float(a), Float(b)) => Bool(a >= b),
        (BinOp::Add, Vec4(a), Vec4(b)) => Vec4(std::array::from_fn(|i| a[i] + b[i])),
        (BinOp::Mul, Vec4(a), Vec4(b)) => Vec4(std::array::from_fn(|i| a[i] * b[i])),
        (BinOp::Or, Bool(a), Bool(b)) => Bool(a || b),
        (op, a, b) => bail!("unsupported operands for `{}`: {a:?}, {b:?}", op.symbol()),
    })
}

/// Run one invocation of `program` for the output element at
/// `output_coords`, returning the texel it writes.
pub fn run_program(
    program: &ShaderProgram,
    output_coords: &[i32],
    samplers: &dyn Samplers,
) -> Result<[f32; 4]> {
    let mut frame = Frame {
        locals: Vec::new(),
        output_coords,
        samplers,
    };
    let value = frame
        .exec_block(&program.body)?
        .ok_or_else(|| anyhow!("program finished without returning a texel"))?;
    value.as_vec4()
}
