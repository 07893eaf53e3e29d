//! CPU inference handler: the texture backend the kernels run against.
//!
//! Plays the part of a GPU session. Texture storage is host memory, programs
//! are synthesized once per operator and input shapes, and execution runs the
//! program IR for every output texel through the `codegen::eval`
//! interpreter. The same programs are rendered to WGSL and, unless disabled,
//! validated with naga before first use.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::{
    codegen::eval::{self, Samplers, Value},
    error::KernelError,
    layout::{LayoutOptions, TextureLayout},
    ops::{PackOp, ProgramInfo, RunData, TextureOperator},
    shape,
    tensor::{DataType, Tensor, TensorId},
    validation,
};

/// The services a kernel may ask of its execution backend.
pub trait TextureHandler: Send + Sync {
    /// Layout of `tensor` under the given channel count and packing, cached
    /// per tensor.
    fn get_or_create_texture_layout(
        &self,
        tensor: &Tensor,
        channels: usize,
        is_packed: bool,
    ) -> Result<TextureLayout, KernelError>;

    fn create_texture_layout_from_shape(
        &self,
        shape: &[usize],
        channels: usize,
        declared_shape: &[usize],
        options: LayoutOptions,
    ) -> Result<TextureLayout, KernelError>;

    /// Texture holding `tensor` under `layout`. Requesting a packed layout
    /// for a tensor only held unpacked runs the Pack kernel first.
    fn get_or_create_texture_data(
        &self,
        tensor: &Tensor,
        layout: &TextureLayout,
    ) -> Result<Arc<TextureData>>;

    /// Zeroed texture for a kernel output.
    fn create_texture_data_from_layout(&self, layout: &TextureLayout, dtype: DataType)
    -> TextureData;

    fn run(&self, op: &dyn TextureOperator, inputs: &[Tensor]) -> Result<Vec<Tensor>>;
}

/// Texel storage of one texture: `width * height * channels` floats, texel
/// rows top to bottom, channels interleaved.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub layout: TextureLayout,
    pub dtype: DataType,
    /// Tensor this texture was created from, if any.
    pub tensor_id: Option<TensorId>,
    texels: Vec<f32>,
}

impl TextureData {
    pub fn zeroed(layout: TextureLayout, dtype: DataType) -> Self {
        Self {
            texels: vec![0.0; layout.storage_len()],
            layout,
            dtype,
            tensor_id: None,
        }
    }

    pub fn texels(&self) -> &[f32] {
        &self.texels
    }

    /// Raw bytes for a texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// All four lanes of texel `(x, y)`; lanes past the layout's channel
    /// count read as zero.
    pub fn texel(&self, x: usize, y: usize) -> Option<[f32; 4]> {
        let channels = self.layout.channels;
        if x >= self.layout.width || y >= self.layout.height {
            return None;
        }
        let start = (y * self.layout.width + x) * channels;
        let mut out = [0.0; 4];
        for (lane, value) in out.iter_mut().zip(&self.texels[start..start + channels]) {
            *lane = *value;
        }
        Some(out)
    }

    pub fn write_texel(&mut self, x: usize, y: usize, lanes: &[f32; 4]) -> Result<()> {
        let channels = self.layout.channels;
        if x >= self.layout.width || y >= self.layout.height {
            bail!(
                "texel ({x}, {y}) outside {}x{} texture",
                self.layout.width,
                self.layout.height
            );
        }
        let start = (y * self.layout.width + x) * channels;
        self.texels[start..start + channels].copy_from_slice(&lanes[..channels]);
        Ok(())
    }

    /// Unpacked single-channel texture holding `tensor`'s data.
    fn upload(tensor: &Tensor, layout: &TextureLayout) -> Result<Self> {
        let mut data = Self::zeroed(layout.clone(), tensor.dtype());
        data.tensor_id = Some(tensor.id());
        for (offset, value) in tensor.data().iter().enumerate() {
            let index = shape::unravel(offset, tensor.dims());
            let (x, y, ch) = layout
                .texel_of(&index)
                .ok_or_else(|| anyhow!("index {index:?} outside layout {:?}", layout.shape))?;
            data.texels[(y * layout.width + x) * layout.channels + ch] = *value;
        }
        Ok(data)
    }

    /// Read the logical tensor back out of texel storage.
    pub fn to_tensor(&self) -> Result<Tensor> {
        let data = self.layout.read_logical(&self.texels).ok_or_else(|| {
            anyhow!(
                "texture storage too short for layout {:?} ({} floats)",
                self.layout.shape,
                self.texels.len()
            )
        })?;
        Ok(Tensor::with_dtype(
            self.layout.shape.clone(),
            self.dtype,
            data,
        )?)
    }
}

/// Handler configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerOptions {
    /// Assemble and parse every newly synthesized program as WGSL before it
    /// is first executed.
    pub validate_wgsl: bool,
    /// Reuse synthesized programs across runs with the same input shapes.
    pub cache_programs: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            validate_wgsl: true,
            cache_programs: true,
        }
    }
}

impl HandlerOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse handler options")
    }
}

type LayoutKey = (TensorId, usize, bool);
type TextureKey = (TensorId, TextureLayout);
/// Filled by whichever caller creates the texture first; later callers for
/// the same key wait on the slot lock instead of creating it again.
type TextureSlot = Arc<Mutex<Option<Arc<TextureData>>>>;

#[derive(Debug, Default)]
pub struct CpuInferenceHandler {
    options: HandlerOptions,
    layouts: Mutex<HashMap<LayoutKey, TextureLayout>>,
    textures: Mutex<HashMap<TextureKey, TextureSlot>>,
    programs: Mutex<HashMap<String, Arc<ProgramInfo>>>,
    packs_run: AtomicUsize,
}

impl CpuInferenceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    pub fn cached_program_count(&self) -> usize {
        self.programs.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn cached_texture_count(&self) -> usize {
        let Ok(textures) = self.textures.lock() else {
            return 0;
        };
        textures
            .values()
            .filter(|slot| slot.lock().is_ok_and(|data| data.is_some()))
            .count()
    }

    /// Number of Pack kernels this handler has executed.
    pub fn packs_run(&self) -> usize {
        self.packs_run.load(Ordering::Relaxed)
    }

    /// Drop every cached layout and texture belonging to `tensor`. Returns
    /// the number of texture entries dropped.
    pub fn release(&self, tensor: &Tensor) -> usize {
        let id = tensor.id();
        if let Ok(mut layouts) = self.layouts.lock() {
            layouts.retain(|(owner, _, _), _| *owner != id);
        }
        let Ok(mut textures) = self.textures.lock() else {
            return 0;
        };
        let before = textures.len();
        textures.retain(|(owner, _), _| *owner != id);
        let released = before - textures.len();
        log::debug!("released {released} textures of tensor {id:?}");
        released
    }

    /// Empty every cache: layouts, textures and programs.
    pub fn dispose(&self) {
        if let Ok(mut layouts) = self.layouts.lock() {
            layouts.clear();
        }
        if let Ok(mut textures) = self.textures.lock() {
            textures.clear();
        }
        if let Ok(mut programs) = self.programs.lock() {
            programs.clear();
        }
        log::debug!("handler caches disposed");
    }

    /// Synthesize (or reuse) the program for `op` over these inputs.
    pub fn program_info(
        &self,
        op: &dyn TextureOperator,
        inputs: &[Tensor],
    ) -> Result<Arc<ProgramInfo>> {
        let key = op.cache_key(inputs);
        if self.options.cache_programs {
            let programs = self
                .programs
                .lock()
                .map_err(|_| anyhow!("program cache poisoned"))?;
            if let Some(info) = programs.get(&key) {
                log::debug!("program cache hit: {key}");
                return Ok(Arc::clone(info));
            }
        }

        log::debug!("synthesizing program: {key}");
        let info = op.create_program_info(self, inputs)?;
        if self.options.validate_wgsl {
            validation::validate_program(&info, op.name())
                .inspect_err(|e| log::warn!("{} program rejected: {e:#}", op.name()))?;
        }
        let info = Arc::new(info);

        if self.options.cache_programs {
            let mut programs = self
                .programs
                .lock()
                .map_err(|_| anyhow!("program cache poisoned"))?;
            return Ok(Arc::clone(programs.entry(key).or_insert(info)));
        }
        Ok(info)
    }

    /// Run `info` over its bound textures, filling the output texture.
    fn execute(&self, info: &ProgramInfo, run_data: RunData) -> Result<TextureData> {
        if run_data.input_texture_datas.len() != info.samplers.len() {
            bail!(
                "{} input textures bound for {} samplers",
                run_data.input_texture_datas.len(),
                info.samplers.len()
            );
        }
        let samplers = BoundSamplers {
            bindings: info
                .samplers
                .iter()
                .map(String::as_str)
                .zip(run_data.input_texture_datas.iter().map(Arc::as_ref))
                .collect(),
        };

        let mut output = run_data.output_texture_data;
        let layout = output.layout.clone();
        for y in 0..layout.height {
            for x in 0..layout.width {
                let Some(coords) = layout.coords_of_texel(x, y) else {
                    continue;
                };
                let coords = coords
                    .iter()
                    .map(|&c| i32::try_from(c))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| anyhow!("output coords {coords:?} exceed i32"))?;
                let texel = eval::run_program(&info.program, &coords, &samplers)
                    .with_context(|| format!("failed at output coords {coords:?}"))?;
                output.write_texel(x, y, &texel)?;
            }
        }
        Ok(output)
    }

    fn pack(&self, tensor: &Tensor, layout: &TextureLayout) -> Result<TextureData> {
        log::debug!("packing tensor {:?} {:?}", tensor.id(), tensor.dims());
        let inputs = std::slice::from_ref(tensor);
        let info = self.program_info(&PackOp, inputs)?;
        let run_data = PackOp.create_run_data(self, &info, inputs)?;
        let mut data = self.execute(&info, run_data)?;
        if data.layout != *layout {
            bail!(
                "Pack produced layout {:?}, requested {:?}",
                data.layout,
                layout
            );
        }
        data.tensor_id = Some(tensor.id());
        self.packs_run.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }
}

impl TextureHandler for CpuInferenceHandler {
    fn get_or_create_texture_layout(
        &self,
        tensor: &Tensor,
        channels: usize,
        is_packed: bool,
    ) -> Result<TextureLayout, KernelError> {
        let key = (tensor.id(), channels, is_packed);
        if let Ok(layouts) = self.layouts.lock() {
            if let Some(layout) = layouts.get(&key) {
                return Ok(layout.clone());
            }
        }
        let layout = self.create_texture_layout_from_shape(
            tensor.dims(),
            channels,
            tensor.dims(),
            LayoutOptions { is_packed },
        )?;
        let Ok(mut layouts) = self.layouts.lock() else {
            return Ok(layout);
        };
        Ok(layouts.entry(key).or_insert(layout).clone())
    }

    fn create_texture_layout_from_shape(
        &self,
        shape: &[usize],
        channels: usize,
        declared_shape: &[usize],
        options: LayoutOptions,
    ) -> Result<TextureLayout, KernelError> {
        TextureLayout::from_shape(shape, channels, declared_shape, options)
    }

    fn get_or_create_texture_data(
        &self,
        tensor: &Tensor,
        layout: &TextureLayout,
    ) -> Result<Arc<TextureData>> {
        let key = (tensor.id(), layout.clone());
        let slot = {
            let mut textures = self
                .textures
                .lock()
                .map_err(|_| anyhow!("texture cache poisoned"))?;
            Arc::clone(textures.entry(key).or_default())
        };

        // Packing re-enters this method for the unpacked source, which is a
        // different slot, so only the map lock must not be held here.
        let mut slot = slot
            .lock()
            .map_err(|_| anyhow!("texture slot poisoned"))?;
        if let Some(data) = slot.as_ref() {
            return Ok(Arc::clone(data));
        }
        let data = Arc::new(if layout.is_packed {
            self.pack(tensor, layout)?
        } else {
            TextureData::upload(tensor, layout)?
        });
        *slot = Some(Arc::clone(&data));
        Ok(data)
    }

    fn create_texture_data_from_layout(
        &self,
        layout: &TextureLayout,
        dtype: DataType,
    ) -> TextureData {
        TextureData::zeroed(layout.clone(), dtype)
    }

    fn run(&self, op: &dyn TextureOperator, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let info = self.program_info(op, inputs)?;
        let run_data = op.create_run_data(self, &info, inputs)?;
        let output = self
            .execute(&info, run_data)
            .with_context(|| format!("{} kernel failed", op.name()))?;
        Ok(vec![output.to_tensor()?])
    }
}

fn packing_name(packed: bool) -> &'static str {
    if packed { "packed" } else { "unpacked" }
}

/// Sampler name to bound texture, for the interpreter.
struct BoundSamplers<'a> {
    bindings: Vec<(&'a str, &'a TextureData)>,
}

impl Samplers for BoundSamplers<'_> {
    fn sample(&self, sampler: &str, packed: bool, index: &[i32]) -> Result<Value> {
        let data = self
            .bindings
            .iter()
            .find(|(name, _)| *name == sampler)
            .map(|(_, data)| *data)
            .ok_or_else(|| anyhow!("no texture bound to sampler `{sampler}`"))?;
        if data.layout.is_packed != packed {
            bail!(
                "sampler `{sampler}` read as {} but bound texture is {}",
                packing_name(packed),
                packing_name(data.layout.is_packed)
            );
        }

        let index = index
            .iter()
            .map(|&i| usize::try_from(i))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| anyhow!("negative index {index:?} on sampler `{sampler}`"))?;
        let layout = &data.layout;
        let (x, y, ch) = layout.texel_of(&index).ok_or_else(|| {
            anyhow!(
                "index {index:?} out of bounds for sampler `{sampler}` of shape {:?}",
                layout.shape
            )
        })?;
        let texel = data
            .texel(x, y)
            .ok_or_else(|| anyhow!("texel ({x}, {y}) outside sampler `{sampler}`"))?;

        Ok(if layout.is_packed {
            Value::Vec4(texel)
        } else {
            Value::Float(texel[ch])
        })
    }
}
