//! The image synthesis network.
use crate::{config::Config, Error};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig, VarBuilder};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Base file name of the generator weights inside the checkpoint directory
pub const CHECKPOINT_NAME: &str = "G_Model_gen";

/// Key the generator state is stored under in PyTorch checkpoints
const PTH_KEY: &str = "generator";

const NORM_EPS: f64 = 1e-5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModelMode {
    Train,
    Eval,
}

/// A trained function from an edge map and a colour domain to an image.
///
/// All tensors are `[N, C, H, W]` with values in [0, 1]. The output may
/// differ slightly in spatial size from the inputs, callers reconcile that
/// with [`output_align`](crate::utils::output_align).
pub trait Generator {
    /// Loads the persisted weights, this must succeed before `forward`
    fn load(&mut self) -> Result<(), Error>;

    fn set_mode(&mut self, mode: ModelMode);

    fn mode(&self) -> ModelMode;

    /// Synthesizes an image. `images` is the full colour image when one is
    /// available, `None` requests synthesis from the edges and colour domain
    /// alone.
    fn forward(
        &self,
        images: Option<&Tensor>,
        edges: &Tensor,
        color_domain: &Tensor,
    ) -> Result<Tensor, Error>;
}

/// Pads the last two dimensions by mirroring the tensor at its borders
/// without repeating the edge itself
fn reflection_pad2d(x: &Tensor, pad: usize) -> candle_core::Result<Tensor> {
    fn reflect(x: &Tensor, dim: usize, pad: usize) -> candle_core::Result<Tensor> {
        let size = x.dim(dim)?;

        let mut parts = Vec::with_capacity(2 * pad + 1);
        for i in (1..=pad).rev() {
            parts.push(x.narrow(dim, i, 1)?);
        }
        parts.push(x.clone());
        for i in 1..=pad {
            parts.push(x.narrow(dim, size - 1 - i, 1)?);
        }

        Tensor::cat(&parts, dim)
    }

    if pad == 0 {
        return Ok(x.clone());
    }

    let (_, _, height, width) = x.dims4()?;
    if pad >= height || pad >= width {
        candle_core::bail!(
            "reflection padding of {} needs an input larger than {}x{}",
            pad,
            width,
            height
        );
    }

    reflect(&reflect(x, 2, pad)?, 3, pad)
}

/// Normalizes every channel of every sample to zero mean and unit variance,
/// there are no learned affine parameters or running statistics
fn instance_norm(x: &Tensor) -> candle_core::Result<Tensor> {
    let (n, c, h, w) = x.dims4()?;
    let flat = x.reshape((n, c, h * w))?;

    let mean = flat.mean_keepdim(2)?;
    let centered = flat.broadcast_sub(&mean)?;
    let var = centered.sqr()?.mean_keepdim(2)?;
    let normed = centered.broadcast_div(&var.affine(1.0, NORM_EPS)?.sqrt()?)?;

    normed.reshape((n, c, h, w))
}

fn strided(stride: usize, padding: usize) -> Conv2dConfig {
    Conv2dConfig {
        stride,
        padding,
        ..Default::default()
    }
}

fn upsample() -> ConvTranspose2dConfig {
    ConvTranspose2dConfig {
        padding: 1,
        output_padding: 0,
        stride: 2,
        dilation: 1,
    }
}

struct ResidualBlock {
    conv1: Conv2d,
    conv2: Conv2d,
    dilation: usize,
}

impl ResidualBlock {
    fn load(dim: usize, dilation: usize, vb: VarBuilder<'_>) -> candle_core::Result<Self> {
        let conv1 = candle_nn::conv2d(
            dim,
            dim,
            3,
            Conv2dConfig {
                dilation,
                ..Default::default()
            },
            vb.pp("conv_block.1"),
        )?;
        let conv2 = candle_nn::conv2d(dim, dim, 3, Default::default(), vb.pp("conv_block.5"))?;

        Ok(Self {
            conv1,
            conv2,
            dilation,
        })
    }
}

impl Module for ResidualBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let h = reflection_pad2d(x, self.dilation)?.apply(&self.conv1)?;
        let h = instance_norm(&h)?.relu()?;
        let h = reflection_pad2d(&h, 1)?.apply(&self.conv2)?;
        let h = instance_norm(&h)?;

        x.add(&h)
    }
}

/// Encoder, dilated residual blocks, decoder. The spatial size is reduced
/// by 4 in the encoder, so inputs that aren't a multiple of 4 come out
/// slightly smaller.
struct Network {
    encoder: [Conv2d; 3],
    middle: Vec<ResidualBlock>,
    decoder: [ConvTranspose2d; 2],
    output: Conv2d,
}

impl Network {
    /// Edge map (1) + colour domain (3)
    const IN_CHANNELS: usize = 4;

    fn load(residual_blocks: usize, vb: VarBuilder<'_>) -> candle_core::Result<Self> {
        let enc = vb.pp("encoder");
        let encoder = [
            candle_nn::conv2d(Self::IN_CHANNELS, 64, 7, Default::default(), enc.pp("1"))?,
            candle_nn::conv2d(64, 128, 4, strided(2, 1), enc.pp("4"))?,
            candle_nn::conv2d(128, 256, 4, strided(2, 1), enc.pp("7"))?,
        ];

        let mid = vb.pp("middle");
        let middle = (0..residual_blocks)
            .map(|i| ResidualBlock::load(256, 2, mid.pp(i)))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let dec = vb.pp("decoder");
        let decoder = [
            candle_nn::conv_transpose2d(256, 128, 4, upsample(), dec.pp("0"))?,
            candle_nn::conv_transpose2d(128, 64, 4, upsample(), dec.pp("3"))?,
        ];
        let output = candle_nn::conv2d(64, 3, 7, Default::default(), dec.pp("7"))?;

        Ok(Self {
            encoder,
            middle,
            decoder,
            output,
        })
    }

    fn forward(&self, edges: &Tensor, color_domain: &Tensor) -> candle_core::Result<Tensor> {
        let mut x = Tensor::cat(&[edges, color_domain], 1)?;

        x = reflection_pad2d(&x, 3)?;
        for conv in &self.encoder {
            x = instance_norm(&x.apply(conv)?)?.relu()?;
        }

        for block in &self.middle {
            x = x.apply(block)?;
        }

        for deconv in &self.decoder {
            x = instance_norm(&x.apply(deconv)?)?.relu()?;
        }

        let x = reflection_pad2d(&x, 3)?.apply(&self.output)?;

        // tanh into [0, 1]
        x.tanh()?.affine(0.5, 0.5)
    }
}

/// The colour-domain generator, loaded from `<PATH>/G_Model_gen.safetensors`
/// or, failing that, `<PATH>/G_Model_gen.pth`.
///
/// The network has no dropout and its normalization keeps no running
/// statistics, so it computes the same function in both modes.
pub struct PiRecGenerator {
    checkpoint_dir: PathBuf,
    device: Device,
    residual_blocks: usize,
    mode: ModelMode,
    network: Option<Network>,
}

impl PiRecGenerator {
    pub fn new(config: &Config, device: Device) -> Self {
        Self {
            checkpoint_dir: config.path.clone(),
            device,
            residual_blocks: config.residual_blocks,
            mode: ModelMode::Train,
            network: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.network.is_some()
    }

    fn read_checkpoint(&self, path: &Path) -> candle_core::Result<HashMap<String, Tensor>> {
        if path.extension().map_or(false, |ext| ext == "pth") {
            Ok(candle_core::pickle::read_all_with_key(path, Some(PTH_KEY))?
                .into_iter()
                .collect())
        } else {
            candle_core::safetensors::load(path, &self.device)
        }
    }
}

impl Generator for PiRecGenerator {
    fn load(&mut self) -> Result<(), Error> {
        let path = ["safetensors", "pth"]
            .iter()
            .map(|ext| {
                self.checkpoint_dir
                    .join(format!("{}.{}", CHECKPOINT_NAME, ext))
            })
            .find(|path| path.is_file())
            .ok_or_else(|| Error::CheckpointMissing(self.checkpoint_dir.clone()))?;

        tracing::info!("loading generator from '{}'", path.display());

        let network = self
            .read_checkpoint(&path)
            .and_then(|tensors| {
                let vb = VarBuilder::from_tensors(tensors, DType::F32, &self.device);
                Network::load(self.residual_blocks, vb)
            })
            .map_err(|source| Error::CheckpointLoad {
                path: path.clone(),
                source,
            })?;

        self.network = Some(network);
        Ok(())
    }

    fn set_mode(&mut self, mode: ModelMode) {
        self.mode = mode;
    }

    fn mode(&self) -> ModelMode {
        self.mode
    }

    fn forward(
        &self,
        _images: Option<&Tensor>,
        edges: &Tensor,
        color_domain: &Tensor,
    ) -> Result<Tensor, Error> {
        // synthesis is conditioned on edges and colour domain only, the full
        // image is never an input of this network
        let network = self.network.as_ref().ok_or(Error::GeneratorNotLoaded)?;

        Ok(network.forward(edges, color_domain)?)
    }
}
