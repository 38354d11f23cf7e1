use crate::{Dims, Error};
use candle_core::{DType, Device, Tensor};
use image::{
    imageops::FilterType, DynamicImage, GrayImage, ImageBuffer, ImageFormat, Pixel, RgbImage,
};
use std::{convert::TryInto, path::Path};

/// Helper type used to define the source of an input image's data
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// An already loaded image that is passed directly to the session
    Image(DynamicImage),
}

impl<'a> From<DynamicImage> for ImageSource<'a> {
    fn from(img: DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a> From<RgbImage> for ImageSource<'a> {
    fn from(img: RgbImage) -> Self {
        Self::Image(DynamicImage::ImageRgb8(img))
    }
}

impl<'a> From<GrayImage> for ImageSource<'a> {
    fn from(img: GrayImage) -> Self {
        Self::Image(DynamicImage::ImageLuma8(img))
    }
}

impl<'a, S> From<&'a S> for ImageSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Path(path.as_ref())
    }
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<DynamicImage, image::ImageError> {
    match src {
        ImageSource::Memory(data) => image::load_from_memory(data),
        ImageSource::Path(path) => image::open(path),
        ImageSource::Image(img) => Ok(img),
    }
}

/// Resizes an image buffer to exactly `size`, skipping the work if it
/// already has those dimensions
pub(crate) fn resize<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    size: Dims,
    filter: FilterType,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if img.width() == size.width && img.height() == size.height {
        img.clone()
    } else {
        image::imageops::resize(img, size.width, size.height, filter)
    }
}

/// Crops the largest centered square out of the image and resizes it to
/// `size` x `size`
pub(crate) fn resize_center_crop(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let side = width.min(height);

    let cropped = if width != height {
        img.crop_imm((width - side) / 2, (height - side) / 2, side, side)
    } else {
        img.clone()
    };

    if side == size {
        cropped
    } else {
        cropped.resize_exact(size, size, FilterType::CatmullRom)
    }
}

/// Thresholds an edge map in place so it only contains 0 and 255
pub fn binarize_edge(edge: &mut GrayImage, threshold: u8) {
    for pixel in edge.pixels_mut() {
        pixel[0] = if pixel[0] <= threshold { 0 } else { 255 };
    }
}

/// Converts an 8-bit image into a `[1, C, H, W]` f32 tensor in the range
/// [0, 1], on the host
pub fn to_tensor<P>(img: &ImageBuffer<P, Vec<u8>>) -> Result<Tensor, Error>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    let channels = P::CHANNEL_COUNT as usize;

    let tensor = Tensor::from_vec(
        img.as_raw().clone(),
        (height as usize, width as usize, channels),
        &Device::Cpu,
    )?
    .to_dtype(DType::F32)?
    .affine(1.0 / 255.0, 0.0)?
    .permute((2, 0, 1))?
    .unsqueeze(0)?
    .contiguous()?;

    Ok(tensor)
}

/// Maps a `[N, C, H, W]` tensor in [0, 1] to a `[N, H, W, C]` integer
/// tensor in [0, 255].
///
/// Values are truncated toward zero and are **not** clamped, a network
/// that drifts outside [0, 1] produces values outside [0, 255] here.
/// [`to_image`] is where they get clamped.
pub fn postprocess(img: &Tensor) -> Result<Tensor, Error> {
    Ok(img
        .to_dtype(DType::F32)?
        .affine(255.0, 0.0)?
        .permute((0, 2, 3, 1))?
        .to_dtype(DType::I64)?)
}

/// Converts a `[H, W, C]` post-processed tensor into an image, clamping
/// every value into [0, 255]
pub fn to_image(img: &Tensor) -> Result<DynamicImage, Error> {
    let (height, width, channels) = img.dims3()?;
    let pixels: Vec<u8> = img
        .to_dtype(DType::I64)?
        .flatten_all()?
        .to_vec1::<i64>()?
        .into_iter()
        .map(|v| v.clamp(0, 255) as u8)
        .collect();

    let (width, height) = (width as u32, height as u32);
    let img = match channels {
        1 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        _ => None,
    };

    img.ok_or_else(|| {
        candle_core::Error::Msg(format!(
            "can't build an image from {} channel(s) of {}x{}",
            channels, width, height
        ))
        .into()
    })
}

/// Saves a `[H, W, C]` post-processed tensor, the format is taken from the
/// extension of `path` and is PNG when the extension isn't a known one
pub fn imsave(img: &Tensor, path: &Path) -> Result<(), Error> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);

    to_image(img)?
        .save_with_format(path, format)
        .map_err(|source| Error::OutputWrite {
            path: path.to_owned(),
            source,
        })
}

fn fit_dim(t: Tensor, dim: usize, target: usize) -> Result<Tensor, Error> {
    let current = t.dim(dim)?;

    let t = if current > target {
        t.narrow(dim, 0, target)?
    } else if current < target {
        t.pad_with_same(dim, 0, target - current)?
    } else {
        t
    };

    Ok(t)
}

/// Makes the spatial size of `outputs` match `images`. Extra rows and
/// columns are cropped from the bottom and right, missing ones are filled
/// by replicating the last row or column.
pub fn output_align(images: &Tensor, outputs: &Tensor) -> Result<Tensor, Error> {
    let (_, _, height, width) = images.dims4()?;

    let aligned = fit_dim(outputs.clone(), 2, height)?;
    fit_dim(aligned, 3, width)
}

/// Splits a file name into its stem and extension on the last `.`
pub fn split_extension(name: &str) -> Result<(&str, &str), Error> {
    match name.rfind('.') {
        Some(dot) if dot > 0 => Ok((&name[..dot], &name[dot + 1..])),
        _ => Err(Error::InvalidSampleName(name.to_owned())),
    }
}

/// Something that can be moved to a compute device
pub trait Placeable: Sized {
    fn place_on(&self, device: &Device) -> Result<Self, Error>;
}

impl Placeable for Tensor {
    fn place_on(&self, device: &Device) -> Result<Self, Error> {
        Ok(self.to_device(device)?)
    }
}

/// Moves every item to `device`, keeping the array shape so the result can
/// be destructured
pub fn place<T: Placeable, const N: usize>(
    items: [&T; N],
    device: &Device,
) -> Result<[T; N], Error> {
    let placed = items
        .iter()
        .map(|item| item.place_on(device))
        .collect::<Result<Vec<_>, _>>()?;

    placed.try_into().map_err(|placed: Vec<T>| {
        candle_core::Error::Msg(format!("placed {} of {} items", placed.len(), N)).into()
    })
}
