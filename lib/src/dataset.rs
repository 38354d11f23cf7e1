//! The test sample source.
//!
//! A [`Dataset`] is built from a file list, which can be a directory of
//! images, a single image, or a text file with one image path per line.
//! For every image the network inputs are derived on the fly: the edge map
//! with a Canny detector and the colour domain by quantizing the image to a
//! handful of colours.
use crate::{
    config::Config,
    utils::{resize_center_crop, to_tensor},
    Error,
};
use candle_core::Tensor;
use image::{GrayImage, RgbImage};
use imageproc::{edges::canny, filter};
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 100.0;

const MEDIAN_RADIUS: u32 = 2;
const KMEANS_ITERATIONS: usize = 10;

/// The co-registered network inputs for one image, each a `[1, C, H, W]`
/// tensor on the host
pub struct Sample {
    /// RGB image
    pub image: Tensor,
    /// Luma of `image`
    pub gray: Tensor,
    /// Single channel edge map
    pub edge: Tensor,
    /// RGB colour domain, the blurred and colour-quantized image
    pub color_domain: Tensor,
}

/// Enumerates the samples of a file list. Samples are never augmented.
pub struct Dataset {
    data: Vec<PathBuf>,
    input_size: u32,
    sigma: f32,
    km: u32,
    seed: u64,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Resolves a file list into the image paths it names
pub fn load_flist(flist: &Path) -> Result<Vec<PathBuf>, Error> {
    if flist.is_dir() {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(flist)? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }

        files.sort();
        return Ok(files);
    }

    if flist.is_file() {
        if is_image(flist) {
            return Ok(vec![flist.to_owned()]);
        }

        let text = std::fs::read_to_string(flist)?;
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect());
    }

    tracing::warn!("file list '{}' does not exist", flist.display());
    Ok(Vec::new())
}

impl Dataset {
    pub fn new(config: &Config, flist: &Path) -> Result<Self, Error> {
        let data = load_flist(flist)?;
        if data.is_empty() {
            tracing::warn!("file list '{}' contains no images", flist.display());
        }

        Ok(Self {
            data,
            input_size: config.input_size,
            sigma: config.sigma,
            km: config.km,
            seed: config.seed,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The file name of sample `index`
    ///
    /// # Panics
    ///
    /// If `index >= self.len()`
    pub fn load_name(&self, index: usize) -> String {
        let path = &self.data[index];
        path.file_name()
            .unwrap_or_else(|| path.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Decodes sample `index` and derives its network inputs
    ///
    /// # Panics
    ///
    /// If `index >= self.len()`
    pub fn load_item(&self, index: usize) -> Result<Sample, Error> {
        let path = &self.data[index];

        let decode_err = |source| Error::SampleDecode {
            path: path.clone(),
            source,
        };

        // The format is sniffed from the content so names without an
        // extension still decode
        let img = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| decode_err(image::ImageError::IoError(e)))?
            .decode()
            .map_err(decode_err)?;

        let img = if self.input_size != 0 {
            resize_center_crop(&img, self.input_size)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let gray = image::imageops::grayscale(&rgb);
        let edge = self.load_edge(&gray);
        let color_domain = self.load_color_domain(&rgb, index);

        Ok(Sample {
            image: to_tensor(&rgb)?,
            gray: to_tensor(&gray)?,
            edge: to_tensor(&edge)?,
            color_domain: to_tensor(&color_domain)?,
        })
    }

    /// Iterates `(name, sample)` pairs in file list order
    pub fn iter(&self) -> impl Iterator<Item = Result<(String, Sample), Error>> + '_ {
        (0..self.len()).map(move |index| Ok((self.load_name(index), self.load_item(index)?)))
    }

    fn load_edge(&self, gray: &GrayImage) -> GrayImage {
        if self.sigma > 0.0 {
            canny(
                &filter::gaussian_blur_f32(gray, self.sigma),
                CANNY_LOW,
                CANNY_HIGH,
            )
        } else {
            canny(gray, CANNY_LOW, CANNY_HIGH)
        }
    }

    fn load_color_domain(&self, rgb: &RgbImage, index: usize) -> RgbImage {
        let smoothed = filter::median_filter(rgb, MEDIAN_RADIUS, MEDIAN_RADIUS);
        let quantized = quantize(&smoothed, self.km, self.seed.wrapping_add(index as u64));
        filter::median_filter(&quantized, MEDIAN_RADIUS, MEDIAN_RADIUS)
    }
}

fn nearest(centroids: &[[f32; 3]], px: &[f32; 3]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;

    for (i, c) in centroids.iter().enumerate() {
        let dist = (c[0] - px[0]).powi(2) + (c[1] - px[1]).powi(2) + (c[2] - px[2]).powi(2);
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }

    best
}

/// Reduces the image to at most `k` colours with Lloyd's k-means. The
/// initial centroids are drawn from the image with a seeded PRNG so the
/// result is reproducible.
pub(crate) fn quantize(img: &RgbImage, k: u32, seed: u64) -> RgbImage {
    let pixels: Vec<[f32; 3]> = img
        .pixels()
        .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
        .collect();

    if pixels.is_empty() || k == 0 {
        return img.clone();
    }

    let k = (k as usize).min(pixels.len());
    let mut rng = rand_pcg::Pcg32::seed_from_u64(seed);
    let mut centroids: Vec<[f32; 3]> = (0..k)
        .map(|_| pixels[rng.gen_range(0..pixels.len())])
        .collect();

    let mut assignment = vec![0; pixels.len()];

    for iteration in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (slot, px) in assignment.iter_mut().zip(pixels.iter()) {
            let cluster = nearest(&centroids, px);
            if *slot != cluster {
                *slot = cluster;
                changed = true;
            }
        }

        if iteration > 0 && !changed {
            break;
        }

        let mut sums = vec![[0f32; 3]; k];
        let mut counts = vec![0u32; k];
        for (&cluster, px) in assignment.iter().zip(pixels.iter()) {
            sums[cluster][0] += px[0];
            sums[cluster][1] += px[1];
            sums[cluster][2] += px[2];
            counts[cluster] += 1;
        }

        // clusters that lost all their pixels keep their old centroid
        for ((centroid, sum), &count) in centroids.iter_mut().zip(sums.iter()).zip(counts.iter()) {
            if count > 0 {
                let n = count as f32;
                *centroid = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }
    }

    let width = img.width() as usize;
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let c = centroids[assignment[y as usize * width + x as usize]];
        image::Rgb([
            c[0].round() as u8,
            c[1].round() as u8,
            c[2].round() as u8,
        ])
    })
}
