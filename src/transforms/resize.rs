use crate::{
    boxes::{BoxCoords, boxes_to_components, components_to_boxes},
    error::{Result, invalid_config},
};

use super::pipeline::{MAX_PIXEL_VAL, Transform, rgb_img_as_tensor};
use burn::{
    prelude::Backend,
    tensor::{
        Tensor,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};
use image::DynamicImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Target size of a resize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeTarget {
    /// Scale so the shorter side equals this length, preserving the aspect ratio.
    Shorter(usize),
    /// Resize to exactly this extent. The two axes may scale differently.
    Exact { height: usize, width: usize },
}

/// Pixel resampling filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    #[default]
    Nearest,
    Bilinear,
    Bicubic,
    /// Triangle filter from the `image` crate, computed on the CPU.
    Triangle,
}

/// Computes the output `(height, width)` of a resize.
///
/// With [`ResizeTarget::Shorter`] and a `max_size`, the shorter side is first set to the
/// target; if that would push the longer side past `max_size`, the longer side is capped
/// at `max_size` instead and the shorter side shrinks accordingly. When the shorter side
/// already has the target length the original extent is returned unchanged.
pub fn resize_dims(
    height: usize,
    width: usize,
    target: ResizeTarget,
    max_size: Option<usize>,
) -> Result<(usize, usize)> {
    let dims = match target {
        ResizeTarget::Exact { height, width } => (height, width),
        ResizeTarget::Shorter(size) => {
            if size == 0 {
                return Err(invalid_config("resize target must be positive"));
            }

            let mut size = size;

            if let Some(max_size) = max_size {
                let min_original = height.min(width) as f64;
                let max_original = height.max(width) as f64;

                if size as f64 / min_original * max_original > max_size as f64 {
                    size = (max_size as f64 / max_original * min_original).round() as usize;
                }
            }

            if (width <= height && width == size) || (height <= width && height == size) {
                (height, width)
            } else if width < height {
                ((size as f64 * height as f64 / width as f64) as usize, size)
            } else {
                (size, (size as f64 * width as f64 / height as f64) as usize)
            }
        }
    };

    if dims.0 == 0 || dims.1 == 0 {
        return Err(invalid_config(format!(
            "resize of a {height}x{width} image to {target:?} (max {max_size:?}) is empty"
        )));
    }

    Ok(dims)
}

fn resize_boxes<B: Backend, R: Rng>(
    t: &mut Transform<B, R>,
    new_h: usize,
    new_w: usize,
    image_h: usize,
    image_w: usize,
    box_normalization: bool,
) {
    // Fractions of the image extent do not change when the image is rescaled.
    if t.coords == BoxCoords::Normalized {
        return;
    }
    if t.is_empty() {
        if box_normalization {
            t.coords = BoxCoords::Normalized;
        }
        return;
    }

    let (x1, y1, x2, y2) = boxes_to_components(t.boxes.clone());
    let h_ratio = new_h as f32 / image_h as f32;
    let w_ratio = new_w as f32 / image_w as f32;

    let (x1, y1, x2, y2) = (x1 * w_ratio, y1 * h_ratio, x2 * w_ratio, y2 * h_ratio);

    t.boxes = if box_normalization {
        t.coords = BoxCoords::Normalized;
        let (w, h) = (new_w as f32, new_h as f32);
        components_to_boxes(x1 / w, y1 / h, x2 / w, y2 / h)
    } else {
        components_to_boxes(x1, y1, x2, y2)
    };
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Resizes the image and rescales its bounding boxes to match.
    ///
    /// # Parameters
    ///
    /// * `target` – Shorter-side length or an exact `(height, width)`.
    /// * `max_size` – Cap on the longer side, only used with [`ResizeTarget::Shorter`].
    /// * `box_normalization` – When set, boxes are additionally divided by the new width and
    ///   height so they end up in `[0, 1]`, and the triple is marked as normalized.
    /// * `filter` – Pixel resampling filter.
    ///
    /// # Notes
    ///
    /// - x-coordinates are scaled by the width ratio and y-coordinates by the height ratio,
    ///   so anisotropic resizes keep boxes aligned.
    /// - When the target matches the current extent no resampling happens.
    /// - Labels remain unchanged.
    pub fn resize(
        mut self,
        target: ResizeTarget,
        max_size: Option<usize>,
        box_normalization: bool,
        filter: ResizeFilter,
    ) -> Result<Self> {
        let (image_h, image_w) = self.size();
        let (new_h, new_w) = resize_dims(image_h, image_w, target, max_size)?;

        if (new_h, new_w) != (image_h, image_w) {
            self.image = match filter {
                ResizeFilter::Nearest => self.resample(new_h, new_w, InterpolateMode::Nearest),
                ResizeFilter::Bilinear => {
                    self.resample(new_h, new_w, InterpolateMode::Bilinear)
                }
                ResizeFilter::Bicubic => self.resample(new_h, new_w, InterpolateMode::Bicubic),
                ResizeFilter::Triangle => self.resize_triangular(new_h, new_w)?,
            };
        }

        resize_boxes(&mut self, new_h, new_w, image_h, image_w, box_normalization);

        log::trace!("resized {image_h}x{image_w} -> {new_h}x{new_w}");

        Ok(self)
    }

    fn resample(&self, new_h: usize, new_w: usize, mode: InterpolateMode) -> Tensor<B, 3> {
        interpolate(
            self.image.clone().unsqueeze::<4>(),
            [new_h, new_w],
            InterpolateOptions::new(mode),
        )
        .squeeze::<3>(0)
        .clamp(0.0, MAX_PIXEL_VAL)
    }

    /// Resamples with the `image` crate's triangle filter. Runs on the CPU.
    fn resize_triangular(&self, new_h: usize, new_w: usize) -> Result<Tensor<B, 3>> {
        let image = DynamicImage::from(self.to_rgb_image()?)
            .resize_exact(
                new_w as u32,
                new_h as u32,
                image::imageops::FilterType::Triangle,
            )
            .to_rgb8();

        Ok(rgb_img_as_tensor(image, &self.device))
    }
}
