use burn::tensor::{Int, Tensor, TensorData, backend::Backend};
use image::RgbImage;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::boxes::BoxCoords;
use crate::error::{AugmentError, Result};

/// Maximum pixel value for a RGB8 pixel
pub const MAX_PIXEL_VAL: f32 = 255.0;

/// Fails unless `p` is a probability in `[0, 1]`.
pub(crate) fn check_probability(name: &str, p: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(AugmentError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {p}"
        )));
    }
    Ok(())
}

/// The (image, boxes, labels) triple threaded through every augmentation stage.
///
/// `Transform` wraps an image tensor along with its bounding boxes and labels, providing
/// a unified interface for the detection augmentations:
/// - Photometric adjustments (brightness, contrast, saturation, hue)
/// - Geometric transformations (flip, crop, zoom-in, zoom-out, resize)
/// - Normalization and sanitization of bounding boxes
///
/// Every geometric operation moves the boxes together with the pixels, and every operation
/// that drops boxes drops the matching labels with them.
///
/// # Type Parameters
///
/// * `B` – The backend used for tensor operations, implementing the `Backend` trait.
/// * `R` – Random number generator used for stochastic augmentations (default: `StdRng`).
///
/// # Fields
///
/// * `image` – The 3-channel image tensor in `[C, H, W]` format, pixel values in `0..=255`.
/// * `boxes` – Tensor of bounding boxes in `[N, 4]` format (`[x1, y1, x2, y2]`).
/// * `labels` – Tensor of class labels for the bounding boxes, shape `[N]`.
/// * `coords` – Whether `boxes` are absolute pixels or fractions of the image extent.
/// * `device` – Backend device where tensors reside (CPU or GPU).
/// * `rng` – Random number generator for stochastic transformations.
#[derive(Clone, Debug)]
pub struct Transform<B, R = StdRng>
where
    B: Backend,
    R: Rng,
{
    pub image: Tensor<B, 3>,
    pub boxes: Tensor<B, 2>,
    pub labels: Tensor<B, 1, Int>,
    pub coords: BoxCoords,
    pub device: <B as Backend>::Device,
    pub rng: R,
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Creates a new [`Transform`] with an explicitly provided random number generator (`rng`).
    ///
    /// # Parameters
    /// - `image`: A `[3, H, W]` tensor. The device of this tensor is captured and stored in
    ///   the transform.
    /// - `boxes`: A `[N, 4]` tensor of absolute pixel boxes.
    /// - `labels`: A `[N]` tensor of integer labels, one per box.
    /// - `rng`: A user-supplied random number generator implementing [`rand::Rng`].
    ///   This enables deterministic or customized random behavior.
    ///
    /// # Errors
    /// Fails if the image is not 3-channel, the boxes are not `[N, 4]`, or the number of
    /// labels differs from the number of boxes.
    ///
    /// # Examples
    /// ```ignore
    /// use rand::rngs::StdRng;
    /// use rand::SeedableRng;
    ///
    /// let rng = StdRng::seed_from_u64(42);
    /// let transform = Transform::new_seeded(image, boxes, labels, rng)?;
    /// ```
    pub fn new_seeded(
        image: Tensor<B, 3>,
        boxes: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
        rng: R,
    ) -> Result<Self> {
        let [ch, height, width] = image.dims();
        if ch != 3 || height == 0 || width == 0 {
            return Err(AugmentError::InvalidImageShape {
                dims: [ch, height, width],
            });
        }

        let device = image.device();
        let t = Self {
            image,
            boxes,
            labels,
            coords: BoxCoords::Absolute,
            device,
            rng,
        };
        t.check_aligned()?;

        Ok(t)
    }

    /// Number of detections carried by the triple.
    pub fn len(&self) -> usize {
        self.boxes.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image `(height, width)`.
    pub fn size(&self) -> (usize, usize) {
        let [_ch, height, width] = self.image.dims();
        (height, width)
    }

    /// Returns a boolean result based on a uniform random probability.
    ///
    /// # Arguments
    ///
    /// * `p` – The probability (between 0.0 and 1.0) that the function will return `true`.
    ///
    /// # Remarks
    ///
    /// - If `p` is 0.0, the function will always return `false`.
    /// - If `p` is 1.0, the function will always return `true`.
    /// - Values outside the range [0.0, 1.0], and NaN, are rejected with
    ///   [`AugmentError::InvalidConfig`] before anything is drawn.
    pub fn should_apply(&mut self, p: f32) -> Result<bool> {
        check_probability("p", p)?;
        Ok(self.rng.random::<f32>() < p)
    }

    /// Fails with [`AugmentError::Misaligned`] unless there is exactly one label per box.
    pub fn check_aligned(&self) -> Result<()> {
        let [n, cols] = self.boxes.dims();
        if cols != 4 {
            return Err(AugmentError::InvalidBoxShape { dims: [n, cols] });
        }

        let [n_labels] = self.labels.dims();
        if n != n_labels {
            return Err(AugmentError::Misaligned {
                boxes: n,
                labels: n_labels,
            });
        }
        Ok(())
    }

    /// Fails with [`AugmentError::NormalizedBoxes`] when the boxes are not in pixel space.
    pub(crate) fn require_absolute(&self, op: &'static str) -> Result<()> {
        match self.coords {
            BoxCoords::Absolute => Ok(()),
            BoxCoords::Normalized => Err(AugmentError::NormalizedBoxes { op }),
        }
    }

    /// Finalizes a chained transformation pipeline and returns the processed data
    /// in its raw form.
    ///
    /// This method consumes the transformation pipeline and produces the final
    /// outputs:
    /// - The transformed image tensor of shape `[3, H, W]`.
    /// - Bounding boxes tensor of shape `[N, 4]`, in `[x1, y1, x2, y2]` format.
    /// - Labels tensor of shape `[N]`, containing integer class identifiers.
    ///
    /// `N` may be zero when every box was cropped away.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (image, boxes, labels) = t
    ///     .random_horizontal_flip(0.5)?
    ///     .random_zoom_out(3.0, 0.5)?
    ///     .random_photometric_distort(0.5, None)?
    ///     .finish();
    /// ```
    pub fn finish(self) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 1, Int>) {
        (self.image, self.boxes, self.labels)
    }

    /// Converts the image tensor back into an `image::RgbImage`.
    ///
    /// Pixel values are truncated to `u8`; values outside `0..=255` saturate.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let [_ch, height, width] = self.image.dims();

        let buf: Vec<u8> = self
            .image
            .clone()
            .permute([1, 2, 0])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| AugmentError::TensorData(format!("{e:?}")))?
            .iter()
            .map(|&p| p as u8)
            .collect();

        RgbImage::from_vec(width as u32, height as u32, buf).ok_or(
            AugmentError::InvalidImageShape {
                dims: [3, height, width],
            },
        )
    }
}

impl<B: Backend> Transform<B> {
    /// Creates a new instance directly from tensors, seeding the generator from the OS.
    ///
    /// # Arguments
    /// * `image` - A 3D tensor representing the image, shaped as `[channels, height, width]`.
    /// * `boxes` - A 2D tensor of bounding boxes, shaped as `[num_boxes, 4]`.
    /// * `labels` - A 1D integer tensor containing class labels for each bounding box.
    pub fn from_tensors(
        image: Tensor<B, 3>,
        boxes: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
    ) -> Result<Self> {
        Self::new_seeded(image, boxes, labels, StdRng::from_os_rng())
    }

    /// Creates a new instance from an `RgbImage`, its bounding boxes and labels.
    ///
    /// # Arguments
    /// * `image` - An `RgbImage` from the `image` crate, representing the raw RGB input image.
    /// * `boxes` - A 2D tensor of bounding boxes, shaped as `[num_boxes, 4]`.
    /// * `labels` - A 1D integer tensor of class labels corresponding to the bounding boxes.
    /// * `device` - The backend device where the image tensor should be allocated.
    pub fn new(
        image: RgbImage,
        boxes: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
        device: &<B as Backend>::Device,
    ) -> Result<Self> {
        let image = rgb_img_as_tensor(image, device);
        Self::new_seeded(image, boxes, labels, StdRng::from_os_rng())
    }
}

/// Converts an `image::RgbImage` into a 3-channel tensor in `[C, H, W]` format.
///
/// # Notes
///
/// - No normalization or scaling is applied; pixel values remain in the `0–255` range.
/// - The channel-first format `[C, H, W]` is standard for deep learning frameworks.
pub fn rgb_img_as_tensor<B: Backend>(image: RgbImage, device: &B::Device) -> Tensor<B, 3> {
    let (width, height) = image.dimensions();
    let img_vec: Vec<f32> = image.into_raw().iter().map(|&p| p as f32).collect();
    Tensor::<B, 3>::from_data(
        TensorData::new(img_vec, [height as usize, width as usize, 3]).convert::<B::FloatElem>(),
        device,
    )
    .permute([2, 0, 1])
}

/// Creates an RGB test image filled with a single colour.
///
/// # Arguments
///
/// * `width` – The width of the image in pixels.
/// * `height` – The height of the image in pixels.
/// * `pattern` – A 3-element array representing the RGB colour of every pixel.
pub fn create_test_image(width: u32, height: u32, pattern: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, image::Rgb(pattern))
}
