use crate::{
    boxes::{BoxCoords, boxes_to_components, components_to_boxes},
    error::{Result, invalid_config},
};

use super::pipeline::{MAX_PIXEL_VAL, Transform};
use burn::{
    prelude::Backend,
    tensor::{Device, Tensor},
};
use rand::Rng;

// ImageNet mean and std values

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Clone, Debug)]
pub struct ImageNormalizer<B: Backend> {
    pub mean: Tensor<B, 3>,
    pub std: Tensor<B, 3>,
}

impl<B: Backend> ImageNormalizer<B> {
    /// Creates a new normalizer from per-channel statistics.
    ///
    /// Fails if any standard deviation is zero or not finite.
    pub fn new(mean: [f32; 3], std: [f32; 3], device: &Device<B>) -> Result<Self> {
        if std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(invalid_config(format!(
                "normalization std must be finite and non-zero, got {std:?}"
            )));
        }

        let mean = Tensor::<B, 1>::from_floats(mean, device).reshape([3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(std, device).reshape([3, 1, 1]);
        Ok(Self { mean, std })
    }

    /// A normalizer with the ImageNet statistics.
    pub fn imagenet(device: &Device<B>) -> Self {
        let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, device).reshape([3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, device).reshape([3, 1, 1]);
        Self { mean, std }
    }

    /// Normalizes the input image.
    ///
    /// The input image should be in the range [0, 1].
    ///
    /// The normalization is done according to the following formula:
    /// `input = (input - mean) / std`
    pub fn normalize(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        (input - self.mean.clone()) / self.std.clone()
    }
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Scales pixels to `[0, 1]` and standardizes each channel with `mean` and `std`.
    ///
    /// Bounding boxes and labels are not touched. This is meant to be the last image
    /// stage; later photometric stages would see values outside `0..=255`.
    pub fn normalize_image(mut self, mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        let normalizer = ImageNormalizer::new(mean, std, &self.device)?;

        self.image = normalizer.normalize(self.image.div_scalar(MAX_PIXEL_VAL));

        Ok(self)
    }

    /// Converts absolute pixel boxes into fractions of the current image size.
    ///
    /// Normalizes the bounding boxes for this image to `[0, 1]` so they match resolution
    /// independent anchors. Boxes that are already normalized are left alone.
    pub fn normalize_boxes(mut self) -> Self {
        if self.coords == BoxCoords::Normalized {
            return self;
        }

        if self.is_empty() {
            self.coords = BoxCoords::Normalized;
            return self;
        }

        let (height, width) = self.size();
        let (x1, y1, x2, y2) = boxes_to_components(self.boxes);
        let (w, h) = (width as f32, height as f32);

        self.boxes = components_to_boxes(x1 / w, y1 / h, x2 / w, y2 / h);
        self.coords = BoxCoords::Normalized;

        self
    }
}
