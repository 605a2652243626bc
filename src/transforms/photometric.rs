use crate::{boxes::Region, error::Result};

use super::pipeline::{MAX_PIXEL_VAL, Transform};
use burn::{
    prelude::Backend,
    tensor::{Tensor, cast::ToElement, s},
};
use rand::{Rng, seq::SliceRandom};

/// Largest hue shift drawn by [`Transform::photometric_distort`], as a fraction of a full
/// turn of the colour wheel.
pub const HUE_DELTA: f32 = 18.0 / 255.0;

/// Range of the brightness, contrast and saturation factors drawn by
/// [`Transform::photometric_distort`].
pub const FACTOR_RANGE: (f32, f32) = (0.5, 1.5);

/// One colour adjustment of the photometric distortion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Distortion {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

impl Distortion {
    pub const ALL: [Distortion; 4] = [
        Distortion::Brightness,
        Distortion::Contrast,
        Distortion::Saturation,
        Distortion::Hue,
    ];
}

/// Luma of a `[3, H, W]` image as a `[1, H, W]` tensor.
fn grayscale<B: Backend>(image: Tensor<B, 3>) -> Tensor<B, 3> {
    let red = image.clone().slice(s![0..1]);
    let green = image.clone().slice(s![1..2]);
    let blue = image.slice(s![2..3]);

    red.mul_scalar(0.299)
        .add(green.mul_scalar(0.587))
        .add(blue.mul_scalar(0.114))
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Scales every pixel by `factor`.
    ///
    /// `1.0` leaves the image unchanged, `0.0` gives a black image. Bounding boxes are not
    /// touched.
    pub fn adjust_brightness(mut self, factor: f32) -> Self {
        self.image = self
            .image
            .mul_scalar(factor.max(0.0))
            .clamp(0.0, MAX_PIXEL_VAL);
        self
    }

    /// Blends the image with its mean gray level.
    ///
    /// `1.0` leaves the image unchanged, `0.0` gives a flat gray image and larger values
    /// push pixels away from the mean.
    pub fn adjust_contrast(mut self, factor: f32) -> Self {
        let factor = factor.max(0.0);
        let mean = grayscale(self.image.clone()).mean().into_scalar().to_f32();

        self.image = self
            .image
            .mul_scalar(factor)
            .add_scalar((1.0 - factor) * mean)
            .clamp(0.0, MAX_PIXEL_VAL);
        self
    }

    /// Blends every pixel with its own gray level.
    ///
    /// `1.0` leaves the image unchanged and `0.0` gives the grayscale image.
    pub fn adjust_saturation(mut self, factor: f32) -> Self {
        let factor = factor.max(0.0);
        let gray = grayscale(self.image.clone()).mul_scalar(1.0 - factor);

        self.image = self
            .image
            .mul_scalar(factor)
            .add(gray)
            .clamp(0.0, MAX_PIXEL_VAL);
        self
    }

    /// Rotates the hue of the image.
    ///
    /// The rotation is applied directly in RGB space with a luma-preserving rotation matrix
    /// instead of converting to HSV.
    ///
    /// # Parameters
    ///
    /// * `factor` – Fraction of a full turn, in `[-0.5, 0.5]`. Positive values rotate
    ///   clockwise.
    pub fn adjust_hue(mut self, factor: f32) -> Self {
        let angle = (factor.clamp(-0.5, 0.5) * 360.0).to_radians();
        let cosv = angle.cos();
        let sinv = angle.sin();

        let coeffs: [f32; 9] = [
            // Reds
            0.213 + cosv * 0.787 - sinv * 0.213,
            0.715 - cosv * 0.715 - sinv * 0.715,
            0.072 - cosv * 0.072 + sinv * 0.928,
            // Greens
            0.213 - cosv * 0.213 + sinv * 0.143,
            0.715 + cosv * 0.285 + sinv * 0.140,
            0.072 - cosv * 0.072 - sinv * 0.283,
            // Blues
            0.213 - cosv * 0.213 - sinv * 0.787,
            0.715 - cosv * 0.715 + sinv * 0.715,
            0.072 + cosv * 0.928 + sinv * 0.072,
        ];

        let chunks = self.image.split(1, 0);

        let mix = |row: &[f32]| {
            chunks[0]
                .clone()
                .mul_scalar(row[0])
                .add(chunks[1].clone().mul_scalar(row[1]))
                .add(chunks[2].clone().mul_scalar(row[2]))
        };

        let red = mix(&coeffs[0..3]);
        let green = mix(&coeffs[3..6]);
        let blue = mix(&coeffs[6..9]);

        self.image = Tensor::cat(vec![red, green, blue], 0).clamp(0.0, MAX_PIXEL_VAL);
        self
    }

    /// Applies brightness, contrast, saturation and hue adjustments in a random order.
    ///
    /// Brightness, contrast and saturation factors are drawn from `[0.5, 1.5]`, the hue
    /// factor from `[-18/255, 18/255]`, each independently per call.
    ///
    /// By default all four adjustments run once the order is shuffled. With
    /// `per_effect_p = Some(p)`, each adjustment is instead skipped unless its own draw
    /// falls below `p`.
    ///
    /// Bounding boxes and labels pass through unmodified. Fails if `per_effect_p` is outside
    /// `[0, 1]`.
    pub fn photometric_distort(mut self, per_effect_p: Option<f32>) -> Result<Self> {
        let mut effects = Distortion::ALL;
        effects.shuffle(&mut self.rng);

        for effect in effects {
            if let Some(p) = per_effect_p {
                if !self.should_apply(p)? {
                    continue;
                }
            }

            self = match effect {
                Distortion::Brightness => {
                    let factor = self.rng.random_range(FACTOR_RANGE.0..=FACTOR_RANGE.1);
                    self.adjust_brightness(factor)
                }
                Distortion::Contrast => {
                    let factor = self.rng.random_range(FACTOR_RANGE.0..=FACTOR_RANGE.1);
                    self.adjust_contrast(factor)
                }
                Distortion::Saturation => {
                    let factor = self.rng.random_range(FACTOR_RANGE.0..=FACTOR_RANGE.1);
                    self.adjust_saturation(factor)
                }
                Distortion::Hue => {
                    let factor = self.rng.random_range(-HUE_DELTA..=HUE_DELTA);
                    self.adjust_hue(factor)
                }
            };
        }

        log::trace!("photometric distortion order {effects:?}");

        Ok(self)
    }

    /// Applies [`Transform::photometric_distort`] with probability `p`.
    pub fn random_photometric_distort(
        mut self,
        p: f32,
        per_effect_p: Option<f32>,
    ) -> Result<Self> {
        if !self.should_apply(p)? {
            return Ok(self);
        }
        self.photometric_distort(per_effect_p)
    }

    /// Computes the average complementary color for a region of the image. Used to pick an
    /// overlay colour that stands out from the area below it.
    pub fn complementary(&self, region: &Region) -> Result<[u8; 3]> {
        let section = self.crop_area(region)?;
        let means = section.mean_dim(2).mean_dim(1).flatten::<1>(0, 2);

        let mut color = [0u8; 3];
        for (c, out) in color.iter_mut().enumerate() {
            let mean = means.clone().slice(s![c]).into_scalar().to_f32();
            *out = 255 - mean.clamp(0.0, MAX_PIXEL_VAL) as u8;
        }

        Ok(color)
    }
}
