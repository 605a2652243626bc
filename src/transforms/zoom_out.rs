use crate::{
    boxes::translate_boxes,
    error::{AugmentError, Result, invalid_config},
};

use super::pipeline::Transform;
use burn::{prelude::Backend, tensor::Tensor};
use rand::Rng;

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Per-channel mean pixel value of the image.
    pub fn channel_means(&self) -> Result<Vec<f32>> {
        self.image
            .clone()
            .mean_dim(2)
            .mean_dim(1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| AugmentError::TensorData(format!("{e:?}")))
    }

    /// Applies a "zoom out" transformation by placing the image on a larger canvas and
    /// shifting its bounding boxes, as described in the *SSD: Single Shot MultiBox Detector*
    /// paper.
    ///
    /// A scale is drawn uniformly from `[1, max_scale]` and the canvas is that many times
    /// the original height and width. The canvas is filled with the image's per-channel
    /// mean so the border does not introduce a hard edge, and the original is pasted at a
    /// random offset where it fits entirely.
    ///
    /// # Notes
    ///
    /// - Boxes are translated by the paste offset; none are dropped and their sizes are
    ///   unchanged.
    /// - Fails if `max_scale` is below `1` or not finite, or if the boxes are normalized.
    pub fn zoom_out(mut self, max_scale: f32) -> Result<Self> {
        if !max_scale.is_finite() || max_scale < 1.0 {
            return Err(invalid_config(format!(
                "zoom out max_scale must be finite and at least 1.0, got {max_scale}"
            )));
        }
        self.require_absolute("zoom_out")?;

        let [_ch, height, width] = self.image.dims();

        let scale = self.rng.random_range(1.0..=max_scale);
        let canvas_width = ((width as f32 * scale) as usize).max(width);
        let canvas_height = ((height as f32 * scale) as usize).max(height);

        // Float to int casts saturate, so an absurd scale shows up as an overflowing canvas.
        if canvas_height
            .checked_mul(canvas_width)
            .and_then(|n| n.checked_mul(3))
            .is_none()
        {
            return Err(invalid_config(format!(
                "zoom out canvas of {canvas_height}x{canvas_width} is too large"
            )));
        }

        let left = self.rng.random_range(0..=canvas_width - width);
        let top = self.rng.random_range(0..=canvas_height - height);
        let right = canvas_width - (left + width);
        let bottom = canvas_height - (top + height);

        // Pad each channel with its own mean
        let means = self.channel_means()?;
        let channels = self
            .image
            .split(1, 0)
            .into_iter()
            .zip(means)
            .map(|(channel, mean)| channel.pad((left, right, top, bottom), mean))
            .collect();

        self.image = Tensor::cat(channels, 0);
        self.boxes = translate_boxes(self.boxes, left as f32, top as f32);

        log::trace!(
            "zoomed out {height}x{width} onto {canvas_height}x{canvas_width} at ({left}, {top})"
        );

        Ok(self)
    }

    /// Applies [`Transform::zoom_out`] with probability `p`.
    pub fn random_zoom_out(mut self, max_scale: f32, p: f32) -> Result<Self> {
        if !self.should_apply(p)? {
            return Ok(self);
        }
        self.zoom_out(max_scale)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::boxes::{boxes_from_slice, boxes_to_vec, labels_from_slice, labels_to_vec};
    use crate::transforms::pipeline::{create_test_image, rgb_img_as_tensor};

    type B = NdArray<f32>;

    fn sample(seed: u64, device: &NdArrayDevice) -> Transform<B> {
        let mut image = create_test_image(16, 12, [100, 50, 200]);
        for x in 0..16 {
            image.put_pixel(x, 0, image::Rgb([0, 250, 0]));
        }

        Transform::new_seeded(
            rgb_img_as_tensor::<B>(image, device),
            boxes_from_slice::<B>(&[[2.0, 3.0, 10.0, 9.0], [0.0, 0.0, 16.0, 12.0]], device),
            labels_from_slice::<B>(&[4, 5], device),
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    #[test]
    fn zoom_out_keeps_every_box_inside_the_canvas() {
        let device = &NdArrayDevice::default();

        for seed in 0..20 {
            let original = sample(seed, device);
            let before = boxes_to_vec(original.boxes.clone()).unwrap();

            let t = original.zoom_out(3.0).unwrap();
            let (height, width) = t.size();
            assert!((12..=36).contains(&height));
            assert!((16..=48).contains(&width));

            let after = boxes_to_vec(t.boxes.clone()).unwrap();
            assert_eq!(after.len(), before.len());

            // The whole-image box tells us where the original was pasted.
            let [left, top, right, bottom] = after[1];
            assert!(left >= 0.0 && top >= 0.0);
            assert!(right <= width as f32 && bottom <= height as f32);

            for (a, b) in after.iter().zip(before.iter()) {
                assert_eq!(a[0] - b[0], left);
                assert_eq!(a[1] - b[1], top);
                assert_eq!(a[2] - a[0], b[2] - b[0]);
                assert_eq!(a[3] - a[1], b[3] - b[1]);
            }

            // The original pixels sit untouched at the paste offset.
            let (top, bottom) = (top as usize, bottom as usize);
            let (left, right) = (left as usize, right as usize);
            let pasted = t.image.clone().slice([0..3, top..bottom, left..right]);
            pasted
                .to_data()
                .assert_eq(&sample(seed, device).image.to_data(), true);

            assert_eq!(labels_to_vec(t.labels).unwrap(), vec![4, 5]);
        }
    }

    #[test]
    fn zoom_out_fills_with_channel_mean() {
        let device = &NdArrayDevice::default();

        let t = Transform::new_seeded(
            rgb_img_as_tensor::<B>(create_test_image(4, 4, [10, 20, 30]), device),
            boxes_from_slice::<B>(&[[0.0, 0.0, 4.0, 4.0]], device),
            labels_from_slice::<B>(&[1], device),
            StdRng::seed_from_u64(11),
        )
        .unwrap()
        .zoom_out(4.0)
        .unwrap();

        // A flat image padded with its own mean stays flat.
        let image = t.to_rgb_image().unwrap();
        assert!(image.pixels().all(|p| p.0 == [10, 20, 30]));
    }

    #[test]
    fn zoom_out_rejects_shrinking_scale() {
        let device = &NdArrayDevice::default();

        assert!(matches!(
            sample(0, device).zoom_out(0.5),
            Err(AugmentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zoom_out_rejects_non_finite_scale() {
        let device = &NdArrayDevice::default();

        for max_scale in [f32::INFINITY, f32::NAN] {
            assert!(matches!(
                sample(0, device).zoom_out(max_scale),
                Err(AugmentError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn zoom_out_rejects_overflowing_canvas() {
        let device = &NdArrayDevice::default();

        assert!(matches!(
            sample(0, device).zoom_out(f32::MAX),
            Err(AugmentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zoom_out_with_unit_scale_is_identity() {
        let device = &NdArrayDevice::default();

        let t = sample(1, device).zoom_out(1.0).unwrap();

        assert_eq!(t.size(), (12, 16));
        t.image
            .to_data()
            .assert_eq(&sample(1, device).image.to_data(), true);
    }
}
