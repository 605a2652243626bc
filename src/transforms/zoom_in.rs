use crate::{
    boxes::{
        Region, boxes_to_components, centers_inside, components_to_boxes, count_true,
        jaccard_overlap, retain,
    },
    error::{Result, invalid_config},
};

use super::pipeline::Transform;
use burn::{
    prelude::Backend,
    tensor::{Bool, Tensor, cast::ToElement},
};
use rand::Rng;

/// Minimum overlap thresholds drawn by the zoom-in search. `None` means "do not crop".
pub const MIN_OVERLAPS: [Option<f32>; 6] = [
    Some(0.1),
    Some(0.3),
    Some(0.5),
    Some(0.7),
    Some(0.9),
    None,
];

/// Smallest crop side as a fraction of the image side.
const MIN_CROP_SCALE: f32 = 0.5;

/// A crop window accepted by the zoom-in search.
#[derive(Clone, Debug)]
pub struct ZoomInWindow<B: Backend> {
    pub region: Region,
    /// The threshold this window was accepted under.
    pub min_overlap: f32,
    /// Largest jaccard overlap between the window and any box.
    pub max_overlap: f32,
    /// Boxes whose centre lies strictly inside the window.
    pub keep: Tensor<B, 1, Bool>,
}

/// Result of the zoom-in search.
#[derive(Clone, Debug)]
pub enum ZoomInSample<B: Backend> {
    /// A window satisfying the drawn overlap threshold was found.
    Crop(ZoomInWindow<B>),
    /// The "no crop" threshold was drawn.
    Skip,
    /// Every attempt ran out of trials.
    Exhausted,
}

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Searches for a zoom-in crop window.
    ///
    /// Each attempt draws a minimum overlap from [`MIN_OVERLAPS`]. Drawing `None` ends the
    /// search with [`ZoomInSample::Skip`]. Otherwise up to `max_trials` windows are sampled:
    /// each side is scaled by a factor in `[0.5, 1]`, windows with an aspect ratio outside
    /// `(0.5, 2)` are rejected, and a window is accepted when its best jaccard overlap with
    /// the boxes reaches the threshold and at least one box centre lies strictly inside it.
    /// After `max_attempts` attempts without success the search gives up.
    ///
    /// An empty box set can never produce a window, so it is reported as a skip.
    pub fn sample_zoom_in(
        &mut self,
        max_trials: usize,
        max_attempts: usize,
    ) -> Result<ZoomInSample<B>> {
        if max_trials == 0 || max_attempts == 0 {
            return Err(invalid_config(
                "zoom in max_trials and max_attempts must be positive",
            ));
        }
        self.require_absolute("zoom_in")?;

        if self.is_empty() {
            return Ok(ZoomInSample::Skip);
        }

        let [_ch, height, width] = self.image.dims();

        for _ in 0..max_attempts {
            let Some(min_overlap) = MIN_OVERLAPS[self.rng.random_range(0..MIN_OVERLAPS.len())]
            else {
                return Ok(ZoomInSample::Skip);
            };

            for _ in 0..max_trials {
                let scale_h = self.rng.random_range(MIN_CROP_SCALE..=1.0);
                let scale_w = self.rng.random_range(MIN_CROP_SCALE..=1.0);
                let new_h = (scale_h * height as f32) as usize;
                let new_w = (scale_w * width as f32) as usize;

                if new_h == 0 || new_w == 0 {
                    continue;
                }

                let aspect_ratio = new_h as f32 / new_w as f32;
                if !(0.5 < aspect_ratio && aspect_ratio < 2.0) {
                    continue;
                }

                let left = self.rng.random_range(0..=width - new_w);
                let top = self.rng.random_range(0..=height - new_h);
                let region = Region::new(top, left, new_h, new_w);

                let max_overlap = jaccard_overlap(region.as_xyxy(), self.boxes.clone())
                    .max()
                    .into_scalar()
                    .to_f32();

                if max_overlap < min_overlap {
                    continue;
                }

                let keep = centers_inside(self.boxes.clone(), &region);
                if count_true(keep.clone()) == 0 {
                    continue;
                }

                return Ok(ZoomInSample::Crop(ZoomInWindow {
                    region,
                    min_overlap,
                    max_overlap,
                    keep,
                }));
            }
        }

        Ok(ZoomInSample::Exhausted)
    }

    /// Crops to an accepted zoom-in window.
    ///
    /// Boxes not selected by the window's mask are dropped together with their labels.
    /// Surviving boxes are clamped to the window and moved into its local frame, so they lie
    /// within `[0, width] x [0, height]` of the new image.
    pub fn apply_zoom_in(mut self, window: ZoomInWindow<B>) -> Result<Self> {
        let region = window.region;
        let cropped = self.crop_area(&region)?;

        let (boxes, labels) = retain(self.boxes, self.labels, window.keep)?;

        let [left, top, right, bottom] = region.as_xyxy();
        let (x1, y1, x2, y2) = boxes_to_components(boxes);

        self.boxes = components_to_boxes(
            x1.clamp_min(left).sub_scalar(left),
            y1.clamp_min(top).sub_scalar(top),
            x2.clamp_max(right).sub_scalar(left),
            y2.clamp_max(bottom).sub_scalar(top),
        );
        self.labels = labels;
        self.image = cropped;

        Ok(self)
    }

    /// Zooms in with an overlap-constrained random crop.
    ///
    /// Runs [`Transform::sample_zoom_in`] and crops to the window it finds. When the search
    /// draws "no crop" or exhausts its attempts, the triple is returned unchanged.
    ///
    /// # Arguments
    ///
    /// * `max_trials` – Windows sampled per drawn overlap threshold.
    /// * `max_attempts` – Bound on the number of thresholds drawn.
    pub fn zoom_in(mut self, max_trials: usize, max_attempts: usize) -> Result<Self> {
        match self.sample_zoom_in(max_trials, max_attempts)? {
            ZoomInSample::Crop(window) => {
                log::trace!(
                    "zoom in to {:?} (overlap {:.2} >= {:.2})",
                    window.region,
                    window.max_overlap,
                    window.min_overlap
                );
                self.apply_zoom_in(window)
            }
            ZoomInSample::Skip => Ok(self),
            ZoomInSample::Exhausted => {
                log::debug!(
                    "zoom in found no valid window after {max_attempts} attempts of \
                     {max_trials} trials, leaving the sample uncropped"
                );
                Ok(self)
            }
        }
    }

    /// Applies [`Transform::zoom_in`] with probability `p`.
    pub fn random_zoom_in(mut self, max_trials: usize, max_attempts: usize, p: f32) -> Result<Self> {
        if !self.should_apply(p)? {
            return Ok(self);
        }
        self.zoom_in(max_trials, max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{NdArray, ndarray::NdArrayDevice};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::boxes::{boxes_from_slice, boxes_to_vec, labels_from_slice, labels_to_vec};
    use crate::debug::assert_approx_eq;
    use crate::error::AugmentError;
    use crate::transforms::pipeline::{create_test_image, rgb_img_as_tensor};
    use crate::transforms::resize::{ResizeFilter, ResizeTarget};

    type B = NdArray<f32>;

    const BOXES: [[f32; 4]; 6] = [
        [12.8, 12.8, 38.4, 38.4],
        [25.6, 32.0, 51.2, 57.6],
        [11.8, 11.0, 102.4, 89.6],
        [44.8, 19.2, 70.4, 44.8],
        [64.0, 76.8, 89.6, 102.4],
        [32.0, 51.2, 57.6, 76.8],
    ];

    fn sample(seed: u64, device: &NdArrayDevice) -> Transform<B> {
        Transform::new_seeded(
            rgb_img_as_tensor::<B>(create_test_image(128, 128, [128, 128, 255]), device),
            boxes_from_slice::<B>(&BOXES, device),
            labels_from_slice::<B>(&[1, 2, 3, 4, 5, 6], device),
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    #[test]
    fn accepted_windows_meet_the_overlap_threshold() {
        let device = &NdArrayDevice::default();
        let mut crops = 0;

        for seed in 0..40 {
            let mut t = sample(seed, device);

            if let ZoomInSample::Crop(window) = t.sample_zoom_in(50, 100).unwrap() {
                crops += 1;
                let region = window.region;

                assert!(region.fits_in(128, 128));
                assert!(region.height >= 64 && region.width >= 64);
                let aspect = region.height as f32 / region.width as f32;
                assert!(0.5 < aspect && aspect < 2.0);

                let best = jaccard_overlap(region.as_xyxy(), t.boxes.clone())
                    .max()
                    .into_scalar()
                    .to_f32();
                assert!(best >= window.min_overlap);
                assert_eq!(best, window.max_overlap);

                // Every kept box has its centre strictly inside the window.
                let keep = window.keep.clone().int().into_data().to_vec::<i64>().unwrap();
                let [left, top, right, bottom] = region.as_xyxy();
                for (i, [x1, y1, x2, y2]) in BOXES.iter().enumerate() {
                    let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
                    let inside = left < cx && cx < right && top < cy && cy < bottom;
                    assert_eq!(keep[i] != 0, inside);
                }
                assert!(keep.iter().any(|&k| k != 0));
            }
        }

        assert!(crops > 0);
    }

    #[test]
    fn zoom_in_keeps_boxes_inside_the_crop() {
        let device = &NdArrayDevice::default();

        for seed in 0..40 {
            let t = sample(seed, device).zoom_in(50, 100).unwrap();
            let (height, width) = t.size();

            let boxes = boxes_to_vec(t.boxes).unwrap();
            let labels = labels_to_vec(t.labels).unwrap();
            assert_eq!(boxes.len(), labels.len());
            assert!(!boxes.is_empty());

            for ([x1, y1, x2, y2], label) in boxes.iter().zip(&labels) {
                assert!(0.0 <= *x1 && x1 <= x2 && *x2 <= width as f32);
                assert!(0.0 <= *y1 && y1 <= y2 && *y2 <= height as f32);
                assert!((1..=6).contains(label));
            }
        }
    }

    #[test]
    fn zoom_in_translates_into_crop_frame() {
        let device = &NdArrayDevice::default();

        let t = sample(5, device);
        let window = ZoomInWindow {
            region: Region::new(10, 20, 60, 80),
            min_overlap: 0.1,
            max_overlap: 0.5,
            keep: centers_inside(t.boxes.clone(), &Region::new(10, 20, 60, 80)),
        };

        let t = t.apply_zoom_in(window).unwrap();

        assert_eq!(t.size(), (60, 80));
        // Only the box centred at (76.8, 89.6) falls outside the window.
        assert_eq!(labels_to_vec(t.labels.clone()).unwrap(), vec![1, 2, 3, 4, 6]);

        let boxes = boxes_to_vec(t.boxes).unwrap();
        let expected = [
            [0.0, 2.8, 18.4, 28.4],
            [5.6, 22.0, 31.2, 47.6],
            [0.0, 1.0, 80.0, 60.0],
            [24.8, 9.2, 50.4, 34.8],
            [12.0, 41.2, 37.6, 60.0],
        ];
        assert_eq!(boxes.len(), expected.len());
        for (a, b) in boxes.iter().zip(expected.iter()) {
            for (x, y) in a.iter().zip(b) {
                assert_approx_eq(x, y, 1e-4);
            }
        }
    }

    #[test]
    fn zoom_in_on_empty_boxes_is_a_no_op() {
        let device = &NdArrayDevice::default();

        let mut t = Transform::new_seeded(
            rgb_img_as_tensor::<B>(create_test_image(32, 32, [1, 2, 3]), device),
            boxes_from_slice::<B>(&[], device),
            labels_from_slice::<B>(&[], device),
            StdRng::seed_from_u64(3),
        )
        .unwrap();

        assert!(matches!(
            t.sample_zoom_in(50, 100).unwrap(),
            ZoomInSample::Skip
        ));
        assert_eq!(t.zoom_in(50, 100).unwrap().size(), (32, 32));
    }

    #[test]
    fn zoom_in_gives_up_after_bounded_attempts() {
        let device = &NdArrayDevice::default();

        // A one pixel box in the corner can never reach an overlap of 0.1 with a window
        // covering at least a quarter of a 64x64 image.
        let mut exhausted = 0;
        for seed in 0..20 {
            let mut t = Transform::new_seeded(
                rgb_img_as_tensor::<B>(create_test_image(64, 64, [1, 2, 3]), device),
                boxes_from_slice::<B>(&[[0.0, 0.0, 1.0, 1.0]], device),
                labels_from_slice::<B>(&[1], device),
                StdRng::seed_from_u64(seed),
            )
            .unwrap();

            match t.sample_zoom_in(5, 3).unwrap() {
                ZoomInSample::Crop(_) => panic!("no window should satisfy the threshold"),
                ZoomInSample::Skip => {}
                ZoomInSample::Exhausted => exhausted += 1,
            }
        }

        assert!(exhausted > 0);
    }

    #[test]
    fn zoom_in_rejects_normalized_boxes() {
        let device = &NdArrayDevice::default();

        let t = sample(0, device)
            .resize(ResizeTarget::Shorter(128), None, true, ResizeFilter::Nearest)
            .unwrap();

        assert!(matches!(
            t.zoom_in(50, 100),
            Err(AugmentError::NormalizedBoxes { op: "zoom_in" })
        ));
    }
}
