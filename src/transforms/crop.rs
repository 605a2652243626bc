use crate::{
    boxes::{Region, boxes_to_components, components_to_boxes, non_degenerate, retain},
    error::{AugmentError, Result, invalid_config},
};

use super::pipeline::Transform;
use burn::{prelude::Backend, tensor::Tensor};
use rand::Rng;

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Extracts `region` from the image tensor without touching the boxes.
    pub fn crop_area(&self, region: &Region) -> Result<Tensor<B, 3>> {
        let [ch, height, width] = self.image.dims();

        if region.height == 0 || region.width == 0 || !region.fits_in(height, width) {
            return Err(AugmentError::RegionOutOfBounds {
                top: region.top,
                left: region.left,
                height: region.height,
                width: region.width,
                image_height: height,
                image_width: width,
            });
        }

        Ok(self.image.clone().slice([
            0..ch,
            region.top..region.bottom(),
            region.left..region.right(),
        ]))
    }

    /// Crops the image to a caller-supplied region and adjusts bounding boxes accordingly.
    ///
    /// Boxes are moved into the crop's local frame and clamped to `[0, width] x [0, height]`.
    /// A box survives only if it still has a positive width and height after clamping;
    /// labels are filtered with the same mask.
    ///
    /// # Notes
    ///
    /// - A region that misses every box yields an empty box and label set, which is a valid
    ///   result.
    /// - Fails if the region is empty or reaches outside the image.
    pub fn crop(mut self, region: Region) -> Result<Self> {
        self.require_absolute("crop")?;
        self.image = self.crop_area(&region)?;
        if self.is_empty() {
            return Ok(self);
        }

        let (x1, y1, x2, y2) = boxes_to_components(self.boxes.clone());
        let (left, top) = (region.left as f32, region.top as f32);
        let (max_x, max_y) = (region.width as f32, region.height as f32);

        let boxes = components_to_boxes(
            x1.sub_scalar(left).clamp(0.0, max_x),
            y1.sub_scalar(top).clamp(0.0, max_y),
            x2.sub_scalar(left).clamp(0.0, max_x),
            y2.sub_scalar(top).clamp(0.0, max_y),
        );

        let keep = non_degenerate(boxes.clone());
        let (boxes, labels) = retain(boxes, self.labels, keep)?;

        self.boxes = boxes;
        self.labels = labels;

        Ok(self)
    }

    /// Crops a randomly sized and placed region.
    ///
    /// The crop width is drawn from `[min_size, min(W, max_size)]`, the height from
    /// `[min_size, min(H, max_size)]`, and the top-left corner uniformly among the positions
    /// where the crop fits. Boxes and labels are then handled as in [`Transform::crop`].
    pub fn random_size_crop(mut self, min_size: usize, max_size: usize) -> Result<Self> {
        if min_size == 0 || min_size > max_size {
            return Err(invalid_config(format!(
                "random size crop needs 0 < min_size <= max_size, got {min_size} and {max_size}"
            )));
        }

        let (height, width) = self.size();
        let max_w = width.min(max_size);
        let max_h = height.min(max_size);

        if min_size > max_w || min_size > max_h {
            return Err(invalid_config(format!(
                "random size crop min_size {min_size} exceeds the {height}x{width} image"
            )));
        }

        let crop_w = self.rng.random_range(min_size..=max_w);
        let crop_h = self.rng.random_range(min_size..=max_h);
        let top = self.rng.random_range(0..=height - crop_h);
        let left = self.rng.random_range(0..=width - crop_w);

        self.crop(Region::new(top, left, crop_h, crop_w))
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{NdArray, ndarray::NdArrayDevice},
        tensor::{Tolerance, ops::FloatElem},
    };
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        boxes::{BoxCoords, boxes_from_slice, boxes_to_vec, labels_from_slice, labels_to_vec},
        debug::set_tensor_dbg_precision,
        transforms::{
            pipeline::{create_test_image, rgb_img_as_tensor},
            resize::{ResizeFilter, ResizeTarget},
        },
    };

    type B = NdArray<f32>;

    #[test]
    fn crop_test() {
        let device = &NdArrayDevice::default();

        set_tensor_dbg_precision(2);

        let image = create_test_image(20, 20, [3, 3, 3]);
        let boxes = boxes_from_slice::<B>(&[[1.0, 1.0, 6.0, 6.0], [1.0, 1.0, 2.0, 2.0]], device);
        let labels = labels_from_slice::<B>(&[1, 2], device);

        let t = Transform::new(image, boxes, labels, device).unwrap();

        let (image, boxes, labels) = t.crop(Region::new(5, 5, 5, 5)).unwrap().finish();

        assert_eq!(image.dims(), [3, 5, 5]);

        Tensor::<B, 2>::from_data([[0.00, 0.00, 1.00, 1.00]], device)
            .into_data()
            .assert_approx_eq::<FloatElem<B>>(&boxes.to_data(), Tolerance::default());
        assert_eq!(labels_to_vec(labels).unwrap(), vec![1]);
    }

    #[test]
    fn crop_clamps_to_region() {
        let device = &NdArrayDevice::default();

        let t = Transform::new(
            create_test_image(20, 20, [3, 3, 3]),
            boxes_from_slice::<B>(&[[2.0, 4.0, 18.0, 19.0]], device),
            labels_from_slice::<B>(&[4], device),
            device,
        )
        .unwrap()
        .crop(Region::new(5, 6, 10, 8))
        .unwrap();

        assert_eq!(t.size(), (10, 8));
        assert_eq!(boxes_to_vec(t.boxes).unwrap(), vec![[0.0, 0.0, 8.0, 10.0]]);
    }

    #[test]
    fn crop_outside_all_boxes_is_empty() {
        let device = &NdArrayDevice::default();

        let t = Transform::new(
            create_test_image(20, 20, [3, 3, 3]),
            boxes_from_slice::<B>(&[[1.0, 1.0, 4.0, 4.0], [0.0, 2.0, 3.0, 5.0]], device),
            labels_from_slice::<B>(&[1, 2], device),
            device,
        )
        .unwrap()
        .crop(Region::new(10, 10, 6, 6))
        .unwrap();

        let (image, boxes, labels) = t.finish();
        assert_eq!(image.dims(), [3, 6, 6]);
        assert_eq!(boxes.dims(), [0, 4]);
        assert_eq!(labels.dims(), [0]);
    }

    #[test]
    fn every_stage_accepts_an_emptied_crop() {
        let device = &NdArrayDevice::default();

        let t = Transform::new_seeded(
            rgb_img_as_tensor::<B>(create_test_image(20, 20, [30, 60, 90]), device),
            boxes_from_slice::<B>(&[[1.0, 1.0, 4.0, 4.0]], device),
            labels_from_slice::<B>(&[1], device),
            StdRng::seed_from_u64(4),
        )
        .unwrap()
        .crop(Region::new(8, 8, 4, 4))
        .unwrap();
        assert!(t.is_empty());

        let t = t
            .horizontal_flip()
            .zoom_out(2.0)
            .unwrap()
            .crop(Region::new(0, 0, 3, 3))
            .unwrap()
            .zoom_in(50, 100)
            .unwrap()
            .resize(ResizeTarget::Shorter(8), None, false, ResizeFilter::Nearest)
            .unwrap()
            .photometric_distort(None)
            .unwrap()
            .clean_boxes()
            .unwrap();

        assert_eq!(t.size(), (8, 8));
        assert_eq!(t.coords, BoxCoords::Absolute);

        let t = t
            .normalize_boxes()
            .horizontal_flip()
            .resize(ResizeTarget::Shorter(4), None, true, ResizeFilter::Bilinear)
            .unwrap()
            .clean_boxes()
            .unwrap();

        assert_eq!(t.coords, BoxCoords::Normalized);
        let (image, boxes, labels) = t.finish();
        assert_eq!(image.dims(), [3, 4, 4]);
        assert_eq!(boxes.dims(), [0, 4]);
        assert_eq!(labels.dims(), [0]);
    }

    #[test]
    fn crop_rejects_overflowing_region() {
        let device = &NdArrayDevice::default();

        let t = Transform::new(
            create_test_image(8, 8, [3, 3, 3]),
            boxes_from_slice::<B>(&[[1.0, 1.0, 4.0, 4.0]], device),
            labels_from_slice::<B>(&[1], device),
            device,
        )
        .unwrap();

        assert!(matches!(
            t.crop(Region::new(usize::MAX, 0, 2, 2)),
            Err(AugmentError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn crop_rejects_out_of_bounds_region() {
        let device = &NdArrayDevice::default();

        let t = Transform::new(
            create_test_image(20, 10, [3, 3, 3]),
            boxes_from_slice::<B>(&[[1.0, 1.0, 4.0, 4.0]], device),
            labels_from_slice::<B>(&[1], device),
            device,
        )
        .unwrap();

        assert!(matches!(
            t.crop(Region::new(5, 15, 4, 10)),
            Err(AugmentError::RegionOutOfBounds {
                image_height: 10,
                image_width: 20,
                ..
            })
        ));
    }

    #[test]
    fn random_size_crop_stays_within_bounds() {
        let device = &NdArrayDevice::default();

        for seed in 0..20 {
            let t = Transform::new_seeded(
                rgb_img_as_tensor::<B>(create_test_image(64, 48, [9, 9, 9]), device),
                boxes_from_slice::<B>(
                    &[[4.0, 4.0, 30.0, 20.0], [20.0, 10.0, 60.0, 40.0]],
                    device,
                ),
                labels_from_slice::<B>(&[1, 2], device),
                StdRng::seed_from_u64(seed),
            )
            .unwrap()
            .random_size_crop(16, 40)
            .unwrap();

            let (height, width) = t.size();
            assert!((16..=40).contains(&height));
            assert!((16..=40).contains(&width));

            let boxes = boxes_to_vec(t.boxes).unwrap();
            let labels = labels_to_vec(t.labels).unwrap();
            assert_eq!(boxes.len(), labels.len());

            for [x1, y1, x2, y2] in boxes {
                assert!(0.0 <= x1 && x1 < x2 && x2 <= width as f32);
                assert!(0.0 <= y1 && y1 < y2 && y2 <= height as f32);
            }
        }
    }

    #[test]
    fn random_size_crop_rejects_bad_sizes() {
        let device = &NdArrayDevice::default();

        let make = || {
            Transform::new(
                create_test_image(32, 32, [0, 0, 0]),
                boxes_from_slice::<B>(&[[1.0, 1.0, 4.0, 4.0]], device),
                labels_from_slice::<B>(&[1], device),
                device,
            )
            .unwrap()
        };

        assert!(matches!(
            make().random_size_crop(20, 10),
            Err(AugmentError::InvalidConfig(_))
        ));
        assert!(matches!(
            make().random_size_crop(40, 64),
            Err(AugmentError::InvalidConfig(_))
        ));
    }
}
