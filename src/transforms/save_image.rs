use std::path::Path;

use crate::{
    boxes::{BoxCoords, Region, boxes_to_vec},
    error::Result,
};

use super::pipeline::Transform;
use burn::prelude::Backend;
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use rand::Rng;

/// Overlay colour used when a box is too thin to sample a complementary colour from.
const FALLBACK_COLOR: [u8; 3] = [255, 0, 0];

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Saves the current image to a file with every bounding box drawn on top.
    ///
    /// # Parameters
    ///
    /// * `path` – File path where the image will be saved. The format follows the extension.
    ///
    /// # Notes
    ///
    /// - Pixel values are converted from `f32` to `u8`, so call this before
    ///   [`Transform::normalize_image`].
    /// - Each box is outlined in the complementary colour of the area it covers.
    /// - Normalized boxes are scaled back to pixels for drawing.
    /// - This operation writes to disk and does not modify the triple.
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut image = self.to_rgb_image()?;
        let (height, width) = self.size();

        let (sx, sy) = match self.coords {
            BoxCoords::Absolute => (1.0, 1.0),
            BoxCoords::Normalized => (width as f32, height as f32),
        };

        for [x1, y1, x2, y2] in boxes_to_vec(self.boxes.clone())? {
            let left = (x1 * sx).floor().clamp(0.0, width as f32) as usize;
            let top = (y1 * sy).floor().clamp(0.0, height as f32) as usize;
            let right = (x2 * sx).ceil().clamp(0.0, width as f32) as usize;
            let bottom = (y2 * sy).ceil().clamp(0.0, height as f32) as usize;

            if right <= left || bottom <= top {
                continue;
            }

            let region = Region::new(top, left, bottom - top, right - left);
            let color = self.complementary(&region).unwrap_or(FALLBACK_COLOR);

            let rect = Rect::at(left as i32, top as i32)
                .of_size(region.width as u32, region.height as u32);

            draw_hollow_rect_mut(&mut image, rect, image::Rgb(color));
        }

        image.save(path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{NdArray, ndarray::NdArrayDevice};

    use crate::boxes::{boxes_from_slice, labels_from_slice};
    use crate::transforms::pipeline::{Transform, create_test_image};

    type B = NdArray<f32>;

    #[test]
    fn save_as_draws_box_outlines() {
        let device = &NdArrayDevice::default();

        let t = Transform::new(
            create_test_image(32, 24, [200, 100, 50]),
            boxes_from_slice::<B>(&[[4.0, 4.0, 20.0, 16.0], [30.0, 2.0, 30.0, 8.0]], device),
            labels_from_slice::<B>(&[1, 2], device),
            device,
        )
        .unwrap();

        let path = std::env::temp_dir().join("detection_transforms_save_as.png");
        t.save_as(&path).unwrap();

        let saved = image::open(&path).unwrap().to_rgb8();
        std::fs::remove_file(&path).ok();

        assert_eq!(saved.dimensions(), (32, 24));
        assert_eq!(saved.get_pixel(4, 4).0, [55, 155, 205]);
        assert_eq!(saved.get_pixel(19, 15).0, [55, 155, 205]);
        assert_eq!(saved.get_pixel(10, 10).0, [200, 100, 50]);
        // The degenerate box is skipped.
        assert_eq!(saved.get_pixel(30, 5).0, [200, 100, 50]);
    }

    #[test]
    fn save_as_scales_normalized_boxes() {
        let device = &NdArrayDevice::default();

        let t = Transform::new(
            create_test_image(20, 10, [0, 0, 0]),
            boxes_from_slice::<B>(&[[10.0, 5.0, 20.0, 10.0]], device),
            labels_from_slice::<B>(&[1], device),
            device,
        )
        .unwrap()
        .normalize_boxes();

        let path = std::env::temp_dir().join("detection_transforms_save_as_normalized.png");
        t.save_as(&path).unwrap();

        let saved = image::open(&path).unwrap().to_rgb8();
        std::fs::remove_file(&path).ok();

        assert_eq!(saved.get_pixel(10, 5).0, [255, 255, 255]);
        assert_eq!(saved.get_pixel(19, 9).0, [255, 255, 255]);
        assert_eq!(saved.get_pixel(5, 2).0, [0, 0, 0]);
    }
}
