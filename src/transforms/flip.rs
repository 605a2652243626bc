use crate::{
    boxes::{BoxCoords, boxes_to_components, components_to_boxes},
    error::Result,
    transforms::pipeline::Transform,
};
use burn::prelude::Backend;
use rand::Rng;

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Horizontally flips a 3-channel image tensor and its associated bounding boxes.
    ///
    /// This transformation mirrors the input image along the vertical axis (left ↔ right)
    /// and adjusts bounding boxes to maintain alignment with objects in the flipped image.
    ///
    /// # Notes
    ///
    /// - The flip is applied along the width dimension (`W`), reversing the left–right order of
    ///   pixels.
    /// - `new_x1 = W - x2` and `new_x2 = W - x1`; `y` coordinates remain unchanged. For
    ///   normalized boxes the mirror axis is `1.0` instead of `W`.
    /// - Flipping twice restores the original image and boxes.
    pub fn horizontal_flip(mut self) -> Self {
        let [_ch, _height, width] = self.image.dims();

        self.image = self.image.flip([2]);
        if self.is_empty() {
            return self;
        }

        let extent = match self.coords {
            BoxCoords::Absolute => width as f32,
            BoxCoords::Normalized => 1.0,
        };

        let (x1, y1, x2, y2) = boxes_to_components(self.boxes);
        self.boxes = components_to_boxes(
            x2.neg().add_scalar(extent),
            y1,
            x1.neg().add_scalar(extent),
            y2,
        );

        self
    }

    /// Flips the image and its bounding boxes horizontally with probability `p`.
    ///
    /// # Arguments
    ///
    /// * `p` – Probability (`0.0 ≤ p ≤ 1.0`) that the horizontal flip is applied.
    ///
    /// # Notes
    ///
    /// - If the transformation is skipped (based on probability `p`), the image and
    ///   bounding boxes remain unchanged.
    /// - Fails if `p` is not within `[0, 1]`.
    pub fn random_horizontal_flip(mut self, p: f32) -> Result<Self> {
        if !self.should_apply(p)? {
            return Ok(self);
        }
        Ok(self.horizontal_flip())
    }
}
