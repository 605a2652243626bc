use crate::{
    boxes::{BoxCoords, boxes_to_components, retain},
    error::Result,
};

use super::pipeline::Transform;
use burn::prelude::Backend;
use rand::Rng;

impl<B: Backend, R: Rng> Transform<B, R> {
    /// Validates and filters bounding boxes so that they are well-formed and within image
    /// boundaries.
    ///
    /// A box is kept when:
    /// - `x2 > x1` and `y2 > y1` (box has positive width and height).
    /// - `x1`, `y1` are not negative and `x2`, `y2` do not exceed the image width and height
    ///   (or `1.0` for normalized boxes).
    ///
    /// Labels are filtered with the same mask. Removing every box is not an error; the
    /// result then carries an empty box and label set.
    pub fn clean_boxes(mut self) -> Result<Self> {
        if self.is_empty() {
            return Ok(self);
        }

        let (height, width) = self.size();
        let (max_x, max_y) = match self.coords {
            BoxCoords::Absolute => (width as f32, height as f32),
            BoxCoords::Normalized => (1.0, 1.0),
        };

        let (x1, y1, x2, y2) = boxes_to_components(self.boxes.clone());

        // (x2 <= x1) || (y2 <= y1) || (x1 < 0) || (y1 < 0) || (x2 > max_x) || (y2 > max_y)
        let invalid = x2
            .clone()
            .lower_equal(x1.clone())
            .bool_or(y2.clone().lower_equal(y1.clone()))
            .bool_or(x1.lower_elem(0.0))
            .bool_or(y1.lower_elem(0.0))
            .bool_or(x2.greater_elem(max_x))
            .bool_or(y2.greater_elem(max_y));

        let keep = invalid.bool_not().flatten::<1>(0, 1);
        let before = self.len();

        let (boxes, labels) = retain(self.boxes, self.labels, keep)?;
        self.boxes = boxes;
        self.labels = labels;

        if self.len() != before {
            log::trace!("clean_boxes dropped {} of {before} boxes", before - self.len());
        }

        Ok(self)
    }
}
