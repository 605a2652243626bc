use burn::{
    prelude::Backend,
    tensor::{Bool, Int, Tensor, TensorData, cast::ToElement, s},
};

use crate::error::{AugmentError, Result};

/// Coordinate system of a box set.
///
/// A whole box set is either in absolute pixel coordinates of the current image or in
/// fractions of the image extent. The mode travels with the triple so pixel-space
/// operations can refuse normalized boxes instead of silently producing garbage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoxCoords {
    #[default]
    Absolute,
    Normalized,
}

/// A sub-rectangle of an image in pixel units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub top: usize,
    pub left: usize,
    pub height: usize,
    pub width: usize,
}

impl Region {
    pub fn new(top: usize, left: usize, height: usize, width: usize) -> Self {
        Self {
            top,
            left,
            height,
            width,
        }
    }

    /// Bottom edge, saturating at `usize::MAX`.
    pub fn bottom(&self) -> usize {
        self.top.saturating_add(self.height)
    }

    /// Right edge, saturating at `usize::MAX`.
    pub fn right(&self) -> usize {
        self.left.saturating_add(self.width)
    }

    /// The region as an `[x1, y1, x2, y2]` box.
    pub fn as_xyxy(&self) -> [f32; 4] {
        [
            self.left as f32,
            self.top as f32,
            self.right() as f32,
            self.bottom() as f32,
        ]
    }

    /// Returns `true` when the region lies entirely inside an image of the given extent.
    pub fn fits_in(&self, image_height: usize, image_width: usize) -> bool {
        let bottom = self.top.checked_add(self.height);
        let right = self.left.checked_add(self.width);

        bottom.is_some_and(|b| b <= image_height) && right.is_some_and(|r| r <= image_width)
    }
}

/// Splits a box tensor into its four component columns.
///
/// # Arguments
///
/// * `boxes` - Tensor of shape [num_boxes, 4] containing boxes in any 4 component format.
///
/// # Returns
///
/// * Tuple of four tensors `(c1, c2, c3, c4)` each of shape [num_boxes, 1]. An empty box
///   set yields four `[0, 1]` columns.
pub fn boxes_to_components<B: Backend>(
    boxes: Tensor<B, 2>,
) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
    // Slicing a zero-length dimension panics
    if boxes.dims()[0] == 0 {
        let device = boxes.device();
        let column = || Tensor::empty([0, 1], &device);
        return (column(), column(), column(), column());
    }

    (
        boxes.clone().slice(s![.., 0]),
        boxes.clone().slice(s![.., 1]),
        boxes.clone().slice(s![.., 2]),
        boxes.slice(s![.., 3]),
    )
}

/// Rebuilds a `[N, 4]` box tensor from its component columns.
pub fn components_to_boxes<B: Backend>(
    x1: Tensor<B, 2>,
    y1: Tensor<B, 2>,
    x2: Tensor<B, 2>,
    y2: Tensor<B, 2>,
) -> Tensor<B, 2> {
    if x1.dims()[0] == 0 {
        return Tensor::empty([0, 4], &x1.device());
    }
    Tensor::cat(vec![x1, y1, x2, y2], 1)
}

/// Computes the jaccard overlap (IoU) between a single query box and every box in a set.
///
/// # Arguments
/// * `query` - The query box in `[x1, y1, x2, y2]` format.
/// * `boxes` - Tensor of shape `[N, 4]` in `xyxy` format.
///
/// # Returns
/// * `Tensor<B, 1>` - Overlap ratio in `[0, 1]` for each box, shape `[N]`.
pub fn jaccard_overlap<B: Backend>(query: [f32; 4], boxes: Tensor<B, 2>) -> Tensor<B, 1> {
    if boxes.dims()[0] == 0 {
        return Tensor::empty([0], &boxes.device());
    }

    let [qx1, qy1, qx2, qy2] = query;
    let (x1, y1, x2, y2) = boxes_to_components(boxes);

    // Intersection rectangle
    let ix1 = x1.clone().clamp_min(qx1);
    let iy1 = y1.clone().clamp_min(qy1);
    let ix2 = x2.clone().clamp_max(qx2);
    let iy2 = y2.clone().clamp_max(qy2);

    let intersection = (ix2 - ix1).clamp_min(0.0) * (iy2 - iy1).clamp_min(0.0);

    let query_area = (qx2 - qx1) * (qy2 - qy1);
    let areas = (x2 - x1) * (y2 - y1);
    let union = areas.add_scalar(query_area) - intersection.clone();

    (intersection / union).flatten::<1>(0, 1)
}

/// Marks the boxes whose centre lies strictly inside `region`.
pub fn centers_inside<B: Backend>(boxes: Tensor<B, 2>, region: &Region) -> Tensor<B, 1, Bool> {
    if boxes.dims()[0] == 0 {
        return Tensor::empty([0], &boxes.device());
    }

    let [left, top, right, bottom] = region.as_xyxy();
    let (x1, y1, x2, y2) = boxes_to_components(boxes);

    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;

    cx.clone()
        .greater_elem(left)
        .bool_and(cx.lower_elem(right))
        .bool_and(cy.clone().greater_elem(top))
        .bool_and(cy.lower_elem(bottom))
        .flatten::<1>(0, 1)
}

/// Marks the boxes with strictly positive width and height.
pub fn non_degenerate<B: Backend>(boxes: Tensor<B, 2>) -> Tensor<B, 1, Bool> {
    if boxes.dims()[0] == 0 {
        return Tensor::empty([0], &boxes.device());
    }

    let (x1, y1, x2, y2) = boxes_to_components(boxes);

    x2.greater(x1).bool_and(y2.greater(y1)).flatten::<1>(0, 1)
}

/// Adds `(dx, dy)` to both corners of every box.
pub fn translate_boxes<B: Backend>(boxes: Tensor<B, 2>, dx: f32, dy: f32) -> Tensor<B, 2> {
    if boxes.dims()[0] == 0 {
        return boxes;
    }

    let (x1, y1, x2, y2) = boxes_to_components(boxes);

    components_to_boxes(
        x1.add_scalar(dx),
        y1.add_scalar(dy),
        x2.add_scalar(dx),
        y2.add_scalar(dy),
    )
}

/// Number of `true` entries in a mask.
pub fn count_true<B: Backend>(mask: Tensor<B, 1, Bool>) -> usize {
    if mask.dims()[0] == 0 {
        return 0;
    }
    mask.int().sum().into_scalar().to_usize()
}

/// Keeps the boxes and labels selected by `keep`, preserving their order and alignment.
///
/// Both containers are filtered with the same index list, so `boxes[i]` and `labels[i]`
/// still describe the same detection afterwards. An all-false mask yields an empty set.
pub fn retain<B: Backend>(
    boxes: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    keep: Tensor<B, 1, Bool>,
) -> Result<(Tensor<B, 2>, Tensor<B, 1, Int>)> {
    let [n, _] = boxes.dims();
    let [n_labels] = labels.dims();

    if n != n_labels || keep.dims()[0] != n {
        return Err(AugmentError::Misaligned {
            boxes: n,
            labels: n_labels,
        });
    }

    let flags = keep
        .int()
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| AugmentError::TensorData(format!("{e:?}")))?;

    let index: Vec<i64> = flags
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f != 0)
        .map(|(i, _)| i as i64)
        .collect();

    if index.len() == n {
        return Ok((boxes, labels));
    }

    let device = boxes.device();
    let len = index.len();
    let index = Tensor::<B, 1, Int>::from_data(
        TensorData::new(index, [len]).convert::<B::IntElem>(),
        &device,
    );

    Ok((boxes.select(0, index.clone()), labels.select(0, index)))
}

/// Builds a `[N, 4]` box tensor from host coordinates.
pub fn boxes_from_slice<B: Backend>(boxes: &[[f32; 4]], device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f32> = boxes.iter().flatten().copied().collect();
    Tensor::from_data(
        TensorData::new(flat, [boxes.len(), 4]).convert::<B::FloatElem>(),
        device,
    )
}

/// Builds a `[N]` label tensor from host category identifiers.
pub fn labels_from_slice<B: Backend>(labels: &[i64], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::from_data(
        TensorData::new(labels.to_vec(), [labels.len()]).convert::<B::IntElem>(),
        device,
    )
}

/// Reads a box tensor back to host coordinates.
pub fn boxes_to_vec<B: Backend>(boxes: Tensor<B, 2>) -> Result<Vec<[f32; 4]>> {
    let flat = boxes
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| AugmentError::TensorData(format!("{e:?}")))?;

    Ok(flat
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect())
}

/// Reads a label tensor back to host category identifiers.
pub fn labels_to_vec<B: Backend>(labels: Tensor<B, 1, Int>) -> Result<Vec<i64>> {
    labels
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| AugmentError::TensorData(format!("{e:?}")))
}
