/// Errors raised by the augmentation pipeline.
///
/// Degenerate augmentation outcomes (a crop that keeps no boxes, a zoom-in
/// that never finds a valid window) are not errors. These variants cover
/// invalid input and invalid configuration only.
#[derive(Debug, thiserror::Error)]
pub enum AugmentError {
    /// Boxes and labels must describe the same detections, index for index.
    #[error("boxes and labels are misaligned: {boxes} boxes, {labels} labels")]
    Misaligned { boxes: usize, labels: usize },

    /// Boxes must be shaped `[N, 4]`.
    #[error("boxes must have shape [N, 4], got {dims:?}")]
    InvalidBoxShape { dims: [usize; 2] },

    /// Images must be shaped `[3, H, W]` with non-zero extent.
    #[error("image must have shape [3, H, W] with H, W > 0, got {dims:?}")]
    InvalidImageShape { dims: [usize; 3] },

    /// A stage or operation parameter is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A crop region reaches outside the image.
    #[error(
        "region (top {top}, left {left}, height {height}, width {width}) does not fit \
         inside a {image_height}x{image_width} image"
    )]
    RegionOutOfBounds {
        top: usize,
        left: usize,
        height: usize,
        width: usize,
        image_height: usize,
        image_width: usize,
    },

    /// The operation works in pixel space but the boxes were already normalized.
    #[error("{op} requires absolute pixel boxes, but boxes are normalized")]
    NormalizedBoxes { op: &'static str },

    /// Reading tensor contents back to the host failed.
    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = AugmentError> = std::result::Result<T, E>;

/// Shorthand for [`AugmentError::InvalidConfig`].
pub(crate) fn invalid_config(msg: impl Into<String>) -> AugmentError {
    AugmentError::InvalidConfig(msg.into())
}
