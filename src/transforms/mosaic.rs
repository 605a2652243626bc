use crate::{
    boxes::{BoxCoords, translate_boxes},
    error::{Result, invalid_config},
};

use super::{
    pipeline::Transform,
    resize::{ResizeFilter, ResizeTarget},
};
use burn::{
    prelude::Backend,
    tensor::{Int, Tensor},
};
use rand::Rng;

/// Concatenates two images along `dim` (`1` stacks vertically, `2` side by side).
///
/// The edges orthogonal to `dim` must agree; when they do not, the longer one is cut to
/// the shorter length keeping its centre.
pub(crate) fn concat_cut_center<B: Backend>(
    first: Tensor<B, 3>,
    second: Tensor<B, 3>,
    dim: usize,
) -> Tensor<B, 3> {
    // The edge that has to match
    let edge = if dim == 1 { 2 } else { 1 };
    let shared = first.dims()[edge].min(second.dims()[edge]);

    let cut = |image: Tensor<B, 3>| {
        let dims = image.dims();
        if dims[edge] == shared {
            return image;
        }

        let start = (dims[edge] - shared) / 2;
        let mut ranges = [0..dims[0], 0..dims[1], 0..dims[2]];
        ranges[edge] = start..start + shared;
        image.slice(ranges)
    };

    Tensor::cat(vec![cut(first), cut(second)], dim)
}

/// Composites four samples into one `size x size` image.
///
/// Each tile is zoomed in (see [`Transform::zoom_in`]) and then resized to its quadrant:
/// the top-left tile to `size / 2` square, the others to `size / 2` or `size - size / 2`
/// along each axis so that the canvas is exactly `size` on both sides for odd sizes too.
/// Tiles are laid out as
///
/// ```text
/// +---+---+
/// | 0 | 1 |
/// +---+---+
/// | 2 | 3 |
/// +---+---+
/// ```
///
/// and their boxes are offset by `size / 2` along the axes where the tile is shifted. The
/// result carries the boxes and labels of the four tiles concatenated in tile order, in
/// absolute pixels, and inherits the generator and device of tile 0.
///
/// # Errors
///
/// Fails if `size < 2`, the zoom-in parameters are zero, or any tile's boxes are already
/// normalized.
pub fn mosaic<B: Backend, R: Rng>(
    tiles: [Transform<B, R>; 4],
    size: usize,
    max_trials: usize,
    max_attempts: usize,
) -> Result<Transform<B, R>> {
    if size < 2 {
        return Err(invalid_config(format!(
            "mosaic size must be at least 2, got {size}"
        )));
    }

    let half = size / 2;
    let rest = size - half;

    let mut images = Vec::with_capacity(4);
    let mut boxes = Vec::with_capacity(4);
    let mut labels = Vec::with_capacity(4);
    let mut first = None;

    for tile in &tiles {
        tile.check_aligned()?;
    }

    for (i, tile) in tiles.into_iter().enumerate() {
        let (col, row) = (i % 2, i / 2);
        let width = if col == 0 { half } else { rest };
        let height = if row == 0 { half } else { rest };

        let tile = tile.zoom_in(max_trials, max_attempts)?.resize(
            ResizeTarget::Exact { height, width },
            None,
            false,
            ResizeFilter::Nearest,
        )?;

        let (dx, dy) = ((col * half) as f32, (row * half) as f32);

        images.push(tile.image.clone());
        if !tile.is_empty() {
            boxes.push(translate_boxes(tile.boxes.clone(), dx, dy));
            labels.push(tile.labels.clone());
        }

        if first.is_none() {
            first = Some(tile);
        }
    }

    let Some(first) = first else {
        return Err(invalid_config("mosaic needs four tiles"));
    };

    let top = concat_cut_center(images[0].clone(), images[1].clone(), 2);
    let bottom = concat_cut_center(images[2].clone(), images[3].clone(), 2);
    let image = concat_cut_center(top, bottom, 1);

    let device = first.device.clone();
    let (boxes, labels) = if boxes.is_empty() {
        (
            Tensor::<B, 2>::empty([0, 4], &device),
            Tensor::<B, 1, Int>::empty([0], &device),
        )
    } else {
        (Tensor::cat(boxes, 0), Tensor::cat(labels, 0))
    };

    log::trace!(
        "mosaic of {} boxes on a {size}x{size} canvas",
        boxes.dims()[0]
    );

    Ok(Transform {
        image,
        boxes,
        labels,
        coords: BoxCoords::Absolute,
        device,
        rng: first.rng,
    })
}
