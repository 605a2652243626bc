pub mod clean_boxes;
pub mod compose;
pub mod crop;
pub mod flip;
pub mod mosaic;
pub mod normalize;
pub mod photometric;
pub mod pipeline;
pub mod resize;
pub mod save_image;
pub mod zoom_in;
pub mod zoom_out;
