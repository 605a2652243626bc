#![recursion_limit = "256"]

pub mod boxes;
pub mod config;
pub mod debug;
pub mod error;
pub mod transforms;

pub use boxes::{BoxCoords, Region};
pub use config::{MosaicConfig, PipelineConfig, StageConfig};
pub use error::{AugmentError, Result};
pub use transforms::{
    compose::{FnStage, Pipeline, Stage},
    mosaic::mosaic,
    pipeline::Transform,
};
