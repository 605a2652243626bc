use burn::{config::Config, prelude::Backend};
use rand::Rng;

use crate::{
    error::{Result, invalid_config},
    transforms::{
        compose::{Pipeline, Stage},
        mosaic::mosaic,
        normalize::{IMAGENET_MEAN, IMAGENET_STD},
        pipeline::{self, Transform},
        resize::{ResizeFilter, ResizeTarget},
    },
};

fn check_probability(stage: &str, name: &str, p: f32) -> Result<()> {
    pipeline::check_probability(&format!("{stage}: {name}"), p)
}

fn check_trials(stage: &str, max_trials: usize, max_attempts: usize) -> Result<()> {
    if max_trials == 0 || max_attempts == 0 {
        return Err(invalid_config(format!(
            "{stage}: max_trials and max_attempts must be positive, got {max_trials} and \
             {max_attempts}"
        )));
    }
    Ok(())
}

/// Resize to a shorter side or an exact extent, optionally normalizing the boxes.
#[derive(Config, Debug, PartialEq)]
pub struct ResizeConfig {
    pub target: ResizeTarget,
    /// Cap on the longer side, only used with [`ResizeTarget::Shorter`].
    pub max_size: Option<usize>,
    #[config(default = true)]
    pub box_normalization: bool,
    #[config(default = "ResizeFilter::Nearest")]
    pub filter: ResizeFilter,
}

impl ResizeConfig {
    pub fn validate(&self) -> Result<()> {
        match self.target {
            ResizeTarget::Shorter(0) => {
                return Err(invalid_config("resize: target size must be positive"));
            }
            ResizeTarget::Exact { height, width } if height == 0 || width == 0 => {
                return Err(invalid_config(format!(
                    "resize: target extent {height}x{width} must be positive"
                )));
            }
            _ => {}
        }
        if self.max_size == Some(0) {
            return Err(invalid_config("resize: max_size must be positive"));
        }
        Ok(())
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for ResizeConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.resize(
            self.target,
            self.max_size,
            self.box_normalization,
            self.filter,
        )
    }

    fn name(&self) -> &'static str {
        "resize"
    }
}

#[derive(Config, Debug, PartialEq)]
pub struct HorizontalFlipConfig {
    #[config(default = 0.5)]
    pub p: f32,
}

impl HorizontalFlipConfig {
    pub fn validate(&self) -> Result<()> {
        check_probability("horizontal flip", "p", self.p)
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for HorizontalFlipConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.random_horizontal_flip(self.p)
    }

    fn name(&self) -> &'static str {
        "horizontal_flip"
    }
}

/// Photometric distortion gated by `p`.
///
/// When `per_effect_p` is set, each of the four colour adjustments is additionally gated
/// on its own; otherwise all four run whenever the stage fires.
#[derive(Config, Debug, PartialEq)]
pub struct PhotometricDistortConfig {
    #[config(default = 0.5)]
    pub p: f32,
    pub per_effect_p: Option<f32>,
}

impl PhotometricDistortConfig {
    pub fn validate(&self) -> Result<()> {
        check_probability("photometric distort", "p", self.p)?;
        if let Some(p) = self.per_effect_p {
            check_probability("photometric distort", "per_effect_p", p)?;
        }
        Ok(())
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for PhotometricDistortConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.random_photometric_distort(self.p, self.per_effect_p)
    }

    fn name(&self) -> &'static str {
        "photometric_distort"
    }
}

#[derive(Config, Debug, PartialEq)]
pub struct ZoomOutConfig {
    #[config(default = 0.5)]
    pub p: f32,
    /// Largest canvas side as a multiple of the image side.
    #[config(default = 3.0)]
    pub max_scale: f32,
}

impl ZoomOutConfig {
    pub fn validate(&self) -> Result<()> {
        check_probability("zoom out", "p", self.p)?;
        if !self.max_scale.is_finite() || self.max_scale < 1.0 {
            return Err(invalid_config(format!(
                "zoom out: max_scale must be finite and at least 1.0, got {}",
                self.max_scale
            )));
        }
        Ok(())
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for ZoomOutConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.random_zoom_out(self.max_scale, self.p)
    }

    fn name(&self) -> &'static str {
        "zoom_out"
    }
}

#[derive(Config, Debug, PartialEq)]
pub struct ZoomInConfig {
    #[config(default = 0.5)]
    pub p: f32,
    /// Windows sampled per drawn overlap threshold.
    #[config(default = 50)]
    pub max_trials: usize,
    /// Overlap thresholds drawn before giving up.
    #[config(default = 100)]
    pub max_attempts: usize,
}

impl ZoomInConfig {
    pub fn validate(&self) -> Result<()> {
        check_probability("zoom in", "p", self.p)?;
        check_trials("zoom in", self.max_trials, self.max_attempts)
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for ZoomInConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.random_zoom_in(self.max_trials, self.max_attempts, self.p)
    }

    fn name(&self) -> &'static str {
        "zoom_in"
    }
}

#[derive(Config, Debug, PartialEq)]
pub struct RandomSizeCropConfig {
    pub min_size: usize,
    pub max_size: usize,
}

impl RandomSizeCropConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 || self.min_size > self.max_size {
            return Err(invalid_config(format!(
                "random size crop: need 0 < min_size <= max_size, got {} and {}",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for RandomSizeCropConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.random_size_crop(self.min_size, self.max_size)
    }

    fn name(&self) -> &'static str {
        "random_size_crop"
    }
}

/// Per-channel image standardization. Defaults to the ImageNet statistics.
#[derive(Config, Debug, PartialEq)]
pub struct NormalizeConfig {
    #[config(default = "IMAGENET_MEAN.to_vec()")]
    pub mean: Vec<f32>,
    #[config(default = "IMAGENET_STD.to_vec()")]
    pub std: Vec<f32>,
}

impl NormalizeConfig {
    fn statistics(&self) -> Result<([f32; 3], [f32; 3])> {
        let mean: [f32; 3] = self.mean.as_slice().try_into().map_err(|_| {
            invalid_config(format!(
                "normalize: mean needs 3 channels, got {}",
                self.mean.len()
            ))
        })?;
        let std: [f32; 3] = self.std.as_slice().try_into().map_err(|_| {
            invalid_config(format!(
                "normalize: std needs 3 channels, got {}",
                self.std.len()
            ))
        })?;
        Ok((mean, std))
    }

    pub fn validate(&self) -> Result<()> {
        let (_, std) = self.statistics()?;
        if std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(invalid_config(format!(
                "normalize: std must be finite and non-zero, got {std:?}"
            )));
        }
        Ok(())
    }
}

impl<B: Backend, R: Rng> Stage<B, R> for NormalizeConfig {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        let (mean, std) = self.statistics()?;
        t.normalize_image(mean, std)
    }

    fn name(&self) -> &'static str {
        "normalize"
    }
}

/// Converts boxes to fractions of the image size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizeBoxes;

impl<B: Backend, R: Rng> Stage<B, R> for NormalizeBoxes {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        Ok(t.normalize_boxes())
    }

    fn name(&self) -> &'static str {
        "normalize_boxes"
    }
}

/// Drops degenerate and out-of-image boxes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanBoxes;

impl<B: Backend, R: Rng> Stage<B, R> for CleanBoxes {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        t.clean_boxes()
    }

    fn name(&self) -> &'static str {
        "clean_boxes"
    }
}

/// Four-way mosaic composite. Not a pipeline stage since it consumes four samples.
#[derive(Config, Debug, PartialEq)]
pub struct MosaicConfig {
    /// Side of the square output canvas.
    pub size: usize,
    #[config(default = 50)]
    pub max_trials: usize,
    #[config(default = 100)]
    pub max_attempts: usize,
}

impl MosaicConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size < 2 {
            return Err(invalid_config(format!(
                "mosaic: size must be at least 2, got {}",
                self.size
            )));
        }
        check_trials("mosaic", self.max_trials, self.max_attempts)
    }

    /// Composites four samples, see [`mosaic`].
    pub fn apply<B: Backend, R: Rng>(
        &self,
        tiles: [Transform<B, R>; 4],
    ) -> Result<Transform<B, R>> {
        self.validate()?;
        mosaic(tiles, self.size, self.max_trials, self.max_attempts)
    }
}

/// A serializable pipeline stage.
#[derive(Config, Debug, PartialEq)]
pub enum StageConfig {
    Resize(ResizeConfig),
    HorizontalFlip(HorizontalFlipConfig),
    PhotometricDistort(PhotometricDistortConfig),
    ZoomOut(ZoomOutConfig),
    ZoomIn(ZoomInConfig),
    RandomSizeCrop(RandomSizeCropConfig),
    Normalize(NormalizeConfig),
    NormalizeBoxes,
    CleanBoxes,
}

impl StageConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            StageConfig::Resize(c) => c.validate(),
            StageConfig::HorizontalFlip(c) => c.validate(),
            StageConfig::PhotometricDistort(c) => c.validate(),
            StageConfig::ZoomOut(c) => c.validate(),
            StageConfig::ZoomIn(c) => c.validate(),
            StageConfig::RandomSizeCrop(c) => c.validate(),
            StageConfig::Normalize(c) => c.validate(),
            StageConfig::NormalizeBoxes | StageConfig::CleanBoxes => Ok(()),
        }
    }

    /// Whether the stage only makes sense on absolute pixel boxes.
    pub fn requires_absolute_boxes(&self) -> bool {
        matches!(
            self,
            StageConfig::ZoomOut(_) | StageConfig::ZoomIn(_) | StageConfig::RandomSizeCrop(_)
        )
    }

    /// Whether the boxes leave this stage normalized.
    pub fn normalizes_boxes(&self) -> bool {
        match self {
            StageConfig::Resize(c) => c.box_normalization,
            StageConfig::NormalizeBoxes => true,
            _ => false,
        }
    }

    /// Builds the stage.
    pub fn init<B: Backend, R: Rng + 'static>(&self) -> Result<Box<dyn Stage<B, R>>> {
        self.validate()?;

        Ok(match self {
            StageConfig::Resize(c) => Box::new(c.clone()),
            StageConfig::HorizontalFlip(c) => Box::new(c.clone()),
            StageConfig::PhotometricDistort(c) => Box::new(c.clone()),
            StageConfig::ZoomOut(c) => Box::new(c.clone()),
            StageConfig::ZoomIn(c) => Box::new(c.clone()),
            StageConfig::RandomSizeCrop(c) => Box::new(c.clone()),
            StageConfig::Normalize(c) => Box::new(c.clone()),
            StageConfig::NormalizeBoxes => Box::new(NormalizeBoxes),
            StageConfig::CleanBoxes => Box::new(CleanBoxes),
        })
    }
}

/// An ordered list of stages, built into a [`Pipeline`] with [`PipelineConfig::init`].
#[derive(Config, Debug, PartialEq)]
pub struct PipelineConfig {
    #[config(default = "Vec::new()")]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Appends a stage.
    pub fn then(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    /// The SSD training recipe: photometric distortion, zoom out, zoom in and flip, each
    /// with probability 0.5, then an exact resize to `size x size` with normalized boxes and
    /// ImageNet standardization.
    pub fn ssd_train(size: usize) -> Self {
        Self::new()
            .then(StageConfig::PhotometricDistort(
                PhotometricDistortConfig::new(),
            ))
            .then(StageConfig::ZoomOut(ZoomOutConfig::new()))
            .then(StageConfig::ZoomIn(ZoomInConfig::new()))
            .then(StageConfig::HorizontalFlip(HorizontalFlipConfig::new()))
            .then(StageConfig::Resize(ResizeConfig::new(ResizeTarget::Exact {
                height: size,
                width: size,
            })))
            .then(StageConfig::Normalize(NormalizeConfig::new()))
    }

    /// Checks every stage's parameters and the coordinate convention between stages.
    ///
    /// Once a stage hands out normalized boxes, no later stage may work on pixel boxes only.
    pub fn validate(&self) -> Result<()> {
        let mut normalized_by = None;

        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate()?;

            match normalized_by {
                Some(j) if stage.requires_absolute_boxes() => {
                    return Err(invalid_config(format!(
                        "stage {i} ({stage:?}) needs pixel boxes but stage {j} already \
                         normalized them"
                    )));
                }
                _ => {}
            }

            if stage.normalizes_boxes() && normalized_by.is_none() {
                normalized_by = Some(i);
            }
        }

        Ok(())
    }

    /// Validates the configuration and builds the pipeline.
    pub fn init<B: Backend, R: Rng + 'static>(&self) -> Result<Pipeline<B, R>> {
        self.validate()?;

        let mut pipeline = Pipeline::new();
        for stage in &self.stages {
            pipeline.push_boxed(stage.init()?);
        }

        log::debug!("built augmentation pipeline with {} stages", pipeline.len());

        Ok(pipeline)
    }
}
