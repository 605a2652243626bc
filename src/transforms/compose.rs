use std::fmt;

use burn::{
    prelude::Backend,
    tensor::{Int, Tensor},
};
use rand::Rng;

use super::pipeline::Transform;
use crate::error::Result;

/// One step of an augmentation pipeline.
///
/// A stage consumes the triple and hands back the transformed triple. Stages draw their
/// randomness from the generator carried by the [`Transform`], so they hold no mutable state
/// and can be shared between data loader workers.
pub trait Stage<B: Backend, R: Rng>: fmt::Debug + Send + Sync {
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// A stage built from a closure.
pub struct FnStage<F> {
    name: &'static str,
    f: F,
}

impl<F> FnStage<F> {
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnStage({})", self.name)
    }
}

impl<B, R, F> Stage<B, R> for FnStage<F>
where
    B: Backend,
    R: Rng,
    F: Fn(Transform<B, R>) -> Result<Transform<B, R>> + Send + Sync,
{
    fn apply(&self, t: Transform<B, R>) -> Result<Transform<B, R>> {
        (self.f)(t)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// An ordered sequence of stages applied one after the other.
pub struct Pipeline<B: Backend, R: Rng> {
    stages: Vec<Box<dyn Stage<B, R>>>,
}

impl<B: Backend, R: Rng> Default for Pipeline<B, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend, R: Rng> Pipeline<B, R> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage.
    pub fn push(&mut self, stage: impl Stage<B, R> + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// Appends a stage, builder style.
    pub fn with(mut self, stage: impl Stage<B, R> + 'static) -> Self {
        self.push(stage);
        self
    }

    pub(crate) fn push_boxed(&mut self, stage: Box<dyn Stage<B, R>>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order, stopping at the first error.
    ///
    /// The triple is checked for one label per box before every stage and after the last
    /// one, so a misaligned triple fails with [`AugmentError::Misaligned`] instead of being
    /// carried along.
    ///
    /// [`AugmentError::Misaligned`]: crate::error::AugmentError::Misaligned
    pub fn apply(&self, mut t: Transform<B, R>) -> Result<Transform<B, R>> {
        for stage in &self.stages {
            t.check_aligned()?;
            t = stage.apply(t)?;
            log::trace!("{} -> {} boxes", stage.name(), t.len());
        }
        t.check_aligned()?;

        Ok(t)
    }

    /// Runs the pipeline on raw tensors with the given generator.
    pub fn apply_tensors(
        &self,
        image: Tensor<B, 3>,
        boxes: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
        rng: R,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 1, Int>)> {
        let t = Transform::new_seeded(image, boxes, labels, rng)?;
        Ok(self.apply(t)?.finish())
    }
}

impl<B: Backend, R: Rng> fmt::Debug for Pipeline<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.stages).finish()
    }
}

impl<B: Backend, R: Rng> fmt::Display for Pipeline<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline(")?;
        for stage in &self.stages {
            write!(f, "\n    {stage:?}")?;
        }
        write!(f, "\n)")
    }
}
