//! The operation seam.
//!
//! An operation is an immutable parameter set with two capabilities:
//! mutate or replace a [`Canvas`], and describe itself for the cache
//! fingerprint. Built-in variants are re-exported at the crate root;
//! embedders can add their own by implementing [`ImageOperation`].

use std::path::Path;

use crate::canvas::Canvas;
use crate::config::ResampleFilter;
use crate::fingerprint::CacheValue;
use crate::store::Filesystem;
use crate::types::PipelineError;

/// Outcome of a successful render step.
#[derive(Debug)]
pub enum Rendered {
    /// The canvas was modified in place.
    InPlace,
    /// The step produced a new canvas that supersedes the current one.
    Replaced(Canvas),
}

impl Rendered {
    /// The replacement canvas, if the step produced one.
    #[must_use]
    pub fn into_replacement(self) -> Option<Canvas> {
        match self {
            Self::InPlace => None,
            Self::Replaced(canvas) => Some(canvas),
        }
    }
}

/// Collaborators available to an operation while rendering.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    fs: &'a dyn Filesystem,
    fonts_dir: &'a Path,
    filter: ResampleFilter,
}

impl<'a> RenderContext<'a> {
    /// Bundle render collaborators.
    #[must_use]
    pub fn new(fs: &'a dyn Filesystem, fonts_dir: &'a Path, filter: ResampleFilter) -> Self {
        Self {
            fs,
            fonts_dir,
            filter,
        }
    }

    /// Filesystem for fonts and other auxiliary files.
    #[must_use]
    pub fn fs(&self) -> &'a dyn Filesystem {
        self.fs
    }

    /// Directory font names are resolved against.
    #[must_use]
    pub const fn fonts_dir(&self) -> &'a Path {
        self.fonts_dir
    }

    /// Filter for resampling steps.
    #[must_use]
    pub const fn filter(&self) -> ResampleFilter {
        self.filter
    }
}

impl std::fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("fonts_dir", &self.fonts_dir)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// A single step of a pipeline.
pub trait ImageOperation {
    /// Stable tag written into the fingerprint descriptor.
    fn name(&self) -> &'static str;

    /// Apply the step.
    ///
    /// Returning [`Rendered::Replaced`] hands the pipeline a new canvas;
    /// the pipeline drops the old one. On error the pipeline aborts and
    /// nothing is cached.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`] describing why the step could not be applied.
    fn render(&self, canvas: &mut Canvas, ctx: &RenderContext<'_>) -> Result<Rendered, PipelineError>;

    /// Every parameter that influences the output, in a fixed order.
    ///
    /// # Errors
    ///
    /// Operations that embed another pipeline propagate its fingerprint
    /// failure.
    fn cache_key_values(&self) -> Result<Vec<CacheValue>, PipelineError>;

    /// Revision of any pipeline embedded in this step.
    ///
    /// The owning pipeline folds this into its freshness check so a
    /// change to an embedded pipeline marks it stale.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OverlayCycle`] if the embedded pipeline
    /// is currently borrowed.
    fn nested_revision(&self) -> Result<Option<u64>, PipelineError> {
        Ok(None)
    }
}
