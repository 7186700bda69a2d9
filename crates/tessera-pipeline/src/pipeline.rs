//! The image pipeline: a source, an ordered list of operations, and the
//! cache logic that decides whether they need to run at all.
//!
//! Every output request resolves the pipeline first:
//!
//! 1. Build the fingerprint from the source, the output format, the
//!    render settings and each operation's cache values, in order.
//! 2. If the cache holds an artifact for that fingerprint and format,
//!    use it. Rendering is skipped and the canvas may stay unset.
//! 3. Otherwise render (load or create, then apply every operation),
//!    encode, and store the artifact before delivering it.
//!
//! Any failure aborts the request; nothing partial is cached.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::canvas::Canvas;
use crate::config::PipelineConfig;
use crate::fingerprint::{CacheValue, Fingerprint, FingerprintBuilder};
use crate::operation::{ImageOperation, RenderContext, Rendered};
use crate::output::{OutputSink, data_uri};
use crate::store::{CacheStore, Filesystem};
use crate::types::{Dimensions, Format, PipelineError};

/// Shared handle to a pipeline, used to embed one pipeline in another.
pub type PipelineHandle = Rc<RefCell<Pipeline>>;

/// Configuration revisions are drawn from one counter so they are
/// comparable across pipelines.
static REVISIONS: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    REVISIONS.fetch_add(1, Ordering::Relaxed)
}

/// Where the initial canvas comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Decode an image file; its format follows the extension.
    File(PathBuf),
    /// Start from an opaque black canvas.
    Blank(Dimensions),
}

/// Outcome of resolving the pipeline for one format.
enum Resolved {
    /// The artifact is in the cache and was not re-rendered.
    Cached {
        cache: Rc<dyn CacheStore>,
        fingerprint: Fingerprint,
    },
    /// The canvas is current. Holds the encoded bytes if they were
    /// produced for the cache.
    Fresh(Option<Vec<u8>>),
}

/// A derived image: source plus operations, with transparent caching.
pub struct Pipeline {
    fs: Rc<dyn Filesystem>,
    cache: Option<Rc<dyn CacheStore>>,
    use_cache: bool,
    config: PipelineConfig,
    source: Option<Source>,
    operations: Vec<Box<dyn ImageOperation>>,
    canvas: Option<Canvas>,
    /// Bumped on every configuration change.
    revision: u64,
    /// Tree revision the current state was resolved at.
    resolved_revision: Option<u64>,
    /// PNG fingerprint of the state last resolved.
    resolved_key: Option<Fingerprint>,
    /// PNG fingerprint the canvas was rendered or decoded for.
    canvas_key: Option<Fingerprint>,
    last_fingerprint: Option<Fingerprint>,
}

impl Pipeline {
    /// An unconfigured pipeline without a cache.
    #[must_use]
    pub fn new(fs: Rc<dyn Filesystem>) -> Self {
        Self {
            fs,
            cache: None,
            use_cache: false,
            config: PipelineConfig::default(),
            source: None,
            operations: Vec::new(),
            canvas: None,
            revision: next_revision(),
            resolved_revision: None,
            resolved_key: None,
            canvas_key: None,
            last_fingerprint: None,
        }
    }

    /// Attach a cache store and enable caching.
    #[must_use]
    pub fn with_cache(mut self, cache: Rc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self.use_cache = true;
        self.touch();
        self
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn with_config(mut self, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        self.config = config;
        self.touch();
        Ok(self)
    }

    /// A new, unconfigured pipeline sharing this one's filesystem, cache
    /// and configuration.
    #[must_use]
    pub fn sibling(&self) -> Self {
        let mut sibling = Self::new(Rc::clone(&self.fs));
        sibling.cache = self.cache.clone();
        sibling.use_cache = self.use_cache;
        sibling.config = self.config.clone();
        sibling
    }

    /// Wrap in a shared handle for use as an overlay source.
    #[must_use]
    pub fn into_shared(self) -> PipelineHandle {
        Rc::new(RefCell::new(self))
    }

    /// Turn caching on or off. Has no effect without a cache store.
    pub fn set_use_cache(&mut self, enabled: bool) {
        self.use_cache = enabled;
        self.touch();
    }

    /// Change the JPEG quality.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `quality` is outside
    /// 1..=100.
    pub fn set_jpeg_quality(&mut self, quality: u8) -> Result<(), PipelineError> {
        let config = PipelineConfig {
            jpeg_quality: quality,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        self.touch();
        Ok(())
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The configured source, if any.
    #[must_use]
    pub const fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Number of queued operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Start from a blank `width`×`height` canvas, clearing operations.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either dimension is
    /// zero.
    pub fn create(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "canvas dimensions must be positive, got {width}x{height}"
            )));
        }
        self.reset_source(Source::Blank(Dimensions::new(width, height)));
        Ok(())
    }

    /// Start from the image file at `path`, clearing operations.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceNotFound`] if `path` is not an
    /// existing file. The pipeline is left unchanged in that case.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        if !self.fs.exists(path) {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
        self.reset_source(Source::File(path.to_path_buf()));
        Ok(())
    }

    /// Append an operation.
    pub fn add_operation(&mut self, operation: impl ImageOperation + 'static) {
        self.push_operation(Box::new(operation));
    }

    /// Append a boxed operation.
    pub fn push_operation(&mut self, operation: Box<dyn ImageOperation>) {
        self.operations.push(operation);
        self.touch();
    }

    /// Whether the last resolution still reflects the configuration,
    /// including every embedded pipeline and the source file on disk.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.resolved_revision.is_some()
            && self.tree_revision().ok() == self.resolved_revision
            && self.resolved_key.is_some()
            && self.fingerprint(Format::Png).ok() == self.resolved_key
    }

    /// Fingerprint of the artifact this pipeline produces in `format`.
    ///
    /// Does not render. Embedded pipelines contribute their own
    /// fingerprints.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotConfigured`] without a source,
    /// [`PipelineError::SourceNotFound`] if the source file has
    /// disappeared, or [`PipelineError::OverlayCycle`] if an embedded
    /// pipeline refers back to this one.
    pub fn fingerprint(&self, format: Format) -> Result<Fingerprint, PipelineError> {
        Ok(self.describe(format)?.finish())
    }

    /// The descriptor string the fingerprint is hashed from.
    ///
    /// # Errors
    ///
    /// Same as [`fingerprint`](Self::fingerprint).
    pub fn descriptor(&self, format: Format) -> Result<String, PipelineError> {
        Ok(self.describe(format)?.descriptor().to_owned())
    }

    /// Fingerprint computed by the most recent resolution.
    #[must_use]
    pub const fn last_fingerprint(&self) -> Option<Fingerprint> {
        self.last_fingerprint
    }

    /// Resolve and return the PNG fingerprint.
    ///
    /// # Errors
    ///
    /// Any error from [`canvas`](Self::canvas).
    pub fn cache_id(&mut self) -> Result<Fingerprint, PipelineError> {
        self.canvas()?;
        self.fingerprint(Format::Png)
    }

    /// The rendered canvas.
    ///
    /// A cached PNG artifact is decoded instead of re-rendering.
    ///
    /// # Errors
    ///
    /// Any configuration, render, codec or cache read error.
    pub fn canvas(&mut self) -> Result<&Canvas, PipelineError> {
        if let Resolved::Cached { cache, fingerprint } = self.resolve(Format::Png)?
            && self.canvas.is_none()
        {
            let bytes = cache.read(fingerprint, Format::Png)?;
            self.canvas = Some(Canvas::decode(&bytes, Format::Png)?);
            self.canvas_key = Some(fingerprint);
        }
        self.canvas.as_ref().ok_or(PipelineError::NotConfigured)
    }

    /// The encoded artifact.
    ///
    /// # Errors
    ///
    /// Any configuration, render, codec or cache error.
    pub fn encode(&mut self, format: Format) -> Result<Vec<u8>, PipelineError> {
        match self.resolve(format)? {
            Resolved::Cached { cache, fingerprint } => Ok(cache.read(fingerprint, format)?),
            Resolved::Fresh(Some(bytes)) => Ok(bytes),
            Resolved::Fresh(None) => self.encode_canvas(format),
        }
    }

    /// The PNG artifact as a `data:image/png;base64,` URI.
    ///
    /// # Errors
    ///
    /// Any error from [`encode`](Self::encode).
    pub fn to_base64(&mut self) -> Result<String, PipelineError> {
        let bytes = self.encode(Format::Png)?;
        Ok(data_uri(Format::Png, &bytes))
    }

    /// Write the artifact to `path`.
    ///
    /// The format defaults to the path's extension. When the artifact
    /// comes from the cache and `path` already exists and is at least as
    /// new as the cache entry, nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedFormat`] if no format is given
    /// and the extension is not recognized, plus any error from
    /// resolving or writing.
    pub fn save(&mut self, path: impl AsRef<Path>, format: Option<Format>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let format = match format {
            Some(format) => format,
            None => format_of(path)?,
        };
        let bytes = match self.resolve(format)? {
            Resolved::Cached { cache, fingerprint } => {
                if self.target_is_current(path, cache.as_ref(), fingerprint, format)? {
                    debug!(path = %path.display(), "target is current; skipping copy");
                    return Ok(());
                }
                cache.read(fingerprint, format)?
            }
            Resolved::Fresh(Some(bytes)) => bytes,
            Resolved::Fresh(None) => self.encode_canvas(format)?,
        };
        self.fs.write(path, &bytes)?;
        info!(path = %path.display(), %format, bytes = bytes.len(), "saved image");
        Ok(())
    }

    /// Stream the artifact to `sink`, announcing its content type first.
    ///
    /// The format defaults to the source file's extension.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedFormat`] if no format is given
    /// and none can be inferred, plus any error from resolving or
    /// writing.
    pub fn send_to(&mut self, sink: &mut dyn OutputSink, format: Option<Format>) -> Result<(), PipelineError> {
        let format = match (format, &self.source) {
            (Some(format), _) => format,
            (None, Some(Source::File(path))) => format_of(path)?,
            (None, _) => return Err(PipelineError::UnsupportedFormat(String::new())),
        };
        let bytes = self.encode(format)?;
        let content_type = if self.config.legacy_content_types {
            format.legacy_content_type()
        } else {
            format.mime_type()
        };
        sink.set_content_type(content_type);
        sink.write_bytes(&bytes)?;
        Ok(())
    }

    /// Release the canvas. The cache and configuration are kept.
    pub fn close(&mut self) {
        self.canvas = None;
        self.canvas_key = None;
    }

    /// Highest configuration revision across this pipeline and every
    /// pipeline embedded in it.
    pub(crate) fn tree_revision(&self) -> Result<u64, PipelineError> {
        self.operations
            .iter()
            .try_fold(self.revision, |highest, op| {
                Ok(op.nested_revision()?.map_or(highest, |nested| highest.max(nested)))
            })
    }

    fn touch(&mut self) {
        self.revision = next_revision();
    }

    fn reset_source(&mut self, source: Source) {
        self.source = Some(source);
        self.operations.clear();
        self.canvas = None;
        self.canvas_key = None;
        self.resolved_revision = None;
        self.resolved_key = None;
        self.touch();
    }

    fn active_cache(&self) -> Option<Rc<dyn CacheStore>> {
        self.cache.clone().filter(|_| self.use_cache)
    }

    fn describe(&self, format: Format) -> Result<FingerprintBuilder, PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::NotConfigured)?;
        let mut init: Vec<CacheValue> = match source {
            Source::Blank(size) => vec![
                size.width.into(),
                size.height.into(),
                format.extension().into(),
            ],
            Source::File(path) => {
                let modified = self
                    .fs
                    .modified(path)
                    .map_err(|_| PipelineError::SourceNotFound(path.clone()))?;
                vec![
                    CacheValue::Unset,
                    CacheValue::Unset,
                    format.extension().into(),
                    path.display().to_string().into(),
                    modified.into(),
                ]
            }
        };
        if format == Format::Jpg {
            init.push(self.config.jpeg_quality.into());
        }
        init.push(self.config.resample_filter.to_string().into());
        init.push(self.config.fonts_dir.display().to_string().into());

        let mut builder = FingerprintBuilder::new();
        builder.section("init", &init);
        for op in &self.operations {
            builder.section(&format!("_{}", op.name()), &op.cache_key_values()?);
        }
        Ok(builder)
    }

    fn resolve(&mut self, format: Format) -> Result<Resolved, PipelineError> {
        let fingerprint = self.fingerprint(format)?;
        let content = if format == Format::Png {
            fingerprint
        } else {
            self.fingerprint(Format::Png)?
        };
        self.last_fingerprint = Some(fingerprint);
        let tree = self.tree_revision()?;
        // The fingerprint covers the source mtime, so a replaced source
        // file never matches a canvas rendered from the old one.
        let canvas_current = self.canvas.is_some() && self.canvas_key == Some(content);

        let Some(cache) = self.active_cache() else {
            if !canvas_current {
                self.render(content)?;
            }
            self.mark_resolved(tree, content);
            return Ok(Resolved::Fresh(None));
        };

        if cache.exists(fingerprint, format) {
            debug!(%fingerprint, %format, "cache hit");
            if !canvas_current {
                self.canvas = None;
                self.canvas_key = None;
            }
            self.mark_resolved(tree, content);
            return Ok(Resolved::Cached { cache, fingerprint });
        }

        debug!(%fingerprint, %format, "cache miss");
        if !canvas_current {
            self.render(content)?;
        }
        self.mark_resolved(tree, content);
        let bytes = self.encode_canvas(format)?;
        match cache.write(fingerprint, format, &bytes) {
            Ok(()) => info!(%fingerprint, %format, bytes = bytes.len(), "cached artifact"),
            Err(e) => warn!(%fingerprint, %format, error = %e, "failed to write cache entry"),
        }
        Ok(Resolved::Fresh(Some(bytes)))
    }

    const fn mark_resolved(&mut self, tree: u64, content: Fingerprint) {
        self.resolved_revision = Some(tree);
        self.resolved_key = Some(content);
    }

    #[tracing::instrument(level = "debug", skip_all, fields(operations = self.operations.len()))]
    fn render(&mut self, content: Fingerprint) -> Result<(), PipelineError> {
        self.canvas = None;
        self.canvas_key = None;
        self.resolved_revision = None;
        self.resolved_key = None;

        let mut canvas = match self.source.as_ref().ok_or(PipelineError::NotConfigured)? {
            Source::File(path) => {
                let format = format_of(path)?;
                let bytes = self.fs.read(path)?;
                Canvas::decode(&bytes, format)?
            }
            Source::Blank(size) => Canvas::blank(size.width, size.height)?,
        };

        let ctx = RenderContext::new(
            self.fs.as_ref(),
            &self.config.fonts_dir,
            self.config.resample_filter,
        );
        for op in &self.operations {
            if let Rendered::Replaced(next) = op.render(&mut canvas, &ctx)? {
                canvas = next;
                canvas.reset_flags();
            }
        }
        debug!(size = %canvas.dimensions(), "rendered");

        self.canvas = Some(canvas);
        self.canvas_key = Some(content);
        Ok(())
    }

    fn encode_canvas(&self, format: Format) -> Result<Vec<u8>, PipelineError> {
        self.canvas
            .as_ref()
            .ok_or(PipelineError::NotConfigured)?
            .encode(format, self.config.jpeg_quality)
    }

    fn target_is_current(
        &self,
        path: &Path,
        cache: &dyn CacheStore,
        fingerprint: Fingerprint,
        format: Format,
    ) -> Result<bool, PipelineError> {
        if !self.fs.exists(path) {
            return Ok(false);
        }
        Ok(self.fs.modified(path)? >= cache.modified(fingerprint, format)?)
    }
}

fn format_of(path: &Path) -> Result<Format, PipelineError> {
    Format::from_path(path).ok_or_else(|| {
        PipelineError::UnsupportedFormat(
            path.extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    })
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source)
            .field("operations", &self.operations.len())
            .field("use_cache", &(self.use_cache && self.cache.is_some()))
            .field("config", &self.config)
            .field("revision", &self.revision)
            .field("resolved_revision", &self.resolved_revision)
            .finish_non_exhaustive()
    }
}
