//! Build driver: runs the three stages against one source tree.
//!
//! ```text
//! check script → prepare output → load cache
//!   → discover → thumbnails → install script → render → save cache
//! ```
//!
//! The cache is written last, and only when every stage succeeded, so a
//! failed build never records facts for work that was not finished.

use crate::cache::{Cache, CacheError, CacheStats};
use crate::config::{BuildConfig, BuildPaths, ConfigError};
use crate::discover::{self, CopyMode, DiscoverError, DiscoverOptions, Transform};
use crate::imaging::{FrameExtractor, ImageResizer};
use crate::progress::ProgressReporter;
use crate::render::{self, PageCompiler, RenderError, RenderOptions, RenderedPage};
use crate::report::Failure;
use crate::template::{self, TemplateError};
use crate::thumbnails::{self, Codecs, ThumbnailError, ThumbnailOptions};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("source directory {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare output directory {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// External programs and codecs the stages delegate to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub resizer: &'a dyn ImageResizer,
    pub extractor: &'a dyn FrameExtractor,
    pub compiler: &'a dyn PageCompiler,
    /// Only used when `copy_files` is on.
    pub transform: &'a dyn Transform,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub source: PathBuf,
    pub config: BuildConfig,
    /// `false` starts from an empty cache. The fresh cache still replaces
    /// the old file at the end of the run.
    pub use_cache: bool,
}

/// What a successful build did.
#[derive(Debug)]
pub struct BuildReport {
    pub output: PathBuf,
    pub pages: Vec<RenderedPage>,
    pub stats: CacheStats,
    /// Recoverable per-file failures from every stage, in stage order.
    pub failures: Vec<Failure>,
    pub copied: usize,
    pub leaves: usize,
    pub branches: usize,
}

/// Run a full build.
pub fn run(
    options: &BuildOptions,
    collaborators: Collaborators<'_>,
    reporter: &mut dyn ProgressReporter,
) -> Result<BuildReport, BuildError> {
    let config = &options.config;
    config.validate()?;
    if let Some(script) = &config.script {
        template::check_script(script)?;
    }

    let source = fs::canonicalize(&options.source).map_err(|source| BuildError::Source {
        path: options.source.clone(),
        source,
    })?;
    let output_err = |source: io::Error| BuildError::Output {
        path: config.output.clone(),
        source,
    };
    fs::create_dir_all(&config.output).map_err(output_err)?;
    let output = fs::canonicalize(&config.output).map_err(output_err)?;
    let paths = BuildPaths::new(&output, config);

    let mut cache = if options.use_cache {
        Cache::load(&paths.cache_path)?
    } else {
        info!("cache disabled, regenerating everything");
        Cache::empty(&paths.cache_path)
    };
    info!(
        source = %source.display(),
        output = %output.display(),
        cached_entries = cache.len(),
        "building gallery"
    );

    let copy = config.copy_files.then(|| CopyMode {
        full_dir: paths.full_dir.clone(),
        transform: collaborators.transform,
    });
    let discovery = discover::discover(
        &source,
        DiscoverOptions {
            output: &output,
            copy,
        },
        &mut cache,
        reporter,
    )?;
    let mut root = discovery.root;
    let mut failures = discovery.failures;

    let thumbs = thumbnails::generate(
        &mut root,
        &ThumbnailOptions {
            thumbs_dir: paths.thumbs_dir.clone(),
            width: config.width,
            height: config.height,
        },
        Codecs {
            resizer: collaborators.resizer,
            extractor: collaborators.extractor,
        },
        &mut cache,
        reporter,
    )?;
    failures.extend(thumbs.failures);

    let script = match &config.script {
        Some(script) => Some(template::install_script(script, &output)?),
        None => None,
    };
    let pages = render::render(
        &root,
        &RenderOptions {
            output: output.clone(),
            index_filename: config.index_filename.clone(),
            title: config.title.clone(),
            script,
            preview_size: config.preview_size,
            preview_seed: config.preview_seed,
        },
        collaborators.compiler,
        reporter,
    )?;

    cache.save()?;

    let (leaves, branches) = root.counts();
    info!(
        pages = pages.len(),
        stats = %thumbs.stats,
        failures = failures.len(),
        "build complete"
    );
    Ok(BuildReport {
        output,
        pages,
        stats: thumbs.stats,
        failures,
        copied: discovery.copied,
        leaves,
        branches,
    })
}
