//! Stage 2: thumbnail generation.
//!
//! Walks every leaf of the tree depth-first and makes sure it has a
//! thumbnail in `<output>/<thumbs_dir_name>/`:
//!
//! | Media kind | Thumbnail | Produced by |
//! |---|---|---|
//! | `image/{jpeg,png,gif}` | `<identifier><original ext>` | [`ImageResizer`] |
//! | `video/{mp4,quicktime,ogg,webm}` | `<identifier>.jpg` | [`FrameExtractor`] |
//! | anything else | none, `renderable = false` | |
//!
//! A leaf is a cache hit when the cache holds a valid [`FACT_THUMBNAIL`]
//! fact for it **and** the thumbnail file is still on disk. Hits get their
//! `thumbnail_path` immediately; misses become one task each on a serial
//! [`TaskQueue`].
//!
//! A failing codec never aborts the batch. The failure is logged, collected
//! into the report, and the leaf is simply left without a thumbnail.

use crate::cache::{Cache, CacheStats, FACT_THUMBNAIL};
use crate::entry::{Branch, Leaf, MediaKind};
use crate::imaging::{FrameExtractor, ImageResizer};
use crate::progress::{ProgressContext, ProgressReporter};
use crate::report::{Failure, Stage};
use crate::tasks::{Task, TaskQueue};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("failed to create thumbnail directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailOptions {
    pub thumbs_dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// The codecs a thumbnail run dispatches to.
#[derive(Clone, Copy)]
pub struct Codecs<'a> {
    pub resizer: &'a dyn ImageResizer,
    pub extractor: &'a dyn FrameExtractor,
}

#[derive(Debug, Default)]
pub struct ThumbnailReport {
    pub stats: CacheStats,
    pub failures: Vec<Failure>,
}

/// Where a leaf's thumbnail lives. `None` for kinds without a thumbnailer.
pub fn thumbnail_target(leaf: &Leaf, thumbs_dir: &Path) -> Option<PathBuf> {
    match leaf.media_kind {
        MediaKind::Image => Some(thumbs_dir.join(format!(
            "{}{}",
            leaf.identifier,
            leaf.extension().unwrap_or_default()
        ))),
        MediaKind::Video => Some(thumbs_dir.join(video_thumbnail_name(leaf))),
        MediaKind::Other => None,
    }
}

fn video_thumbnail_name(leaf: &Leaf) -> String {
    format!("{}.jpg", leaf.identifier)
}

struct ThumbCtx<'c> {
    leaves: Vec<&'c mut Leaf>,
    cache: &'c mut Cache,
    codecs: Codecs<'c>,
    options: &'c ThumbnailOptions,
    progress: ProgressContext<'c>,
    report: ThumbnailReport,
}

impl ThumbCtx<'_> {
    fn generate_one(&mut self, index: usize) {
        let leaf = &mut *self.leaves[index];
        let Some(target) = thumbnail_target(leaf, &self.options.thumbs_dir) else {
            return;
        };

        let result = match leaf.media_kind {
            MediaKind::Image => self
                .codecs
                .resizer
                .resize(&leaf.path, &target, self.options.width, self.options.height)
                .map(|()| target),
            MediaKind::Video => self.codecs.extractor.extract_frame(
                &leaf.path,
                &self.options.thumbs_dir,
                &video_thumbnail_name(leaf),
                self.options.width,
            ),
            MediaKind::Other => return,
        };

        match result {
            Ok(path) => {
                debug!(path = %leaf.path.display(), thumbnail = %path.display(), "generated");
                leaf.set_thumbnail_path(path);
                self.cache.record(&*leaf, FACT_THUMBNAIL, true);
                self.report.stats.generate();
            }
            Err(e) => {
                warn!(path = %leaf.path.display(), error = %e, "thumbnail failed");
                self.report
                    .failures
                    .push(Failure::new(Stage::Thumbnail, &leaf.path, e));
                self.report.stats.fail();
            }
        }
        self.progress.advance(&leaf.name);
    }
}

fn generate_task<'c>(index: usize) -> Task<'c, ThumbCtx<'c>, (), ThumbnailError> {
    Task::new(move |ctx: &mut ThumbCtx<'c>| {
        ctx.generate_one(index);
        Ok(())
    })
}

/// Make sure every supported leaf under `root` has a thumbnail.
///
/// Only failing to create the thumbnail directory is fatal; per-leaf codec
/// errors are collected into the returned report.
pub fn generate(
    root: &mut Branch,
    options: &ThumbnailOptions,
    codecs: Codecs<'_>,
    cache: &mut Cache,
    reporter: &mut dyn ProgressReporter,
) -> Result<ThumbnailReport, ThumbnailError> {
    fs::create_dir_all(&options.thumbs_dir).map_err(|source| ThumbnailError::CreateDir {
        path: options.thumbs_dir.clone(),
        source,
    })?;

    let leaves = root.leaves_mut();
    let total = leaves
        .iter()
        .filter(|l| l.media_kind != MediaKind::Other)
        .count();
    let mut progress = ProgressContext::new(Stage::Thumbnail.as_str(), Some(total), reporter);
    let mut report = ThumbnailReport::default();
    let mut pending = Vec::new();

    for leaf in leaves {
        let Some(target) = thumbnail_target(leaf, &options.thumbs_dir) else {
            leaf.renderable = false;
            report.stats.skip();
            debug!(path = %leaf.path.display(), mime = ?leaf.mime_type, "no thumbnailer, skipping");
            continue;
        };
        if cache.is_valid(&*leaf, FACT_THUMBNAIL, true) && target.exists() {
            debug!(path = %leaf.path.display(), "thumbnail cached");
            leaf.set_thumbnail_path(target);
            report.stats.hit();
            progress.advance(&leaf.name);
            continue;
        }
        pending.push(leaf);
    }

    info!(
        total,
        cached = report.stats.cached,
        to_generate = pending.len(),
        "generating thumbnails"
    );

    let mut queue = TaskQueue::new();
    queue.extend((0..pending.len()).map(generate_task));

    let mut ctx = ThumbCtx {
        leaves: pending,
        cache,
        codecs,
        options,
        progress,
        report,
    };
    queue.run_serially(&mut ctx)?;
    Ok(ctx.report)
}
