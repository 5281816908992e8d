//! # thumbgal
//!
//! An incremental HTML gallery builder. Point it at a directory and it
//! writes one page per directory, a thumbnail for every image and video,
//! and a cache that lets the next run skip everything that did not change.
//!
//! # Architecture: Three Stages, One Tree
//!
//! ```text
//! 1. Discover    source/  →  Branch tree      (walk, optional copy/transform)
//! 2. Thumbnail   tree     →  tree + thumbs    (resize images, grab video frames)
//! 3. Render      tree     →  output/*.html    (view models → page compiler)
//! ```
//!
//! Each stage takes the tree from the previous one and fills in derived
//! fields. All work runs strictly in order through [`tasks::TaskQueue`], one
//! task at a time, so the cache and the output tree never need locking.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`entry`] | `Leaf` / `Branch` tree with path-derived identifiers |
//! | [`cache`] | Persisted `identifier → fact` records deciding what is stale |
//! | [`tasks`] | Serial task queue with front-inserted subtasks |
//! | [`discover`] | Stage 1: directory walk, copy mode, transforms |
//! | [`thumbnails`] | Stage 2: per-leaf thumbnail generation with failure isolation |
//! | [`render`] | Stage 3: view models, preview sampling, page writing |
//! | [`template`] | Maud and Handlebars page compilers, the optional script asset |
//! | [`imaging`] | Resizer / frame extractor traits and their default codecs |
//! | [`progress`] | `(label, percent)` progress events |
//! | [`report`] | Recoverable per-file failures |
//! | [`config`] | `gallery.toml` loading, layering, validation |
//! | [`build`] | Wires the stages together and saves the cache |
//! | [`output`] | CLI summary formatting |
//!
//! # Incremental Builds
//!
//! Every entry is keyed by the SHA-256 of its path. The cache stores named
//! facts per key (`thumbnail`, `copied`) together with the source mtime they
//! were observed at. A fact is valid while the file has not been modified
//! since, and the derived file is still on disk. A second run over an
//! unchanged tree makes no codec calls and writes identical pages.

pub mod build;
pub mod cache;
pub mod config;
pub mod discover;
pub mod entry;
pub mod imaging;
pub mod output;
pub mod progress;
pub mod render;
pub mod report;
pub mod tasks;
pub mod template;
pub mod thumbnails;

#[cfg(test)]
pub(crate) mod test_helpers;
