//! Stage 3: page rendering.
//!
//! Every [`Branch`] of the tree becomes one HTML page. The root is written
//! as the configured index filename (`index.html`), every other directory as
//! its [`Branch::page_filename`] (`<identifier>.html`). All pages live flat
//! in the output root, so every href in a page is relative to that root.
//!
//! ## View model
//!
//! A page is described by a [`PageModel`] handed to a [`PageCompiler`]:
//!
//! | Item | `href` | `thumbnails` |
//! |---|---|---|
//! | directory | its page filename | up to `preview_size` thumbnails of its files |
//! | file | `public_href`, else the source path relative to the output | its own, or none |
//!
//! Directory previews only sample the directory's direct files. File items
//! of a kind no codec handles carry `renderable: false` and never a
//! thumbnail. Items are sorted directories first, then by label in byte
//! order. Every href is percent-encoded per path segment.
//!
//! Sub-pages carry the index filename in [`PageModel::index`] so templates
//! can link back to the root; the root page itself has none.
//!
//! The preview sample is drawn from a RNG seeded with `preview_seed` mixed
//! with the directory's identifier, so rebuilding an unchanged tree produces
//! byte-identical pages.
//!
//! ## Ordering
//!
//! Pages are rendered in post-order: every sub-directory's page is written
//! before its parent's, and the root index last.

use crate::entry::{Branch, Entry, Leaf, relative_href};
use crate::progress::{ProgressContext, ProgressReporter};
use crate::report::Stage;
use crate::tasks::{Task, TaskQueue};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Error returned by a [`PageCompiler`].
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CompileError(pub String);

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to compile page {page}: {source}")]
    Compile {
        page: PathBuf,
        #[source]
        source: CompileError,
    },
    #[error("failed to write page {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Turns a view model into page markup. Must be pure: the same model always
/// yields the same string.
pub trait PageCompiler {
    fn render(&self, model: &PageModel) -> Result<String, CompileError>;
}

/// Directories sort before files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumb {
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub kind: ItemKind,
    pub href: String,
    pub label: String,
    pub thumbnails: Vec<Thumb>,
    pub mime_type: Option<String>,
    /// No thumbnails to show.
    pub empty: bool,
    /// False for files no codec can thumbnail.
    pub renderable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageModel {
    pub title: String,
    pub script: Option<String>,
    /// Href of the root page, set on every page but the root.
    pub index: Option<String>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub output: PathBuf,
    pub index_filename: String,
    /// Title of the root page. Other pages use their directory name.
    pub title: String,
    /// Script href included on every page.
    pub script: Option<String>,
    pub preview_size: usize,
    pub preview_seed: u64,
}

/// One page written by the render stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub title: String,
    pub path: PathBuf,
    pub items: usize,
}

/// Dirs first, then ascending label.
pub fn sort_items(items: &mut [Item]) {
    items.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.label.cmp(&b.label)));
}

/// Seed for a directory's preview sample.
pub fn branch_seed(seed: u64, identifier: &str) -> u64 {
    let mixed = identifier
        .get(..16)
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .unwrap_or(0);
    seed ^ mixed
}

/// Shuffle with `seed` and keep at most `size` thumbnails.
pub fn sample_thumbnails(mut thumbs: Vec<Thumb>, size: usize, seed: u64) -> Vec<Thumb> {
    let mut rng = StdRng::seed_from_u64(seed);
    thumbs.shuffle(&mut rng);
    thumbs.truncate(size);
    thumbs
}

fn thumb_for(leaf: &Leaf, output: &Path) -> Option<Thumb> {
    leaf.thumbnail_path().map(|p| Thumb {
        src: relative_href(p, output),
    })
}

fn leaf_item(leaf: &Leaf, output: &Path) -> Item {
    let thumbnails: Vec<Thumb> = if leaf.renderable {
        thumb_for(leaf, output).into_iter().collect()
    } else {
        Vec::new()
    };
    Item {
        kind: ItemKind::File,
        href: leaf
            .public_href
            .clone()
            .unwrap_or_else(|| relative_href(&leaf.path, output)),
        label: leaf.name.clone(),
        empty: thumbnails.is_empty(),
        thumbnails,
        mime_type: leaf.mime_type.map(str::to_string),
        renderable: leaf.renderable,
    }
}

fn branch_item(branch: &Branch, options: &RenderOptions) -> Item {
    let candidates: Vec<Thumb> = branch
        .leaves()
        .filter(|leaf| leaf.renderable)
        .filter_map(|leaf| thumb_for(leaf, &options.output))
        .collect();
    let thumbnails = sample_thumbnails(
        candidates,
        options.preview_size,
        branch_seed(options.preview_seed, &branch.identifier),
    );
    Item {
        kind: ItemKind::Dir,
        href: branch.page_filename(),
        label: branch.name.clone(),
        empty: thumbnails.is_empty(),
        thumbnails,
        mime_type: None,
        renderable: true,
    }
}

/// Build the sorted view model for one directory page.
pub fn page_model(branch: &Branch, title: &str, options: &RenderOptions) -> PageModel {
    let mut items: Vec<Item> = branch
        .children
        .iter()
        .map(|child| match child {
            Entry::Leaf(leaf) => leaf_item(leaf, &options.output),
            Entry::Branch(sub) => branch_item(sub, options),
        })
        .collect();
    sort_items(&mut items);
    PageModel {
        title: title.to_string(),
        script: options.script.clone(),
        index: None,
        items,
    }
}

/// Every branch under `root`, children before parents, `root` last.
fn post_order(root: &Branch) -> Vec<&Branch> {
    let mut out = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((branch, expanded)) = stack.pop() {
        if expanded {
            out.push(branch);
            continue;
        }
        stack.push((branch, true));
        let subs: Vec<&Branch> = branch.branches().collect();
        stack.extend(subs.into_iter().rev().map(|sub| (sub, false)));
    }
    out
}

struct RenderCtx<'c> {
    compiler: &'c dyn PageCompiler,
    progress: ProgressContext<'c>,
}

fn page_task<'c>(
    model: PageModel,
    path: PathBuf,
) -> Task<'c, RenderCtx<'c>, RenderedPage, RenderError> {
    Task::new(move |ctx: &mut RenderCtx<'c>| {
        let html = ctx
            .compiler
            .render(&model)
            .map_err(|source| RenderError::Compile {
                page: path.clone(),
                source,
            })?;
        fs::write(&path, html).map_err(|source| RenderError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(page = %path.display(), items = model.items.len(), "wrote page");

        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ctx.progress.advance(&label);
        Ok(RenderedPage {
            title: model.title,
            items: model.items.len(),
            path,
        })
    })
}

/// Write one page per branch. Any compile or write error aborts the stage.
pub fn render(
    root: &Branch,
    options: &RenderOptions,
    compiler: &dyn PageCompiler,
    reporter: &mut dyn ProgressReporter,
) -> Result<Vec<RenderedPage>, RenderError> {
    let branches = post_order(root);
    info!(pages = branches.len(), "rendering");

    let mut queue = TaskQueue::new();
    for branch in &branches {
        let is_root = std::ptr::eq(*branch, root);
        let (title, filename) = if is_root {
            (options.title.as_str(), options.index_filename.clone())
        } else {
            (branch.name.as_str(), branch.page_filename())
        };
        let mut model = page_model(branch, title, options);
        if !is_root {
            model.index = Some(urlencoding::encode(&options.index_filename).into_owned());
        }
        queue.push(page_task(model, options.output.join(filename)));
    }

    let mut ctx = RenderCtx {
        compiler,
        progress: ProgressContext::new(Stage::Render.as_str(), Some(branches.len()), reporter),
    };
    queue.run_serially(&mut ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::test_helpers::MockCompiler;
    use tempfile::TempDir;

    fn options(output: &Path) -> RenderOptions {
        RenderOptions {
            output: output.to_path_buf(),
            index_filename: "index.html".into(),
            title: "Home".into(),
            script: None,
            preview_size: 10,
            preview_seed: 0,
        }
    }

    fn leaf_with_thumb(path: &str, output: &Path) -> Entry {
        let mut leaf = Leaf::new(path, 0);
        leaf.set_thumbnail_path(output.join("_thumbs").join(format!("{}.jpg", leaf.identifier)));
        Entry::Leaf(leaf)
    }

    fn item(kind: ItemKind, label: &str) -> Item {
        Item {
            kind,
            href: String::new(),
            label: label.into(),
            thumbnails: vec![],
            mime_type: None,
            empty: true,
            renderable: true,
        }
    }

    // =========================================================================
    // Sorting
    // =========================================================================

    #[test]
    fn dirs_sort_before_files() {
        let mut items = vec![
            item(ItemKind::File, "a.jpg"),
            item(ItemKind::Dir, "zebra"),
            item(ItemKind::File, "B.jpg"),
            item(ItemKind::Dir, "apple"),
        ];
        sort_items(&mut items);
        let labels: Vec<(ItemKind, &str)> =
            items.iter().map(|i| (i.kind, i.label.as_str())).collect();
        assert_eq!(
            labels,
            vec![
                (ItemKind::Dir, "apple"),
                (ItemKind::Dir, "zebra"),
                (ItemKind::File, "B.jpg"),
                (ItemKind::File, "a.jpg"),
            ]
        );
    }

    #[test]
    fn item_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ItemKind::Dir).unwrap(), "\"dir\"");
        assert_eq!(serde_json::to_string(&ItemKind::File).unwrap(), "\"file\"");
    }

    // =========================================================================
    // Sampling
    // =========================================================================

    fn thumbs(n: usize) -> Vec<Thumb> {
        (0..n).map(|i| Thumb { src: format!("t{i}") }).collect()
    }

    #[test]
    fn sample_caps_at_size() {
        assert_eq!(sample_thumbnails(thumbs(25), 10, 1).len(), 10);
        assert_eq!(sample_thumbnails(thumbs(3), 10, 1).len(), 3);
        assert!(sample_thumbnails(vec![], 10, 1).is_empty());
    }

    #[test]
    fn sample_is_reproducible() {
        assert_eq!(
            sample_thumbnails(thumbs(25), 10, 42),
            sample_thumbnails(thumbs(25), 10, 42)
        );
    }

    #[test]
    fn sample_draws_without_repeats() {
        let mut srcs: Vec<String> = sample_thumbnails(thumbs(25), 10, 7)
            .into_iter()
            .map(|t| t.src)
            .collect();
        srcs.sort();
        srcs.dedup();
        assert_eq!(srcs.len(), 10);
    }

    #[test]
    fn branch_seed_depends_on_identifier() {
        let a = branch_seed(0, "00000000000000ff");
        let b = branch_seed(0, "00000000000000fe");
        assert_eq!(a, 0xff);
        assert_ne!(a, b);
        assert_eq!(branch_seed(5, "short"), 5);
    }

    // =========================================================================
    // View model
    // =========================================================================

    #[test]
    fn dir_previews_come_from_direct_children_only() {
        let out = Path::new("/out");
        let mut deep = Branch::new("/src/sub/deep", 0);
        deep.children.push(leaf_with_thumb("/src/sub/deep/x.jpg", out));
        let mut sub = Branch::new("/src/sub", 0);
        sub.children.push(leaf_with_thumb("/src/sub/a.jpg", out));
        sub.children.push(Entry::Leaf(Leaf::new("/src/sub/notes.txt", 0)));
        sub.children.push(Entry::Branch(deep));
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Branch(sub));

        let model = page_model(&root, "Home", &options(out));
        let dir = &model.items[0];
        assert_eq!(dir.kind, ItemKind::Dir);
        assert_eq!(dir.thumbnails.len(), 1);
        assert!(dir.thumbnails[0].src.starts_with("_thumbs/"));
        assert!(!dir.empty);
    }

    #[test]
    fn file_items_link_public_href_or_relative_source() {
        let out = Path::new("/gallery/html");
        let mut copied = Leaf::new("/gallery/a.jpg", 0);
        copied.public_href = Some("_full/a.jpg".into());
        let plain = Leaf::new("/gallery/b.txt", 0);
        let mut root = Branch::new("/gallery", 0);
        root.children.push(Entry::Leaf(copied));
        root.children.push(Entry::Leaf(plain));

        let model = page_model(&root, "Home", &options(out));
        assert_eq!(model.items[0].href, "_full/a.jpg");
        assert_eq!(model.items[0].mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(model.items[1].href, "../b.txt");
        assert!(model.items[1].empty);
        assert!(model.items[1].thumbnails.is_empty());
    }

    #[test]
    fn dir_item_links_page_filename() {
        let sub = Branch::new("/src/sub", 0);
        let expected = sub.page_filename();
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Branch(sub));

        let model = page_model(&root, "Home", &options(Path::new("/out")));
        assert_eq!(model.items[0].href, expected);
        assert!(model.items[0].empty);
    }

    #[test]
    fn hrefs_are_percent_encoded() {
        let out = Path::new("/out");
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Leaf(Leaf::new("/src/shot #1.jpg", 0)));

        let model = page_model(&root, "Home", &options(out));
        assert_eq!(model.items[0].href, "../src/shot%20%231.jpg");
        assert_eq!(model.items[0].label, "shot #1.jpg");
    }

    #[test]
    fn unrenderable_files_get_no_thumbnail_or_preview() {
        let out = Path::new("/out");
        let mut odd = Leaf::new("/src/sub/notes.txt", 0);
        odd.set_thumbnail_path(out.join("_thumbs/stale.jpg"));
        odd.renderable = false;
        let mut sub = Branch::new("/src/sub", 0);
        sub.children.push(Entry::Leaf(odd.clone()));
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Leaf(odd));
        root.children.push(Entry::Branch(sub));

        let model = page_model(&root, "Home", &options(out));
        let (dir, file) = (&model.items[0], &model.items[1]);
        assert!(dir.renderable);
        assert!(dir.thumbnails.is_empty());
        assert!(!file.renderable);
        assert!(file.thumbnails.is_empty());
        assert!(file.empty);
    }

    // =========================================================================
    // Page output
    // =========================================================================

    #[test]
    fn post_order_puts_root_last() {
        let mut b = Branch::new("/r/a/b", 0);
        b.children.push(Entry::Leaf(Leaf::new("/r/a/b/x.jpg", 0)));
        let mut a = Branch::new("/r/a", 0);
        a.children.push(Entry::Branch(b));
        let c = Branch::new("/r/c", 0);
        let mut root = Branch::new("/r", 0);
        root.children.push(Entry::Branch(a));
        root.children.push(Entry::Branch(c));

        let order: Vec<&str> = post_order(&root).iter().map(|b| b.name.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c", "r"]);
    }

    #[test]
    fn writes_index_and_subpages() {
        let tmp = TempDir::new().unwrap();
        let sub = Branch::new("/src/trips", 0);
        let sub_page = sub.page_filename();
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Branch(sub));

        let compiler = MockCompiler::default();
        let pages = render(&root, &options(tmp.path()), &compiler, &mut NoProgress).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].title, "trips");
        assert_eq!(pages[0].path, tmp.path().join(&sub_page));
        assert_eq!(pages[1].title, "Home");
        assert_eq!(pages[1].path, tmp.path().join("index.html"));
        assert!(tmp.path().join("index.html").exists());
        assert_eq!(compiler.titles(), vec!["trips", "Home"]);
    }

    #[test]
    fn only_sub_pages_link_back_to_index() {
        let tmp = TempDir::new().unwrap();
        let sub = Branch::new("/src/trips", 0);
        let sub_page = sub.page_filename();
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Branch(sub));

        render(&root, &options(tmp.path()), &MockCompiler::default(), &mut NoProgress).unwrap();

        let page = |name: &str| -> serde_json::Value {
            serde_json::from_str(&fs::read_to_string(tmp.path().join(name)).unwrap()).unwrap()
        };
        assert_eq!(page(&sub_page)["index"], "index.html");
        assert!(page("index.html")["index"].is_null());
    }

    #[test]
    fn render_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        let mut sub = Branch::new("/src/sub", 0);
        for i in 0..20 {
            sub.children
                .push(leaf_with_thumb(&format!("/src/sub/{i:02}.jpg"), out));
        }
        let mut root = Branch::new("/src", 0);
        root.children.push(Entry::Branch(sub));

        let compiler = MockCompiler::default();
        render(&root, &options(out), &compiler, &mut NoProgress).unwrap();
        let first = fs::read_to_string(out.join("index.html")).unwrap();
        render(&root, &options(out), &compiler, &mut NoProgress).unwrap();
        let second = fs::read_to_string(out.join("index.html")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn compile_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = Branch::new("/src", 0);
        let compiler = MockCompiler::failing();

        let err = render(&root, &options(tmp.path()), &compiler, &mut NoProgress).unwrap_err();
        assert!(matches!(err, RenderError::Compile { .. }));
    }

    #[test]
    fn write_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = Branch::new("/src", 0);
        let compiler = MockCompiler::default();

        let err = render(
            &root,
            &options(&tmp.path().join("missing-dir")),
            &compiler,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::Write { .. }));
    }
}
