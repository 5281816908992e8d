//! Stage 1: walk the source directory and build the content tree.
//!
//! Discovery lists one directory per task on the serial [`TaskQueue`]. A
//! listing task stats its immediate children, records them in an arena, and
//! enqueues a subtask for every sub-directory (and, in copy mode, for every
//! file). Subtasks run before the listing's siblings, so the walk is
//! depth-first without recursion.
//!
//! ## What is skipped
//!
//! - Names starting with `.` (dot-files and dot-directories)
//! - The output directory, when it lives inside the source tree
//! - Anything that is neither a regular file nor a directory
//!
//! Children are visited in file-name order, which makes the tree and every
//! page derived from it reproducible across platforms.
//!
//! ## Copy mode
//!
//! With `copy_files` enabled every leaf is mirrored into
//! `<output>/<full_dir_name>/<path relative to source>` through a
//! [`Transform`]. A copy is skipped when the cache holds a valid
//! [`FACT_COPIED`] fact **and** the transform reports the destination
//! current. A failed copy drops the leaf from the tree and discovery
//! continues.
//!
//! A failed directory listing aborts the build.

use crate::cache::{Cache, FACT_COPIED};
use crate::entry::{Branch, Entry, Leaf, epoch_millis, relative_href};
use crate::progress::{ProgressContext, ProgressReporter};
use crate::report::{Failure, Stage};
use crate::tasks::{Task, TaskQueue};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("source is not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{program} {action} exited with {status}")]
    Command {
        program: PathBuf,
        action: &'static str,
        status: ExitStatus,
    },
}

/// Mirrors a source file into the output tree.
pub trait Transform {
    /// Whether `dest` is already an up-to-date rendition of `source`.
    fn read(&self, source: &Path, dest: &Path) -> Result<bool, TransformError>;

    /// Produce `dest` from `source`. The parent directory already exists.
    fn write(&self, source: &Path, dest: &Path) -> Result<(), TransformError>;
}

/// Plain byte-for-byte copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn read(&self, _source: &Path, dest: &Path) -> Result<bool, TransformError> {
        Ok(dest.exists())
    }

    fn write(&self, source: &Path, dest: &Path) -> Result<(), TransformError> {
        if dest.exists() {
            fs::remove_file(dest)?;
        }
        fs::copy(source, dest)?;
        Ok(())
    }
}

/// Delegates to a user program: `<program> read|write <source> <dest>`.
///
/// For `read`, exit status 0 means the destination is current. For `write`,
/// any non-zero status is a failure.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: PathBuf,
}

impl CommandTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, action: &str, source: &Path, dest: &Path) -> io::Result<ExitStatus> {
        debug!(
            program = %self.program.display(),
            action,
            source = %source.display(),
            "running transform"
        );
        Command::new(&self.program)
            .arg(action)
            .arg(source)
            .arg(dest)
            .stdin(Stdio::null())
            .status()
    }
}

impl Transform for CommandTransform {
    fn read(&self, source: &Path, dest: &Path) -> Result<bool, TransformError> {
        Ok(self.run("read", source, dest)?.success())
    }

    fn write(&self, source: &Path, dest: &Path) -> Result<(), TransformError> {
        let status = self.run("write", source, dest)?;
        if status.success() {
            Ok(())
        } else {
            Err(TransformError::Command {
                program: self.program.clone(),
                action: "write",
                status,
            })
        }
    }
}

/// Copy-mode settings.
pub struct CopyMode<'a> {
    /// `<output>/<full_dir_name>`
    pub full_dir: PathBuf,
    pub transform: &'a dyn Transform,
}

pub struct DiscoverOptions<'a> {
    /// Output root. Excluded from the walk and the base for `public_href`.
    pub output: &'a Path,
    pub copy: Option<CopyMode<'a>>,
}

/// Result of a discovery run.
#[derive(Debug)]
pub struct Discovery {
    pub root: Branch,
    pub failures: Vec<Failure>,
    /// Leaves actually copied this run (cache hits excluded).
    pub copied: usize,
}

struct DiscoverCtx<'c> {
    source: PathBuf,
    output: PathBuf,
    copy: Option<CopyMode<'c>>,
    cache: &'c mut Cache,
    progress: ProgressContext<'c>,
    /// Arena of discovered entries. Index 0 is the root. `None` marks a
    /// leaf dropped after a failed copy.
    nodes: Vec<Option<Entry>>,
    children: Vec<Vec<usize>>,
    failures: Vec<Failure>,
    copied: usize,
}

impl DiscoverCtx<'_> {
    fn add(&mut self, parent: usize, entry: Entry) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Some(entry));
        self.children.push(Vec::new());
        self.children[parent].push(index);
        index
    }
}

/// Walk `source` and return the content tree.
pub fn discover(
    source: &Path,
    options: DiscoverOptions<'_>,
    cache: &mut Cache,
    reporter: &mut dyn ProgressReporter,
) -> Result<Discovery, DiscoverError> {
    let root = Branch::from_path(source).map_err(|source_err| DiscoverError::ReadDir {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    if !source.is_dir() {
        return Err(DiscoverError::NotADirectory(source.to_path_buf()));
    }

    let total = count_leaves(source, options.output);
    info!(source = %source.display(), files = ?total, "discovering");

    let mut ctx = DiscoverCtx {
        source: source.to_path_buf(),
        output: options.output.to_path_buf(),
        copy: options.copy,
        cache,
        progress: ProgressContext::new(Stage::Discover.as_str(), total, reporter),
        nodes: vec![Some(Entry::Branch(root))],
        children: vec![Vec::new()],
        failures: Vec::new(),
        copied: 0,
    };

    let mut queue = TaskQueue::new();
    queue.push(list_dir(0, source.to_path_buf()));
    queue.run_serially(&mut ctx)?;

    let DiscoverCtx {
        nodes,
        children,
        failures,
        copied,
        ..
    } = ctx;
    let root = assemble(nodes, &children)
        .ok_or_else(|| DiscoverError::NotADirectory(source.to_path_buf()))?;
    Ok(Discovery {
        root,
        failures,
        copied,
    })
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Number of files discovery will visit, or `None` if the walk fails.
fn count_leaves(source: &Path, output: &Path) -> Option<usize> {
    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()) && e.path() != output);
    let mut count = 0;
    for entry in walker {
        if entry.ok()?.file_type().is_file() {
            count += 1;
        }
    }
    Some(count)
}

fn list_dir<'c>(index: usize, dir: PathBuf) -> Task<'c, DiscoverCtx<'c>, (), DiscoverError> {
    Task::spawning(move |ctx: &mut DiscoverCtx<'c>, subtasks| {
        let read_err = |source: io::Error| DiscoverError::ReadDir {
            path: dir.clone(),
            source,
        };
        let mut names = Vec::new();
        for item in fs::read_dir(&dir).map_err(read_err)? {
            names.push(item.map_err(read_err)?.file_name());
        }
        names.sort();

        for name in names {
            if is_hidden(&name) {
                continue;
            }
            let path = dir.join(&name);
            if path == ctx.output {
                debug!(path = %path.display(), "skipping output directory");
                continue;
            }

            let meta = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat, skipping");
                    ctx.failures.push(Failure::new(Stage::Discover, &path, e));
                    continue;
                }
            };
            let modified_at = meta.modified().map(epoch_millis).unwrap_or(0);

            if meta.is_dir() {
                let child = ctx.add(index, Entry::Branch(Branch::new(&path, modified_at)));
                subtasks.push(list_dir(child, path));
            } else if meta.is_file() {
                let leaf = Leaf::new(&path, modified_at);
                let label = leaf.name.clone();
                let child = ctx.add(index, Entry::Leaf(leaf));
                if ctx.copy.is_some() {
                    subtasks.push(copy_leaf(child));
                } else {
                    ctx.progress.advance(&label);
                }
            } else {
                debug!(path = %path.display(), "not a file or directory, skipping");
            }
        }
        Ok(())
    })
}

fn copy_leaf<'c>(index: usize) -> Task<'c, DiscoverCtx<'c>, (), DiscoverError> {
    Task::new(move |ctx: &mut DiscoverCtx<'c>| {
        let Some(copy) = &ctx.copy else {
            return Ok(());
        };
        let Some(Some(Entry::Leaf(leaf))) = ctx.nodes.get_mut(index) else {
            return Ok(());
        };

        let relative = leaf
            .path
            .strip_prefix(&ctx.source)
            .unwrap_or(Path::new(&leaf.name));
        let dest = copy.full_dir.join(relative);
        let label = leaf.name.clone();

        match copy_one(copy.transform, ctx.cache, leaf, &dest) {
            Ok(wrote) => {
                leaf.public_href = Some(relative_href(&dest, &ctx.output));
                if wrote {
                    ctx.copied += 1;
                }
            }
            Err(e) => {
                warn!(
                    path = %leaf.path.display(),
                    error = %e,
                    "copy failed, omitting from gallery"
                );
                ctx.failures.push(Failure::new(Stage::Discover, &leaf.path, e));
                ctx.nodes[index] = None;
            }
        }
        ctx.progress.advance(&label);
        Ok(())
    })
}

/// Copy one leaf unless the cache and the transform agree it is current.
///
/// Returns whether a write happened.
fn copy_one(
    transform: &dyn Transform,
    cache: &mut Cache,
    leaf: &Leaf,
    dest: &Path,
) -> Result<bool, TransformError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if cache.is_valid(leaf, FACT_COPIED, true) && transform.read(&leaf.path, dest)? {
        debug!(path = %leaf.path.display(), "copy cached");
        return Ok(false);
    }
    transform.write(&leaf.path, dest)?;
    cache.record(leaf, FACT_COPIED, true);
    Ok(true)
}

/// Fold the arena back into a tree. Children always sit at higher indices
/// than their parent, so a reverse sweep sees every child before its parent.
fn assemble(mut nodes: Vec<Option<Entry>>, children: &[Vec<usize>]) -> Option<Branch> {
    for index in (0..nodes.len()).rev() {
        let kids: Vec<Entry> = children[index]
            .iter()
            .filter_map(|&child| nodes[child].take())
            .collect();
        if let Some(Entry::Branch(branch)) = nodes[index].as_mut() {
            branch.children = kids;
        }
    }
    match nodes.into_iter().next() {
        Some(Some(Entry::Branch(root))) => Some(root),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::test_helpers::{RecordingProgress, write_tree};
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn names(branch: &Branch) -> Vec<&str> {
        branch.children.iter().map(|c| c.name()).collect()
    }

    fn plain(output: &Path) -> DiscoverOptions<'_> {
        DiscoverOptions { output, copy: None }
    }

    /// Records every call and fails `write` for sources named in `fail`.
    #[derive(Default)]
    struct ScriptedTransform {
        fail: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl Transform for ScriptedTransform {
        fn read(&self, source: &Path, dest: &Path) -> Result<bool, TransformError> {
            self.calls
                .borrow_mut()
                .push(format!("read {}", source.file_name().unwrap().to_string_lossy()));
            Ok(dest.exists())
        }

        fn write(&self, source: &Path, dest: &Path) -> Result<(), TransformError> {
            let name = source.file_name().unwrap().to_string_lossy().into_owned();
            self.calls.borrow_mut().push(format!("write {name}"));
            if self.fail.contains(&name.as_str()) {
                return Err(io::Error::other("scripted failure").into());
            }
            fs::copy(source, dest)?;
            Ok(())
        }
    }

    // =========================================================================
    // Tree shape
    // =========================================================================

    #[test]
    fn builds_sorted_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["b.png", "a.jpg", "sub/c.mp4", "sub/deeper/d.gif"]);
        let out = tmp.path().join("out");

        let mut cache = Cache::empty(out.join(".cache"));
        let found = discover(&src, plain(&out), &mut cache, &mut NoProgress).unwrap();

        assert_eq!(names(&found.root), vec!["a.jpg", "b.png", "sub"]);
        let sub = found.root.branches().next().unwrap();
        assert_eq!(names(sub), vec!["c.mp4", "deeper"]);
        assert_eq!(found.root.counts(), (4, 3));
        assert!(found.failures.is_empty());
    }

    #[test]
    fn skips_dot_files_and_dot_dirs() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &["a.jpg", ".DS_Store", ".git/config"]);
        let out = tmp.path().join("out");

        let mut cache = Cache::empty(out.join(".cache"));
        let found = discover(tmp.path(), plain(&out), &mut cache, &mut NoProgress).unwrap();
        assert_eq!(names(&found.root), vec!["a.jpg"]);
    }

    #[test]
    fn skips_output_inside_source() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &["a.jpg", "html/index.html", "html/_thumbs/x.jpg"]);
        let out = tmp.path().join("html");

        let mut cache = Cache::empty(out.join(".cache"));
        let found = discover(tmp.path(), plain(&out), &mut cache, &mut NoProgress).unwrap();
        assert_eq!(names(&found.root), vec!["a.jpg"]);
    }

    #[test]
    fn empty_directory_is_empty_branch() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let out = tmp.path().join("out");

        let mut cache = Cache::empty(out.join(".cache"));
        let found = discover(tmp.path(), plain(&out), &mut cache, &mut NoProgress).unwrap();
        let empty = found.root.branches().next().unwrap();
        assert!(empty.children.is_empty());
    }

    #[test]
    fn missing_source_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let mut cache = Cache::empty(tmp.path().join(".cache"));
        let err = discover(&missing, plain(tmp.path()), &mut cache, &mut NoProgress).unwrap_err();
        assert!(matches!(err, DiscoverError::ReadDir { .. }));
    }

    #[test]
    fn nested_listing_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["a.jpg"]);
        // A sub-directory removed after its parent was listed.
        let vanished = src.join("gone").join("sub");

        let mut cache = Cache::empty(tmp.path().join(".cache"));
        let mut reporter = NoProgress;
        let mut ctx = DiscoverCtx {
            source: src.clone(),
            output: tmp.path().join("out"),
            copy: None,
            cache: &mut cache,
            progress: ProgressContext::new(Stage::Discover.as_str(), None, &mut reporter),
            nodes: vec![Some(Entry::Branch(Branch::new(&src, 0)))],
            children: vec![Vec::new()],
            failures: Vec::new(),
            copied: 0,
        };
        let mut queue = TaskQueue::new();
        queue.push(list_dir(0, vanished.clone()));

        match queue.run_serially(&mut ctx) {
            Err(DiscoverError::ReadDir { path, .. }) => assert_eq!(path, vanished),
            other => panic!("expected ReadDir, got {other:?}"),
        }
        assert!(ctx.failures.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn stat_failure_is_recorded_and_walk_continues() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["a.jpg", "sub/c.jpg"]);
        std::os::unix::fs::symlink(src.join("nowhere.jpg"), src.join("b.jpg")).unwrap();
        let out = tmp.path().join("out");

        let mut cache = Cache::empty(out.join(".cache"));
        let found = discover(&src, plain(&out), &mut cache, &mut NoProgress).unwrap();

        assert_eq!(names(&found.root), vec!["a.jpg", "sub"]);
        assert_eq!(found.root.leaves().count(), 1);
        assert_eq!(found.failures.len(), 1);
        assert_eq!(found.failures[0].stage, Stage::Discover);
        assert!(found.failures[0].path.ends_with("b.jpg"));
    }

    #[test]
    fn file_as_source_is_fatal() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &["a.jpg"]);
        let mut cache = Cache::empty(tmp.path().join(".cache"));
        let err = discover(
            &tmp.path().join("a.jpg"),
            plain(tmp.path()),
            &mut cache,
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, DiscoverError::NotADirectory(_)));
    }

    #[test]
    fn reports_progress_per_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["a.jpg", "sub/b.jpg"]);
        let out = tmp.path().join("out");

        let mut rec = RecordingProgress::default();
        let mut cache = Cache::empty(out.join(".cache"));
        discover(&src, plain(&out), &mut cache, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                ("discover: a.jpg".to_string(), Some(50.0)),
                ("discover: b.jpg".to_string(), Some(100.0)),
            ]
        );
    }

    // =========================================================================
    // Copy mode
    // =========================================================================

    #[test]
    fn copy_mode_mirrors_files_and_sets_href() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["a.jpg", "sub/c.mp4"]);
        let out = tmp.path().join("out");

        let mut cache = Cache::empty(out.join(".cache"));
        let options = DiscoverOptions {
            output: &out,
            copy: Some(CopyMode {
                full_dir: out.join("_full"),
                transform: &CopyTransform,
            }),
        };
        let mut found = discover(&src, options, &mut cache, &mut NoProgress).unwrap();

        assert_eq!(found.copied, 2);
        assert!(out.join("_full/a.jpg").exists());
        assert!(out.join("_full/sub/c.mp4").exists());
        let hrefs: Vec<Option<String>> = found
            .root
            .leaves_mut()
            .into_iter()
            .map(|l| l.public_href.clone())
            .collect();
        assert_eq!(
            hrefs,
            vec![
                Some("_full/a.jpg".to_string()),
                Some("_full/sub/c.mp4".to_string())
            ]
        );
    }

    #[test]
    fn copy_skipped_when_cached_and_current() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["a.jpg"]);
        let out = tmp.path().join("out");
        let transform = ScriptedTransform::default();
        let mut cache = Cache::empty(out.join(".cache"));

        for _ in 0..2 {
            let options = DiscoverOptions {
                output: &out,
                copy: Some(CopyMode {
                    full_dir: out.join("_full"),
                    transform: &transform,
                }),
            };
            discover(&src, options, &mut cache, &mut NoProgress).unwrap();
        }

        // First run: not cached, so no read. Second run: cached, read says current.
        assert_eq!(*transform.calls.borrow(), vec!["write a.jpg", "read a.jpg"]);
    }

    #[test]
    fn failed_copy_drops_leaf_and_continues() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_tree(&src, &["a.jpg", "b.jpg", "c.jpg"]);
        let out = tmp.path().join("out");
        let transform = ScriptedTransform {
            fail: vec!["b.jpg"],
            ..Default::default()
        };

        let mut cache = Cache::empty(out.join(".cache"));
        let options = DiscoverOptions {
            output: &out,
            copy: Some(CopyMode {
                full_dir: out.join("_full"),
                transform: &transform,
            }),
        };
        let found = discover(&src, options, &mut cache, &mut NoProgress).unwrap();

        assert_eq!(names(&found.root), vec!["a.jpg", "c.jpg"]);
        assert_eq!(found.failures.len(), 1);
        assert_eq!(found.failures[0].stage, Stage::Discover);
        assert!(found.failures[0].path.ends_with("b.jpg"));
        assert_eq!(cache.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn command_transform_maps_exit_status() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");

        assert!(CommandTransform::new("true").read(&a, &b).unwrap());
        assert!(!CommandTransform::new("false").read(&a, &b).unwrap());
        assert!(CommandTransform::new("true").write(&a, &b).is_ok());
        assert!(matches!(
            CommandTransform::new("false").write(&a, &b),
            Err(TransformError::Command { action: "write", .. })
        ));
    }

    #[test]
    fn command_transform_missing_program_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let t = CommandTransform::new(tmp.path().join("no-such-program"));
        assert!(matches!(
            t.read(Path::new("a"), Path::new("b")),
            Err(TransformError::Io(_))
        ));
    }
}
