//! The content tree: files and directories discovered under the source root.
//!
//! Every discovered item is an [`Entry`], either a [`Leaf`] (regular file) or
//! a [`Branch`] (directory with ordered children). Both carry an
//! **identifier**: the SHA-256 of the entry's absolute path, hex encoded.
//!
//! The identifier hashes the *path*, not the file bytes. It is therefore
//! stable across runs as long as a file is not moved, cheap to compute for
//! multi-gigabyte videos, and safe to use as a filename on every platform.
//! It doubles as the cache key ([`crate::cache`]), the thumbnail filename
//! stem ([`crate::thumbnails`]) and the page filename of a directory
//! ([`crate::render`]).
//!
//! ```text
//! /photos                     Branch  → 1c7d…e2.html (root renders as index.html)
//! ├── a.jpg                   Leaf    → _thumbs/5f0a…91.jpg
//! └── trips                   Branch  → 9b44…0d.html
//!     └── clip.mp4            Leaf    → _thumbs/e310…7a.jpg
//! ```

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Media classification derived from a file's MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A still image the resizer can thumbnail.
    Image,
    /// A video the frame extractor can thumbnail.
    Video,
    /// Anything else. Listed in the gallery, never thumbnailed.
    Other,
}

/// Extension → MIME type table.
///
/// Lookups are case-insensitive. Only the types listed in
/// [`SUPPORTED_IMAGE_TYPES`] and [`SUPPORTED_VIDEO_TYPES`] get thumbnails; the
/// rest are here so the gallery can still label them.
const MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpe", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("svg", "image/svg+xml"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("mp4v", "video/mp4"),
    ("mov", "video/quicktime"),
    ("qt", "video/quicktime"),
    ("ogv", "video/ogg"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("ogg", "audio/ogg"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
];

pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

pub const SUPPORTED_VIDEO_TYPES: &[&str] =
    &["video/mp4", "video/quicktime", "video/ogg", "video/webm"];

/// Look up the MIME type for a path by its extension.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    MIME_TYPES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

impl MediaKind {
    pub fn from_mime(mime: Option<&str>) -> Self {
        match mime {
            Some(m) if SUPPORTED_IMAGE_TYPES.contains(&m) => MediaKind::Image,
            Some(m) if SUPPORTED_VIDEO_TYPES.contains(&m) => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// Hex SHA-256 of a path. Pure function of the path bytes.
pub fn identifier_for(path: &Path) -> String {
    let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
    format!("{:x}", digest)
}

/// Milliseconds since the Unix epoch. Times before the epoch clamp to 0.
pub fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Modification time of a path in epoch milliseconds.
pub fn modified_millis(path: &Path) -> io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(epoch_millis(modified))
}

/// Percent-encoded, `/`-separated href of `path` relative to the directory
/// `base`.
///
/// Walks up with `..` when `path` is outside `base`. Paths sharing no root
/// with `base` fall back to their full lossy string. Every segment is
/// encoded, so `#`, `?` and `%` in names survive as part of the link.
pub fn relative_href(path: &Path, base: &Path) -> String {
    let target: Vec<Component<'_>> = path.components().collect();
    let from: Vec<Component<'_>> = base.components().collect();
    let common = target
        .iter()
        .zip(&from)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return path
            .to_string_lossy()
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
    }

    let ups = std::iter::repeat_n("..".to_string(), from.len() - common);
    let downs = target[common..]
        .iter()
        .map(|c| urlencoding::encode(&c.as_os_str().to_string_lossy()).into_owned());
    ups.chain(downs).collect::<Vec<_>>().join("/")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Anything the cache can key: an identifier plus the source mtime.
pub trait Stamped {
    fn identifier(&self) -> &str;
    fn modified_at(&self) -> i64;
}

/// A regular file.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub path: PathBuf,
    pub identifier: String,
    pub name: String,
    /// Source mtime (epoch ms) captured at discovery.
    pub modified_at: i64,
    pub mime_type: Option<&'static str>,
    pub media_kind: MediaKind,
    /// Output-relative href when the file was copied into the output tree.
    pub public_href: Option<String>,
    /// Cleared by the thumbnail stage for kinds it cannot handle.
    pub renderable: bool,
    thumbnail_path: Option<PathBuf>,
}

impl Leaf {
    pub fn new(path: impl Into<PathBuf>, modified_at: i64) -> Self {
        let path = path.into();
        let mime_type = mime_type_for(&path);
        Self {
            identifier: identifier_for(&path),
            name: display_name(&path),
            modified_at,
            mime_type,
            media_kind: MediaKind::from_mime(mime_type),
            public_href: None,
            renderable: true,
            thumbnail_path: None,
            path,
        }
    }

    /// Build a leaf from a file on disk, reading its mtime.
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let modified_at = modified_millis(&path)?;
        Ok(Self::new(path, modified_at))
    }

    pub fn thumbnail_path(&self) -> Option<&Path> {
        self.thumbnail_path.as_deref()
    }

    /// Set the thumbnail path. Write-once: returns `false` and leaves the
    /// existing value untouched if one was already set this run.
    pub fn set_thumbnail_path(&mut self, path: impl Into<PathBuf>) -> bool {
        if self.thumbnail_path.is_some() {
            return false;
        }
        self.thumbnail_path = Some(path.into());
        true
    }

    /// Original extension including the dot, as written on disk (`".JPG"`).
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
    }
}

impl Stamped for Leaf {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn modified_at(&self) -> i64 {
        self.modified_at
    }
}

/// A directory and its children in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub path: PathBuf,
    pub identifier: String,
    pub name: String,
    pub modified_at: i64,
    pub children: Vec<Entry>,
}

impl Branch {
    pub fn new(path: impl Into<PathBuf>, modified_at: i64) -> Self {
        let path = path.into();
        Self {
            identifier: identifier_for(&path),
            name: display_name(&path),
            modified_at,
            children: Vec::new(),
            path,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let modified_at = modified_millis(&path)?;
        Ok(Self::new(path, modified_at))
    }

    /// `<identifier>.html`. Derived, so it cannot change within a run.
    pub fn page_filename(&self) -> String {
        format!("{}.html", self.identifier)
    }

    /// Direct leaf children only (no grandchildren).
    pub fn leaves(&self) -> impl Iterator<Item = &Leaf> {
        self.children.iter().filter_map(|child| match child {
            Entry::Leaf(leaf) => Some(leaf),
            Entry::Branch(_) => None,
        })
    }

    /// Direct sub-directories.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.children.iter().filter_map(|child| match child {
            Entry::Branch(branch) => Some(branch),
            Entry::Leaf(_) => None,
        })
    }

    /// Every leaf in the subtree, depth-first in child order.
    ///
    /// Walks with an explicit stack so deep trees cannot overflow.
    pub fn leaves_mut(&mut self) -> Vec<&mut Leaf> {
        let mut out = Vec::new();
        let mut stack = vec![self.children.iter_mut()];
        while let Some(iter) = stack.last_mut() {
            match iter.next() {
                Some(Entry::Leaf(leaf)) => out.push(leaf),
                Some(Entry::Branch(branch)) => stack.push(branch.children.iter_mut()),
                None => {
                    stack.pop();
                }
            }
        }
        out
    }

    /// Every entry in the subtree (excluding `self`), depth-first pre-order.
    pub fn descendants(&self) -> Vec<&Entry> {
        let mut out = Vec::new();
        let mut stack = vec![self.children.iter()];
        while let Some(iter) = stack.last_mut() {
            match iter.next() {
                Some(entry) => {
                    out.push(entry);
                    if let Entry::Branch(branch) = entry {
                        stack.push(branch.children.iter());
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
        out
    }

    /// `(leaves, branches)` in the subtree, `self` included as a branch.
    pub fn counts(&self) -> (usize, usize) {
        self.descendants()
            .into_iter()
            .fold((0, 1), |(leaves, branches), entry| match entry {
                Entry::Leaf(_) => (leaves + 1, branches),
                Entry::Branch(_) => (leaves, branches + 1),
            })
    }
}

impl Stamped for Branch {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn modified_at(&self) -> i64 {
        self.modified_at
    }
}

/// A node of the content tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Leaf(Leaf),
    Branch(Branch),
}

impl Entry {
    pub fn path(&self) -> &Path {
        match self {
            Entry::Leaf(leaf) => &leaf.path,
            Entry::Branch(branch) => &branch.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::Leaf(leaf) => &leaf.name,
            Entry::Branch(branch) => &branch.name,
        }
    }
}

impl Stamped for Entry {
    fn identifier(&self) -> &str {
        match self {
            Entry::Leaf(leaf) => &leaf.identifier,
            Entry::Branch(branch) => &branch.identifier,
        }
    }

    fn modified_at(&self) -> i64 {
        match self {
            Entry::Leaf(leaf) => leaf.modified_at,
            Entry::Branch(branch) => branch.modified_at,
        }
    }
}
