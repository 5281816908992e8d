//! Page templates.
//!
//! [`MaudTemplate`] is the built-in [`PageCompiler`]. It renders a
//! [`PageModel`] into a single self-contained HTML document with
//! [maud](https://maud.lambda.xyz/): markup is type-checked at compile time
//! and every label and href is escaped automatically.
//!
//! [`HandlebarsTemplate`] replaces it when a template directory is
//! configured. The directory must contain `index.html`, a Handlebars
//! template that receives the serialized [`PageModel`] (`title`, `script`,
//! `index`, and `items` with `kind`, `href`, `label`, `thumbnails[].src`,
//! `mime_type`, `empty`, `renderable`). The file is loaded and parsed once,
//! before the build starts.
//!
//! ## Page structure
//!
//! ```text
//! header  → page title, link back to the index on sub-pages
//! main    → grid of cards, one per item
//!           dir card:  up to N preview thumbnails + directory name
//!           file card: its thumbnail (or a placeholder) + file name
//! script  → bundle.js, when a script is configured
//! ```
//!
//! ## Static assets
//!
//! `static/style.css` is embedded at compile time and inlined into every
//! page. An optional pre-bundled client script can be configured; it is
//! checked before the build starts and copied to `<output>/bundle.js`.

use crate::render::{CompileError, Item, ItemKind, PageCompiler, PageModel};
use handlebars::Handlebars;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const CSS: &str = include_str!("../static/style.css");

/// Filename the configured script is copied to inside the output directory.
pub const SCRIPT_FILENAME: &str = "bundle.js";

/// Page template looked up inside a template directory.
pub const TEMPLATE_FILENAME: &str = "index.html";

const TEMPLATE_NAME: &str = "index";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template asset not found: {0}")]
    MissingAsset(PathBuf),
    #[error("failed to install {path}: {source}")]
    Install {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid template {path}: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}

/// Fail early if a configured script does not exist.
pub fn check_script(script: &Path) -> Result<(), TemplateError> {
    if script.is_file() {
        Ok(())
    } else {
        Err(TemplateError::MissingAsset(script.to_path_buf()))
    }
}

/// Copy the script into the output root and return its href.
pub fn install_script(script: &Path, output: &Path) -> Result<String, TemplateError> {
    check_script(script)?;
    let dest = output.join(SCRIPT_FILENAME);
    fs::copy(script, &dest).map_err(|source| TemplateError::Install {
        path: dest.clone(),
        source,
    })?;
    debug!(script = %script.display(), dest = %dest.display(), "installed script");
    Ok(SCRIPT_FILENAME.to_string())
}

/// The built-in maud template.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaudTemplate;

impl PageCompiler for MaudTemplate {
    fn render(&self, model: &PageModel) -> Result<String, CompileError> {
        Ok(render_page(model).into_string())
    }
}

/// A user template directory rendered with Handlebars.
#[derive(Debug)]
pub struct HandlebarsTemplate {
    registry: Handlebars<'static>,
}

impl HandlebarsTemplate {
    /// Load and parse `<dir>/index.html`.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        let path = dir.join(TEMPLATE_FILENAME);
        if !path.is_file() {
            return Err(TemplateError::MissingAsset(path));
        }
        let source = fs::read_to_string(&path).map_err(|source| TemplateError::Read {
            path: path.clone(),
            source,
        })?;

        let mut registry = Handlebars::new();
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| TemplateError::Syntax {
                path: path.clone(),
                source: Box::new(e),
            })?;
        debug!(template = %path.display(), "loaded template");
        Ok(Self { registry })
    }
}

impl PageCompiler for HandlebarsTemplate {
    fn render(&self, model: &PageModel) -> Result<String, CompileError> {
        self.registry
            .render(TEMPLATE_NAME, model)
            .map_err(|e| CompileError(e.to_string()))
    }
}

// ============================================================================
// HTML Components
// ============================================================================

fn render_page(model: &PageModel) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (model.title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                header.page-header {
                    @if let Some(index) = &model.index {
                        a.back href=(index) { "Index" }
                    }
                    h1 { (model.title) }
                }
                main.gallery {
                    @if model.items.is_empty() {
                        p.gallery-empty { "Nothing here yet." }
                    }
                    @for item in &model.items {
                        (render_item(item))
                    }
                }
                @if let Some(script) = &model.script {
                    script src=(script) {}
                }
            }
        }
    }
}

fn render_item(item: &Item) -> Markup {
    match item.kind {
        ItemKind::Dir => html! {
            a.card.card-dir href=(item.href) data-type="dir" {
                div.previews data-count=(item.thumbnails.len()) {
                    @for thumb in &item.thumbnails {
                        img src=(thumb.src) alt="" loading="lazy";
                    }
                }
                span.label { (item.label) }
            }
        },
        ItemKind::File => html! {
            a.card.card-file.unsupported[!item.renderable]
                href=(item.href)
                data-type=[item.mime_type.as_deref()] {
                @if let Some(thumb) = item.thumbnails.first() {
                    img src=(thumb.src) alt=(item.label) loading="lazy";
                } @else {
                    div.placeholder {}
                }
                span.label { (item.label) }
            }
        },
    }
}
