use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use thumbgal::build::{self, BuildOptions, Collaborators};
use thumbgal::config::{self, Overrides};
use thumbgal::discover::{CommandTransform, CopyTransform, Transform};
use thumbgal::imaging::{FfmpegExtractor, RustResizer};
use thumbgal::progress::{LogProgress, NoProgress, ProgressReporter};
use thumbgal::output;
use thumbgal::render::PageCompiler;
use thumbgal::template::{HandlebarsTemplate, MaudTemplate};
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Flags for the build action.
#[derive(clap::Args, Clone, Debug)]
struct BuildArgs {
    /// Source directory to turn into a gallery
    #[arg(default_value = ".")]
    source: PathBuf,

    /// Output directory [default: html]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Config file to use instead of <SOURCE>/gallery.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Copy originals into the output so the gallery is self-contained
    #[arg(long, short = 'c')]
    copy_files: bool,

    /// Program run as `<PROG> read|write <src> <dest>` instead of a plain copy
    #[arg(long, value_name = "PROG")]
    transform: Option<PathBuf>,

    /// Thumbnail bounding box width [default: 300]
    #[arg(long, short)]
    width: Option<u32>,

    /// Thumbnail bounding box height [default: 300]
    #[arg(long)]
    height: Option<u32>,

    /// Pre-bundled client script, copied to <OUTPUT>/bundle.js
    #[arg(long)]
    script: Option<PathBuf>,

    /// Directory with a Handlebars index.html replacing the built-in layout
    #[arg(long, short, value_name = "DIR")]
    template: Option<PathBuf>,

    /// Ignore the build cache and regenerate every thumbnail
    #[arg(long)]
    no_cache: bool,

    /// Only print the final summary
    #[arg(long, short)]
    quiet: bool,
}

impl BuildArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            output: self.output.clone(),
            // A transform implies copying.
            copy_files: (self.copy_files || self.transform.is_some()).then_some(true),
            transform: self.transform.clone(),
            width: self.width,
            height: self.height,
            script: self.script.clone(),
            template: self.template.clone(),
        }
    }
}

#[derive(Parser)]
#[command(name = "thumbgal")]
#[command(about = "Incremental HTML gallery builder")]
#[command(long_about = "\
Incremental HTML gallery builder

Walks a directory tree and writes one HTML page per directory, with a
thumbnail for every image and video. Rebuilds only redo work for files whose
modification time changed since the last run.

Output layout:

  html/
  ├── index.html          # Root page
  ├── <identifier>.html   # One page per sub-directory
  ├── _thumbs/            # Generated thumbnails
  ├── _full/              # Copied originals (--copy-files)
  ├── bundle.js           # Client script (--script)
  └── .cache              # Build cache

Video thumbnails need ffmpeg and ffprobe on PATH.

Run 'thumbgal gen-config' to generate a documented gallery.toml.")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    build: BuildArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Build the gallery (default)
    Build(BuildArgs),
    /// Print a stock gallery.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Command::GenConfig) => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
        Some(Command::Build(args)) => run_build(args),
        None => run_build(cli.build),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_build(args: BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config(&args.source, args.config.as_deref())?;
    let config = args.overrides().apply(config)?;

    let handlebars;
    let compiler: &dyn PageCompiler = match &config.template {
        Some(dir) => {
            handlebars = HandlebarsTemplate::load(dir)?;
            &handlebars
        }
        None => &MaudTemplate,
    };

    let resizer = RustResizer::new();
    let extractor = FfmpegExtractor::from_path();
    if !extractor.is_available() {
        warn!("ffmpeg/ffprobe not found on PATH, video thumbnails will fail");
    }
    let copy = CopyTransform;
    let command;
    let transform: &dyn Transform = match &config.transform {
        Some(program) => {
            command = CommandTransform::new(program);
            &command
        }
        None => &copy,
    };
    let mut reporter: Box<dyn ProgressReporter> = if args.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(LogProgress)
    };

    let options = BuildOptions {
        source: args.source,
        config,
        use_cache: !args.no_cache,
    };
    let report = build::run(
        &options,
        Collaborators {
            resizer: &resizer,
            extractor: &extractor,
            compiler,
            transform,
        },
        reporter.as_mut(),
    )?;
    output::print_build_report(&report);
    Ok(())
}
