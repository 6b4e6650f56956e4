use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_engine::{default_codec, DocumentCodec, PreviewRasterizer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use settings::{Settings, SettingsStore};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use workbench::{
    DirectorySink, DocId, ExportKind, PageRef, RotateDirection, WatermarkConfig, Workbench,
};

#[derive(Debug, Parser)]
#[command(name = "workbench-cli")]
#[command(about = "Merge, split and inspect PDF documents")]
pub struct Cli {
    /// Settings file to use instead of the standard location.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge pages of several PDFs into one document.
    Merge {
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
        /// Only merge these pages (DOC:PAGE, both 1-based).
        #[arg(long, value_name = "DOC:PAGE")]
        select: Vec<PageArg>,
        /// Rotate a page clockwise (DOC:PAGE:DEG).
        #[arg(long, value_name = "DOC:PAGE:DEG")]
        rotate: Vec<RotateArg>,
        #[command(flatten)]
        watermark: WatermarkArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Extract pages of one PDF into a new document.
    Split {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page numbers, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        pages: Vec<u32>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a thumbnail PNG for a page.
    RenderThumb {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Thumbnail width; defaults to the configured width.
        #[arg(long)]
        width: Option<u32>,
        /// Extra clockwise rotation in degrees.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rotate: i32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, clap::Args)]
struct WatermarkArgs {
    /// Stamp every output page with this text.
    #[arg(long)]
    watermark: Option<String>,
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    wm_count: i64,
    #[arg(long, default_value_t = 24, allow_hyphen_values = true)]
    wm_size: i64,
    #[arg(long, default_value_t = 0.5, allow_hyphen_values = true)]
    wm_opacity: f64,
    #[arg(long)]
    wm_color: Option<String>,
}

#[derive(Debug, clap::Args)]
struct OutputArgs {
    /// Directory the export is written to; defaults to the configured one.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
    /// Seed for watermark placement.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageArg {
    doc: usize,
    page: u32,
}

impl FromStr for PageArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (doc, page) =
            value.split_once(':').ok_or_else(|| format!("expected DOC:PAGE, got `{value}`"))?;
        Ok(Self { doc: parse_position(doc)?, page: parse_position(page)? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RotateArg {
    page: PageArg,
    direction: RotateDirection,
}

impl FromStr for RotateArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (page, degrees) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("expected DOC:PAGE:DEG, got `{value}`"))?;
        let degrees: i32 =
            degrees.parse().map_err(|_| format!("invalid rotation `{degrees}`"))?;
        Ok(Self { page: page.parse()?, direction: direction_for(degrees)? })
    }
}

fn parse_position<T: FromStr + PartialEq + From<u8>>(value: &str) -> Result<T, String> {
    let parsed: T = value.trim().parse().map_err(|_| format!("invalid number `{value}`"))?;
    if parsed == T::from(0) {
        return Err("positions are 1-based".to_owned());
    }
    Ok(parsed)
}

fn direction_for(degrees: i32) -> Result<RotateDirection, String> {
    match degrees.rem_euclid(360) {
        90 => Ok(RotateDirection::Right),
        180 => Ok(RotateDirection::Half),
        270 => Ok(RotateDirection::Left),
        _ => Err(format!("rotation must be 90, 180 or 270 degrees, got {degrees}")),
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageInfoOutput>,
}

#[derive(Debug, Serialize)]
struct PageInfoOutput {
    width: f32,
    height: f32,
    rotation: u16,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Merge { files, select, rotate, watermark, output } => {
            let settings = load_settings(cli.config.as_deref())?;
            run_merge(&settings, &files, &select, &rotate, &watermark, &output)
        }
        Commands::Split { file, pages, output } => {
            let settings = load_settings(cli.config.as_deref())?;
            run_split(&settings, &file, &pages, &output)
        }
        Commands::Info { file } => run_info(&file),
        Commands::RenderThumb { file, page, width, rotate, output } => {
            let settings = load_settings(cli.config.as_deref())?;
            run_render_thumb(&settings, &file, page, width, rotate, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let store = match config {
        Some(path) => SettingsStore::with_file(path),
        None => match SettingsStore::from_default_project() {
            Ok(store) => store,
            Err(err) => {
                log::warn!("{err}; using default settings");
                return Ok(Settings::default());
            }
        },
    };

    store.load().with_context(|| format!("failed to read settings from {}", store.path().display()))
}

fn run_merge(
    settings: &Settings,
    files: &[PathBuf],
    select: &[PageArg],
    rotate: &[RotateArg],
    watermark: &WatermarkArgs,
    output: &OutputArgs,
) -> Result<()> {
    let mut workbench = Workbench::new(settings.workbench.clone());
    let docs = load_all(&mut workbench, files)?;

    for arg in rotate {
        let page = page_ref(&docs, arg.page)?;
        workbench.rotate_page(page, arg.direction).with_context(|| format!("cannot rotate {page}"))?;
    }
    for arg in select {
        let page = page_ref(&docs, *arg)?;
        if !workbench.selection().contains(page) {
            workbench.toggle_selection(page).with_context(|| format!("cannot select {page}"))?;
        }
    }

    if let Some(text) = &watermark.watermark {
        let defaults = &settings.workbench.watermark;
        let color = watermark.wm_color.as_deref().unwrap_or(&defaults.color);
        let config = WatermarkConfig::new(
            text,
            watermark.wm_count,
            watermark.wm_size,
            watermark.wm_opacity,
            color,
            defaults,
        );
        workbench.queue_watermark(config)?;
    }

    let mut sink = DirectorySink::new(resolve_out_dir(settings, output)?);
    workbench.merge(&mut sink, &mut rng(output.seed)).context("merge failed")?;
    report_delivery(&sink)
}

fn run_split(settings: &Settings, file: &Path, pages: &[u32], output: &OutputArgs) -> Result<()> {
    let mut workbench = Workbench::new(settings.workbench.clone());
    let docs = load_all(&mut workbench, std::slice::from_ref(&file.to_path_buf()))?;

    for &page in pages {
        let page = page_ref(&docs, PageArg { doc: 1, page })?;
        if !workbench.selection().contains(page) {
            workbench.toggle_selection(page).with_context(|| format!("cannot select {page}"))?;
        }
    }

    let mut sink = DirectorySink::new(resolve_out_dir(settings, output)?);
    workbench
        .export(ExportKind::SplitSelected, &mut sink, &mut rng(output.seed))
        .context("split failed")?;
    report_delivery(&sink)
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let codec = default_codec();
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let handle = codec.load(&bytes).context("failed to open PDF")?;

    let page_count = codec.page_count(&handle);
    let pages = (0..page_count)
        .map(|index| {
            let size = codec.page_size(&handle, index)?;
            let rotation = codec.page_rotation(&handle, index)?;
            Ok(PageInfoOutput { width: size.width_pt, height: size.height_pt, rotation })
        })
        .collect::<Result<Vec<_>, pdf_engine::CodecError>>()
        .context("failed to read page geometry")?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_render_thumb(
    settings: &Settings,
    file: &Path,
    page: u32,
    width: Option<u32>,
    rotate: i32,
    output: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let mut config = settings.workbench.clone();
    if let Some(width) = width {
        config.thumbnail_width_px = width;
    }
    let mut workbench = Workbench::new(config);
    let docs = load_all(&mut workbench, std::slice::from_ref(&file.to_path_buf()))?;
    let target = page_ref(&docs, PageArg { doc: 1, page })?;

    if rotate != 0 {
        let direction = direction_for(rotate).map_err(anyhow::Error::msg)?;
        workbench.rotate_page(target, direction)?;
    }

    let job = workbench.request_thumbnail(target).context("failed to render thumbnail")?;
    let image = job.render(&PreviewRasterizer::new()).context("failed to render thumbnail")?;

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_thumbnail_output(file, page));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

/// Loads every file in order; the returned ids line up with 1-based input
/// positions.
fn load_all(workbench: &mut Workbench, files: &[PathBuf]) -> Result<Vec<DocId>> {
    files
        .iter()
        .map(|file| {
            ensure_pdf_exists(file)?;
            let bytes =
                fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            workbench
                .load_document(name, bytes)
                .with_context(|| format!("failed to open PDF {}", file.display()))
        })
        .collect()
}

fn page_ref(docs: &[DocId], arg: PageArg) -> Result<PageRef> {
    let doc = docs
        .get(arg.doc - 1)
        .copied()
        .with_context(|| format!("document {} was not given ({} inputs)", arg.doc, docs.len()))?;
    Ok(PageRef::new(doc, arg.page - 1))
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn resolve_out_dir(settings: &Settings, output: &OutputArgs) -> Result<PathBuf> {
    output
        .out_dir
        .clone()
        .or_else(|| settings.export_dir.clone())
        .context("no output directory: pass --out-dir or set export_dir in the settings file")
}

fn report_delivery(sink: &DirectorySink) -> Result<()> {
    if sink.delivered().is_empty() {
        anyhow::bail!("failed to write export into {}", sink.dir().display());
    }
    for path in sink.delivered() {
        println!("{}", path.display());
    }
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_thumbnail_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("thumbnail");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
