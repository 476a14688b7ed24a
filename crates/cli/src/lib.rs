use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_annotator_core::{detect_shape, PageAnnotations, PagePoint};
use pdf_annotator_engine::{
    default_engine, OpenSource, RenderEngine, RenderRequest, SearchTask, SharedEngine,
};
use pdf_annotator_storage::{
    AnnotationRepository, RecentDocument, RecentDocumentsRepository, Storage,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "pdf-annotator-cli")]
#[command(about = "PDF annotator CLI")]
pub struct Cli {
    /// Directory holding the annotation database and preferences
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a PDF as opened and print its recent-documents entry.
    Open {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the stored annotations of a PDF as JSON.
    Annotations {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Only this page (1-based)
        #[arg(long)]
        page: Option<u32>,
    },
    /// Delete every stored annotation of a PDF.
    Clear {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List recently opened documents.
    Recent {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Search the text of a PDF.
    Search {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Render a page to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Classify a freehand path read from stdin as JSON points.
    Detect,
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
    annotation_count: usize,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct PageOutput<'a> {
    page: u32,
    #[serde(flatten)]
    annotations: &'a PageAnnotations,
}

#[derive(Debug, Serialize)]
struct SearchHitOutput {
    page: u32,
    snippet: String,
}

#[derive(Debug, Serialize)]
struct DetectOutput {
    kind: String,
    confidence: f32,
    start: PagePoint,
    end: PagePoint,
}

/// Points accepted by `detect`: `{"x": 1, "y": 2}` or `[1, 2]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointInput {
    Object(PagePoint),
    Pair(f32, f32),
}

impl From<PointInput> for PagePoint {
    fn from(value: PointInput) -> Self {
        match value {
            PointInput::Object(point) => point,
            PointInput::Pair(x, y) => PagePoint::new(x, y),
        }
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let storage = match cli.data_dir {
        Some(dir) => Storage::with_root(dir),
        None => Storage::from_default_project().context("failed to locate data directory")?,
    };
    debug!(root = %storage.root().display(), "using data directory");

    match cli.command {
        Commands::Open { file } => run_open(&storage, &file),
        Commands::Info { file } => run_info(&storage, &file),
        Commands::Annotations { file, page } => run_annotations(&storage, &file, page),
        Commands::Clear { file } => run_clear(&storage, &file),
        Commands::Recent { limit } => run_recent(&storage, limit),
        Commands::Search { file, query } => run_search(&file, &query),
        Commands::Render { file, page, scale, output } => {
            run_render(&file, page, scale, output.as_deref())
        }
        Commands::Detect => run_detect(&storage),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_open(storage: &Storage, file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;
    let key = document_key(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;
    let page_count = engine.page_count(handle)?;
    engine.close(handle)?;

    let conn = storage.open_database().context("failed to open annotation database")?;
    let recent = RecentDocumentsRepository::new(&conn);
    let preferences = storage.load_preferences().context("failed to read preferences")?;

    let name = file.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let mut entry = RecentDocument::opened_now(key.clone(), name, page_count);
    if let Some(previous) = recent.get(&key)? {
        if preferences.restore_last_page && previous.last_page < page_count {
            entry.last_page = previous.last_page;
        }
        entry.original_uri = previous.original_uri;
        entry.thumbnail_path = previous.thumbnail_path;
    }
    recent.upsert(&entry)?;
    recent.prune(preferences.recent_limit)?;

    print_json(&entry)
}

fn run_info(storage: &Storage, file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let first_page_size_pt = if page_count > 0 {
        let size = engine.page_size(handle, 0)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };
    engine.close(handle)?;

    let conn = storage.open_database().context("failed to open annotation database")?;
    let annotation_count = AnnotationRepository::new(&conn).count_for_document(&document_key(file)?)?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count,
        first_page_size_pt,
        annotation_count,
    };
    print_json(&payload)
}

fn run_annotations(storage: &Storage, file: &Path, page: Option<u32>) -> Result<()> {
    ensure_pdf_exists(file)?;
    let page_index = page.map(one_based_to_index).transpose()?;

    let conn = storage.open_database().context("failed to open annotation database")?;
    let pages = AnnotationRepository::new(&conn)
        .load_for_document(&document_key(file)?)
        .context("failed to load annotations")?;

    let output: Vec<PageOutput<'_>> = pages
        .iter()
        .filter(|(number, _)| page_index.map_or(true, |wanted| **number == wanted))
        .map(|(number, annotations)| PageOutput { page: number + 1, annotations })
        .collect();
    print_json(&output)
}

fn run_clear(storage: &Storage, file: &Path) -> Result<()> {
    let conn = storage.open_database().context("failed to open annotation database")?;
    let removed = AnnotationRepository::new(&conn)
        .delete_all_for_document(&document_key(file)?)
        .context("failed to delete annotations")?;

    println!("removed {removed} annotations");
    Ok(())
}

fn run_recent(storage: &Storage, limit: Option<usize>) -> Result<()> {
    let limit = match limit {
        Some(limit) => limit,
        None => storage.load_preferences().context("failed to read preferences")?.recent_limit,
    };

    let conn = storage.open_database().context("failed to open annotation database")?;
    let documents = RecentDocumentsRepository::new(&conn).list(limit)?;
    print_json(&documents)
}

fn run_search(file: &Path, query: &str) -> Result<()> {
    ensure_pdf_exists(file)?;
    if query.trim().is_empty() {
        anyhow::bail!("search query must not be empty");
    }

    let engine = SharedEngine::new(default_engine());
    let handle = engine.open(file).context("failed to open PDF")?;

    let hits = SearchTask::start(engine.clone(), handle, query)
        .context("failed to start search")?
        .collect()
        .context("search did not complete")?;
    engine.close(handle)?;

    let output: Vec<SearchHitOutput> = hits
        .into_iter()
        .map(|hit| SearchHitOutput { page: hit.page_index + 1, snippet: hit.snippet })
        .collect();
    print_json(&output)
}

fn run_render(file: &Path, page: u32, scale: f32, output: Option<&Path>) -> Result<()> {
    ensure_pdf_exists(file)?;
    let page_index = one_based_to_index(page)?;
    if !scale.is_finite() || scale <= 0.0 {
        anyhow::bail!("--scale must be a positive finite number");
    }

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;
    let image = engine
        .render_page(handle, RenderRequest::new(page_index, scale))
        .context("failed to render page")?;
    engine.close(handle)?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_detect(storage: &Storage) -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input).context("failed to read stdin")?;

    let points: Vec<PointInput> =
        serde_json::from_str(&input).context("stdin must be a JSON array of points")?;
    let points: Vec<PagePoint> = points.into_iter().map(PagePoint::from).collect();

    let config = storage.load_preferences().context("failed to read preferences")?.annotator.detection;
    match detect_shape(&points, &config) {
        Some(shape) => print_json(&DetectOutput {
            kind: shape.kind.to_string(),
            confidence: shape.confidence,
            start: shape.start,
            end: shape.end,
        }),
        None => {
            println!("none");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Path under which a document's annotations are stored
fn document_key(file: &Path) -> Result<String> {
    let path = if file.exists() {
        fs::canonicalize(file)
            .with_context(|| format!("failed to resolve path {}", file.display()))?
    } else {
        file.to_path_buf()
    };
    Ok(path.to_string_lossy().into_owned())
}

fn one_based_to_index(page: u32) -> Result<u32> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    Ok(page - 1)
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

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
