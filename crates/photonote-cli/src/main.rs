//! Command line front end for PhotoNote sessions.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use kurbo::Point;
use photonote_core::transform::{CropRect, ImageSize, PendingTransform};
use photonote_core::{
    CanvasSize, EditSession, EngineConfig, FileSessionCatalog, GestureEvent, SessionId,
    StrokeColor, ToolMode, TransformOutcome, create_file_catalog,
};
use photonote_render::{FileImageTransformer, RasterRenderer, resolve_image_path};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "photonote",
    version,
    about = "Annotate photos and keep the edits as sessions"
)]
struct Cli {
    /// Data directory (overrides config and PHOTONOTE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List sessions, most recent first
    List,
    /// Print one session and its document
    Show { id: SessionId },
    /// Create a session over an image
    New(NewArgs),
    /// Crop, rotate or flip a session's image
    Transform(TransformArgs),
    /// Rasterize a session to a PNG file
    Render { id: SessionId, out: PathBuf },
    /// Delete a session and its preview
    Delete { id: SessionId },
}

#[derive(Args, Debug)]
struct NewArgs {
    image: PathBuf,
    #[arg(long)]
    name: String,
    #[arg(long)]
    note: Option<String>,
    /// Stroke as space separated `x,y` points in image pixels (repeatable)
    #[arg(long = "stroke", value_parser = parse_stroke)]
    strokes: Vec<StrokeArg>,
    /// Stroke color as #rrggbb or #rrggbbaa
    #[arg(long)]
    color: Option<StrokeColor>,
    /// Stroke width in image pixels
    #[arg(long)]
    width: Option<f64>,
}

#[derive(Args, Debug)]
struct TransformArgs {
    id: SessionId,
    /// Clockwise rotation in degrees
    #[arg(long, allow_hyphen_values = true)]
    rotate: Option<f64>,
    #[arg(long)]
    flip_h: bool,
    #[arg(long)]
    flip_v: bool,
    /// Uniform scale applied before rotating
    #[arg(long)]
    scale: Option<f64>,
    /// Crop as x,y,w,h in pixels of the rotated image
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRect>,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got {s:?}"))?;
    let x: f64 = x
        .trim()
        .parse()
        .map_err(|e| format!("bad x in {s:?}: {e}"))?;
    let y: f64 = y
        .trim()
        .parse()
        .map_err(|e| format!("bad y in {s:?}: {e}"))?;
    Ok(Point::new(x, y))
}

/// Points of one `--stroke` argument.
#[derive(Debug, Clone)]
struct StrokeArg(Vec<Point>);

fn parse_stroke(s: &str) -> Result<StrokeArg, String> {
    parse_points(s).map(StrokeArg)
}

fn parse_points(s: &str) -> Result<Vec<Point>, String> {
    let points = s
        .split_whitespace()
        .map(parse_point)
        .collect::<Result<Vec<_>, _>>()?;
    if points.is_empty() {
        return Err("a stroke needs at least one point".to_string());
    }
    Ok(points)
}

fn parse_crop(s: &str) -> Result<CropRect, String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("bad crop value {v:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [x, y, w, h] => Ok(CropRect::new(*x, *y, *w, *h)),
        _ => Err(format!("expected x,y,w,h, got {s:?}")),
    }
}

/// Config, catalog and image collaborators shared by every command.
struct App {
    config: EngineConfig,
    catalog: FileSessionCatalog,
    transformer: FileImageTransformer,
    renderer: RasterRenderer,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::from_env(),
        };
        if let Some(dir) = &cli.data_dir {
            config.data_dir = dir.clone();
        }
        log::debug!("Using data directory {}", config.data_dir.display());

        let catalog = create_file_catalog(&config).context("opening session store")?;
        let transformer =
            FileImageTransformer::new(config.images_dir()).context("opening image directory")?;
        let renderer = RasterRenderer::from_config(&config);
        Ok(Self {
            config,
            catalog,
            transformer,
            renderer,
        })
    }

    async fn open_session(&self, id: SessionId) -> Result<EditSession> {
        match EditSession::load(&self.catalog, id).await? {
            Some(session) => Ok(session),
            None => bail!("no session with id {id}"),
        }
    }
}

fn image_size(image_ref: &str) -> Result<ImageSize> {
    let path = resolve_image_path(image_ref);
    let (width, height) = image::image_dimensions(&path)
        .with_context(|| format!("reading image size of {}", path.display()))?;
    Ok(ImageSize::new(width, height))
}

async fn list(app: &App) -> Result<()> {
    let records = app.catalog.list().await?;
    if records.is_empty() {
        println!("No sessions in {}", app.config.data_dir.display());
        return Ok(());
    }
    for record in records {
        println!(
            "{:>4}  {:<24}  {}  {}",
            record.id,
            record.name,
            record.created_at,
            record.preview_uri.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn show(app: &App, id: SessionId) -> Result<()> {
    let Some(record) = app.catalog.get(id).await? else {
        bail!("no session with id {id}");
    };
    let session = EditSession::from_record(&record)?;
    let state = session.state();
    println!("id:       {}", record.id);
    println!("name:     {}", record.name);
    println!("created:  {}", record.created_at);
    println!("preview:  {}", record.preview_uri.as_deref().unwrap_or("-"));
    println!("original: {}", state.original_image_ref);
    println!("current:  {}", state.current_image_ref);
    println!(
        "canvas:   {}x{}",
        state.canvas_size.width, state.canvas_size.height
    );
    println!("strokes:  {}", state.strokes().len());
    if !state.note_text.is_empty() {
        println!("note:     {}", state.note_text);
    }
    Ok(())
}

async fn create(app: &App, args: &NewArgs) -> Result<()> {
    let path = fs::canonicalize(&args.image)
        .with_context(|| format!("opening {}", args.image.display()))?;
    let image_ref = format!("file://{}", path.display());
    let size = image_size(&image_ref)?;

    let mut session = EditSession::new(
        image_ref,
        CanvasSize::new(size.width as f64, size.height as f64),
    )
    .with_brush(app.config.brush)?;
    if let Some(note) = &args.note {
        session.set_note(note.as_str());
    }
    if let Some(color) = args.color {
        session.pick_color(color);
    }
    if let Some(width) = args.width {
        session.set_stroke_width(width)?;
    }

    if !args.strokes.is_empty() {
        session.select_tool(ToolMode::Draw, &app.transformer).await;
        for StrokeArg(points) in &args.strokes {
            let (first, rest) = points.split_first().context("empty stroke")?;
            session.handle_gesture(GestureEvent::Begin(*first))?;
            for point in rest {
                session.handle_gesture(GestureEvent::Move(*point))?;
            }
            session.handle_gesture(GestureEvent::End(None))?;
        }
    }

    let id = session
        .save(
            Some(args.name.as_str()),
            &app.transformer,
            &app.renderer,
            &app.catalog,
        )
        .await?;
    println!("Created session {id}");
    Ok(())
}

async fn transform(app: &App, args: &TransformArgs) -> Result<()> {
    let mut session = app.open_session(args.id).await?;
    let source = image_size(&session.state().current_image_ref)?;

    let mut pending = PendingTransform::new(source)
        .with_rotation(args.rotate.unwrap_or(0.0))
        .with_flip_horizontal(args.flip_h)
        .with_flip_vertical(args.flip_v);
    if let Some(scale) = args.scale {
        pending.set_scale(scale)?;
    }
    let crop = args
        .crop
        .unwrap_or_else(|| CropRect::full(pending.pre_crop_size()));
    pending.set_crop(crop);

    if session.mode() != ToolMode::Crop {
        session.select_tool(ToolMode::Crop, &app.transformer).await;
    }
    session.report_crop(pending);
    let change = session.select_tool(ToolMode::None, &app.transformer).await;
    match change.transform {
        TransformOutcome::Applied(baked) => {
            println!(
                "Baked {}x{} image {}",
                baked.size.width, baked.size.height, baked.image_ref
            );
        }
        TransformOutcome::Skipped => {
            println!("Nothing to apply");
            return Ok(());
        }
        TransformOutcome::Failed(e) => return Err(e).context("transform failed"),
    }

    session
        .save(None, &app.transformer, &app.renderer, &app.catalog)
        .await?;
    println!("Updated session {}", args.id);
    Ok(())
}

async fn render(app: &App, id: SessionId, out: &Path) -> Result<()> {
    let session = app.open_session(id).await?;
    let bytes = app
        .renderer
        .render_png(session.state())
        .context("rendering session")?;
    fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;
    println!("Wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let app = App::open(&cli)?;
    match &cli.command {
        Commands::List => list(&app).await,
        Commands::Show { id } => show(&app, *id).await,
        Commands::New(args) => create(&app, args).await,
        Commands::Transform(args) => transform(&app, args).await,
        Commands::Render { id, out } => render(&app, *id, out).await,
        Commands::Delete { id } => {
            app.catalog.delete(*id).await?;
            println!("Deleted session {id}");
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    pollster::block_on(run(cli))
}
