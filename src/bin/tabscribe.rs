//! CLI binary for tabscribe.
//!
//! A thin shim over the library crate: maps flags to `ScribeConfig`, drives
//! the capture pipeline through a virtual tab, and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabscribe::browser::VirtualBrowser;
use tabscribe::selector::surface::PageEvent;
use tabscribe::{
    capture_region, export_images, transcribe, write_markup, AbortReason, CaptureCoordinator,
    CaptureProgressCallback, Handled, ImageStore, Point, Rect, ScribeConfig, Settings, TabId,
    ViewportRaster,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Status callback ──────────────────────────────────────────────────────────

/// Prints one line per capture event to stderr.
struct CliCaptureCallback {
    quiet: bool,
}

impl CaptureProgressCallback for CliCaptureCallback {
    fn on_selection_started(&self, tab: TabId) {
        if !self.quiet {
            eprintln!("{} Selecting in tab {}…", cyan("◆"), tab);
        }
    }

    fn on_area_selected(&self, _tab: TabId, rect: Rect) {
        if !self.quiet {
            eprintln!(
                "  {} {}",
                cyan("▢"),
                dim(&format!("{}×{} at ({}, {})", rect.width, rect.height, rect.x, rect.y))
            );
        }
    }

    fn on_image_stored(&self, _tab: TabId, collection_len: usize) {
        if !self.quiet {
            eprintln!(
                "{} Screenshot captured  {}",
                green("✔"),
                dim(&format!("{collection_len} in collection"))
            );
        }
    }

    fn on_selection_aborted(&self, _tab: TabId, reason: AbortReason) {
        if !self.quiet {
            let why = match reason {
                AbortReason::BelowThreshold => "selection too small",
                AbortReason::Cancelled => "selection cancelled",
                AbortReason::TabClosed => "tab closed during selection",
            };
            eprintln!("{} {}", cyan("⚠"), why);
        }
    }

    fn on_capture_failed(&self, _tab: TabId, error: &str) {
        eprintln!("{} {}", red("✘"), red(error));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Crop a region straight out of a 2x viewport screenshot
  tabscribe capture --viewport shot.png --scale 2 --rect 40,120,600,300

  # Replay a drag gesture through the selector
  tabscribe capture --viewport shot.png --scale 2 --drag 640,420:40,120

  # Transcribe everything collected so far
  tabscribe transcribe -o notes.html

  # Save the Gemini key and turn on auto-clear
  tabscribe settings set --api-key AIza... --auto-clear true

ENVIRONMENT VARIABLES:
  TABSCRIBE_DATA_DIR      Where images.json and settings.json live
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

#[derive(Parser, Debug)]
#[command(
    name = "tabscribe",
    version,
    about = "Capture page regions and transcribe them to HTML with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory for images.json and settings.json.
    #[arg(long, global = true, env = "TABSCRIBE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, env = "TABSCRIBE_VERBOSE")]
    verbose: bool,

    #[arg(short, long, global = true, env = "TABSCRIBE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a region of a viewport screenshot into the collection.
    Capture(CaptureArgs),

    /// List the captured images.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Remove the image at INDEX (1-based, as shown by `list`).
    Remove { index: usize },

    /// Remove every captured image.
    Clear,

    /// Write the images as screenshot-N.png files into DIR.
    ExportImages { dir: PathBuf },

    /// Transcribe all captured images to HTML.
    Transcribe(TranscribeArgs),

    /// Show or change settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Full-viewport screenshot at native device resolution.
    #[arg(long)]
    viewport: PathBuf,

    /// Device scale factor of the screenshot.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Crop this CSS-pixel rectangle directly: x,y,w,h
    #[arg(long, value_parser = parse_rect, conflicts_with = "drag", required_unless_present = "drag")]
    rect: Option<Rect>,

    /// Replay a pointer drag from x1,y1 to x2,y2 through the selector.
    #[arg(long, value_parser = parse_drag)]
    drag: Option<(Point, Point)>,

    /// Intermediate pointer positions during --drag.
    #[arg(long, value_parser = parse_point, requires = "drag")]
    via: Vec<Point>,
}

#[derive(Args, Debug)]
struct TranscribeArgs {
    /// Write markup here instead of stdout.
    #[arg(short, long, env = "TABSCRIBE_OUTPUT")]
    output: Option<PathBuf>,

    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Use the prompt in this file for this run only.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    #[arg(long, env = "TABSCRIBE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    #[arg(long, env = "TABSCRIBE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print the transcription and stats as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        api_key: Option<String>,

        /// Default output title.
        #[arg(long)]
        title: Option<String>,

        /// Save the prompt in this file as the custom prompt.
        #[arg(long, conflicts_with = "default_prompt")]
        prompt_file: Option<PathBuf>,

        /// Go back to the built-in prompt.
        #[arg(long)]
        default_prompt: bool,

        #[arg(long)]
        auto_clear: Option<bool>,
    },
    /// Reset settings to defaults and clear all images.
    Reset,
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got '{s}'"));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|e| format!("'{part}' is not a number: {e}"))?;
    }
    Ok(out)
}

fn parse_point(s: &str) -> Result<Point, String> {
    let [x, y] = parse_numbers::<2>(s)?;
    Ok(Point::new(x, y))
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let [x, y, w, h] = parse_numbers::<4>(s)?;
    if x < 0.0 || y < 0.0 {
        return Err("x and y must not be negative".into());
    }
    if w <= 0.0 || h <= 0.0 {
        return Err("width and height must be positive".into());
    }
    Ok(Rect::new(x, y, w, h))
}

fn parse_drag(s: &str) -> Result<(Point, Point), String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected x1,y1:x2,y2, got '{s}'"))?;
    Ok((parse_point(from)?, parse_point(to)?))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let mut builder = ScribeConfig::builder().capture_callback(Arc::new(CliCaptureCallback { quiet: cli.quiet }));
    if let Some(ref dir) = cli.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Command::Transcribe(ref args) = cli.command {
        builder = builder
            .max_retries(args.max_retries)
            .api_timeout_secs(args.api_timeout);
        if let Some(ref p) = args.provider {
            builder = builder.provider_name(p);
        }
        if let Some(ref m) = args.model {
            builder = builder.model(m);
        }
    }
    let config = builder.build().context("Invalid configuration")?;

    // The environment is only written here, before any runtime thread exists.
    if matches!(cli.command, Command::Transcribe(_)) {
        let settings = Settings::load(&config.settings_path()).context("Could not load settings")?;
        if let Some(key) = saved_key_to_export(&settings, std::env::var_os(GEMINI_KEY_ENV).as_deref()) {
            std::env::set_var(GEMINI_KEY_ENV, key);
        }
    }

    tokio::runtime::Runtime::new()
        .context("Failed to start the async runtime")?
        .block_on(run(cli, config))
}

const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

/// The saved API key, when the environment does not already provide one.
fn saved_key_to_export<'a>(settings: &'a Settings, current: Option<&std::ffi::OsStr>) -> Option<&'a str> {
    if current.is_some_and(|v| !v.is_empty()) {
        return None;
    }
    settings.api_key.as_deref().filter(|k| !k.is_empty())
}

async fn run(cli: Cli, config: ScribeConfig) -> Result<()> {
    let store = Arc::new(ImageStore::new(Arc::new(config.image_backend())));

    match cli.command {
        Command::Capture(ref args) => run_capture(args, &config, store).await,
        Command::List { json } => run_list(&store, json).await,
        Command::Remove { index } => {
            if index == 0 {
                bail!("Image indices start at 1");
            }
            store
                .remove_at(index - 1)
                .await
                .with_context(|| format!("Could not remove image {index}"))?;
            if !cli.quiet {
                eprintln!("{} Removed image {}", green("✔"), index);
            }
            Ok(())
        }
        Command::Clear => {
            store.clear().await.context("Could not clear images")?;
            if !cli.quiet {
                eprintln!("{} All images cleared", green("✔"));
            }
            Ok(())
        }
        Command::ExportImages { ref dir } => {
            let images = store.images().await.context("Could not read images")?;
            let paths = export_images(&images, dir).context("Export failed")?;
            for p in paths {
                println!("{}", p.display());
            }
            Ok(())
        }
        Command::Transcribe(ref args) => run_transcribe(args, &config, &store, cli.quiet).await,
        Command::Settings(ref cmd) => run_settings(cmd, &config, &store).await,
    }
}

async fn run_capture(args: &CaptureArgs, config: &ScribeConfig, store: Arc<ImageStore>) -> Result<()> {
    let raster = ViewportRaster::open(&args.viewport, args.scale)
        .with_context(|| format!("Failed to load viewport {:?}", args.viewport))?;
    let browser = Arc::new(VirtualBrowser::new());
    let tab = browser.open_tab(raster);

    if let Some(rect) = args.rect {
        let image = capture_region(browser.as_ref(), tab, rect)
            .await
            .context("Capture failed")?;
        let len = store.append(image).await.context("Could not store capture")?;
        config.capture_callback.on_image_stored(tab, len);
        return Ok(());
    }

    let Some((from, to)) = args.drag else {
        bail!("Either --rect or --drag is required");
    };

    let (coordinator, mut rx) =
        CaptureCoordinator::new(browser.clone(), browser.clone(), store, config);
    coordinator.start_capture().await?;

    browser.dispatch(tab, PageEvent::PointerDown(from));
    for p in &args.via {
        browser.dispatch(tab, PageEvent::PointerMove(*p));
    }
    browser.dispatch(tab, PageEvent::PointerMove(to));
    browser.dispatch(tab, PageEvent::PointerUp(to));

    let envelope = rx
        .recv()
        .await
        .context("Selector ended without reporting")?;
    match coordinator.handle(envelope).await {
        Handled::Stored { .. } | Handled::Aborted(_) => Ok(()),
        Handled::Failed(e) => bail!("Capture failed: {e}"),
        Handled::Ignored => bail!("Selector reported for an unknown request"),
    }
}

async fn run_list(store: &ImageStore, json: bool) -> Result<()> {
    let images = store.images().await.context("Could not read images")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&images).context("Failed to serialise images")?
        );
        return Ok(());
    }
    if images.is_empty() {
        eprintln!("{}", dim("No screenshots captured yet"));
        return Ok(());
    }
    for (i, img) in images.iter().enumerate() {
        let when = img
            .captured_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown time".into());
        let size = img.png_bytes().map(|b| b.len()).unwrap_or(0);
        println!("{:>3}  {}  {}", bold(&(i + 1).to_string()), when, dim(&format!("{size} bytes")));
    }
    Ok(())
}

async fn run_transcribe(args: &TranscribeArgs, config: &ScribeConfig, store: &ImageStore, quiet: bool) -> Result<()> {
    let mut settings = Settings::load(&config.settings_path()).context("Could not load settings")?;
    if let Some(ref path) = args.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        settings.set_custom_prompt(Some(&prompt))?;
    }

    let images = store.images().await.context("Could not read images")?;
    let bar = (!quiet && !args.json).then(|| spinner(images.len()));

    let result = transcribe(&images, config, &settings).await;
    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }
    let transcription = result.context("Transcription failed")?;
    let title = settings.title(chrono::Utc::now());

    if args.json {
        let value = serde_json::json!({ "title": title, "transcription": transcription });
        println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialise output")?);
    } else if let Some(ref path) = args.output {
        write_markup(path, &transcription.markup)?;
    } else {
        let mut out = io::stdout().lock();
        out.write_all(transcription.markup.as_bytes())
            .context("Failed to write to stdout")?;
        out.write_all(b"\n").ok();
    }

    if !quiet && !args.json {
        eprintln!(
            "{} {}  {} images  {}ms",
            green("✔"),
            bold(&title),
            transcription.image_count,
            transcription.duration_ms
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&transcription.input_tokens.to_string()),
            dim(&transcription.output_tokens.to_string()),
        );
        if let Some(ref path) = args.output {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }

    if settings.auto_clear {
        store.clear().await.context("Could not clear images")?;
    }
    Ok(())
}

fn spinner(count: usize) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Transcribing");
    bar.set_message(format!("{count} images"));
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

async fn run_settings(cmd: &SettingsCommand, config: &ScribeConfig, store: &ImageStore) -> Result<()> {
    let path = config.settings_path();
    match cmd {
        SettingsCommand::Show => {
            let s = Settings::load(&path).context("Could not load settings")?;
            show_settings(&s, &path);
            Ok(())
        }
        SettingsCommand::Set {
            api_key,
            title,
            prompt_file,
            default_prompt,
            auto_clear,
        } => {
            let mut s = Settings::load(&path).context("Could not load settings")?;
            if let Some(k) = api_key {
                s.api_key = Some(k.trim().to_string()).filter(|k| !k.is_empty());
            }
            if let Some(t) = title {
                s.default_title = Some(t.trim().to_string()).filter(|t| !t.is_empty());
            }
            if let Some(p) = prompt_file {
                let prompt = tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("Failed to read prompt from {:?}", p))?;
                s.set_custom_prompt(Some(&prompt))?;
            }
            if *default_prompt {
                s.set_custom_prompt(None)?;
            }
            if let Some(v) = auto_clear {
                s.auto_clear = *v;
            }
            s.save(&path)?;
            eprintln!("{} Settings saved", green("✔"));
            Ok(())
        }
        SettingsCommand::Reset => {
            Settings::reset(&path)?;
            store.clear().await.context("Could not clear images")?;
            eprintln!("{} Settings reset to defaults", green("✔"));
            Ok(())
        }
    }
}

fn show_settings(s: &Settings, path: &Path) {
    let key = match s.api_key.as_deref() {
        Some(k) if k.chars().count() > 4 => {
            let tail: String = k.chars().skip(k.chars().count() - 4).collect();
            format!("…{tail}")
        }
        Some(_) => "(set)".into(),
        None => "(not set)".into(),
    };
    println!("File:         {}", path.display());
    println!("API key:      {}", key);
    println!("Title:        {}", s.default_title.as_deref().unwrap_or("(timestamp)"));
    println!("Prompt:       {}", if s.custom_prompt().is_some() { "custom" } else { "default" });
    println!("Auto-clear:   {}", s.auto_clear);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rect_and_drag() {
        assert_eq!(parse_rect("1, 2, 30, 40").unwrap(), Rect::new(1.0, 2.0, 30.0, 40.0));
        assert!(parse_rect("1,2,0,4").is_err());
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("-1,2,30,40").is_err());
        assert!(parse_rect("1,-2,30,40").is_err());
        let (a, b) = parse_drag("10,20:110,60").unwrap();
        assert_eq!((a, b), (Point::new(10.0, 20.0), Point::new(110.0, 60.0)));
        assert!(parse_drag("10,20").is_err());
    }

    #[test]
    fn saved_key_does_not_override_environment() {
        let mut settings = Settings::default();
        assert_eq!(saved_key_to_export(&settings, None), None);

        settings.api_key = Some("saved".into());
        assert_eq!(saved_key_to_export(&settings, None), Some("saved"));
        assert_eq!(saved_key_to_export(&settings, Some("".as_ref())), Some("saved"));
        assert_eq!(saved_key_to_export(&settings, Some("from-env".as_ref())), None);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
