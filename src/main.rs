use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use serde::Serialize;
use simplelog::WriteLogger;

use crocodoc::config::{Config, LayoutMode};
use crocodoc::framework::Framework;
use crocodoc::layout::{LayoutState, PageStatus};
use crocodoc::panic_handler::initialize_panic_handler;
use crocodoc::types::Viewport;
use crocodoc::viewer::Viewer;
use crocodoc::zoom::ZoomRequest;

#[derive(Parser)]
#[command(
    name = "crocodoc",
    version,
    about = "Open a converted document and print the resulting page layout"
)]
struct Cli {
    /// Base URL of the converted document (overrides the config file)
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// vertical, vertical-single-column, presentation, presentation-two-page or text
    #[arg(long)]
    layout: Option<LayoutMode>,

    /// Zoom factor, or auto, fitwidth, fitheight, in, out
    #[arg(long)]
    zoom: Option<ZoomRequest>,

    /// Viewport width
    #[arg(long, default_value_t = 1024.0)]
    width: f64,

    /// Viewport height
    #[arg(long, default_value_t = 768.0)]
    height: f64,

    /// Page to open at (1-based)
    #[arg(long)]
    page: Option<usize>,

    /// YAML or JSON viewer config (default: the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to a file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Seconds to wait for the document and its visible pages
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct PageReport {
    page: usize,
    url: String,
    status: PageStatus,
}

#[derive(Serialize)]
struct Report<'a> {
    url: &'a str,
    layout: LayoutMode,
    num_pages: usize,
    stylesheet_loaded: bool,
    visible: Vec<PageReport>,
    state: &'a LayoutState,
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            WriteLogger::init(level, simplelog::Config::default(), file)?;
        }
        None => WriteLogger::init(level, simplelog::Config::default(), io::stderr())?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_default().context("Failed to load user config")?,
    };
    if let Some(url) = &cli.url {
        config.url.clone_from(url);
    }
    if let Some(layout) = cli.layout {
        config.layout = layout;
    }
    if let Some(zoom) = cli.zoom {
        config.zoom = zoom;
    }
    if let Some(page) = cli.page {
        config.page = page;
    }
    if config.url.is_empty() {
        bail!("No document URL given on the command line or in the config");
    }
    config.validate().context("Invalid viewer config")?;
    Ok(config)
}

fn main() -> Result<()> {
    initialize_panic_handler();
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = load_config(&cli)?;
    let url = config.url.clone();
    info!("Opening {url} in {} layout", config.layout.as_str());

    let framework = Rc::new(Framework::http().context("Failed to create HTTP client")?);
    let mut viewer = Viewer::new(framework, config, Viewport::new(cli.width, cli.height));
    let timeout = Duration::from_secs(cli.timeout);

    viewer.load()?;
    if !viewer
        .wait_ready(timeout)
        .with_context(|| format!("Failed to open {url}"))?
    {
        bail!("Timed out waiting for document metadata from {url}");
    }
    if !viewer.wait_idle(timeout)? {
        warn!("Some pages were still loading after {}s", cli.timeout);
    }

    let state = viewer
        .layout_state()
        .context("Viewer is ready but has no layout")?;
    let visible = state
        .visible_pages
        .iter()
        .filter_map(|index| state.page(*index))
        .map(|page| PageReport {
            page: page.index,
            url: viewer.page_url(page.index),
            status: page.status,
        })
        .collect();
    let report = Report {
        url: &url,
        layout: viewer.scope().config().layout,
        num_pages: viewer.num_pages(),
        stylesheet_loaded: viewer.stylesheet().is_some(),
        visible,
        state: &state,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    viewer.destroy();
    info!("Done");
    Ok(())
}
