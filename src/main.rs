use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use rtl_mirror::{
    browser, config, engine, Document, EngineConfig, Error, Preset, VerificationReporter,
};

#[derive(Parser)]
#[command(name = "rtl-mirror")]
#[command(about = "Mirror Hebrew content in HTML documents to right-to-left layout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an HTML file, URL, or stdin and write the result
    Transform {
        /// HTML file path, URL (http/https), or '-' for stdin
        input: String,

        /// JSON config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Built-in config to start from: balanced, text-only, full
        #[arg(long, conflicts_with = "config")]
        preset: Option<Preset>,

        /// Viewport width in px, selects the intensity tier
        #[arg(short, long)]
        width: Option<u32>,

        /// Selector for the element to transform
        #[arg(short, long, default_value = "body")]
        root: String,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print a verification report to stderr after transforming
        #[arg(long)]
        verify: bool,

        /// Chrome debugging port (for URL mode)
        #[arg(short, long, default_value_t = 9222)]
        port: u16,

        /// Launch a new headless Chrome instead of connecting
        #[arg(short, long)]
        launch: bool,
    },

    /// Check an already-transformed document against its stored snapshots
    Verify {
        /// HTML file path or '-' for stdin
        input: String,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, default_value = "body")]
        root: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Undo every transformation recorded in a document
    Revert {
        /// HTML file path or '-' for stdin
        input: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the direction detected for a piece of text
    Detect { text: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Transform {
            input,
            config,
            preset,
            width,
            root,
            output,
            verify,
            port,
            launch,
        } => {
            let mut config = match preset {
                Some(p) => EngineConfig::preset(p),
                None => config::load(config.as_deref())?,
            };
            info!(input = %input, root = %root, "transform command");

            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            let local = tokio::task::LocalSet::new();
            let html = local.block_on(&rt, async {
                let html = if is_url(&input) {
                    let page = fetch(&input, port, launch).await?;
                    if width.is_none() {
                        if let Some(w) = page.viewport_width {
                            config.viewport_width = w;
                        }
                    }
                    page.html
                } else {
                    read_input(&input)?
                };
                if let Some(w) = width {
                    config.viewport_width = w;
                }
                run_transform(&html, &root, config, verify).await
            })?;
            write_output(output.as_deref(), &html)
        }
        Commands::Verify {
            input,
            config,
            root,
            format,
        } => {
            let config = config::load(config.as_deref())?;
            let doc = Document::parse(&read_input(&input)?);
            let root_id = find_root(&doc, &root)?;
            let report = VerificationReporter::new(&config)?.verify(&doc, root_id);
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Format::Text => println!("{report}"),
            }
            if !report.is_clean() {
                bail!("{} of {} checks failed", report.failed(), report.checks.len());
            }
            Ok(())
        }
        Commands::Revert { input, output } => {
            let doc = Document::parse(&read_input(&input)?).into_shared();
            let root = doc.borrow().root();
            let reverted = engine::revert_subtree(&doc, root);
            info!(reverted = reverted, "revert complete");
            let html = doc.borrow().to_html();
            write_output(output.as_deref(), &html)
        }
        Commands::Detect { text } => {
            let result = rtl_mirror::detect(&text);
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
    }
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

async fn fetch(url: &str, port: u16, launch: bool) -> Result<browser::RenderedPage> {
    let browser = if launch {
        browser::launch().await?
    } else {
        browser::connect(port).await?
    };
    browser::fetch_rendered(&browser, url).await
}

async fn run_transform(
    html: &str,
    root: &str,
    config: EngineConfig,
    verify: bool,
) -> Result<String> {
    let reporter = if verify {
        Some(VerificationReporter::new(&config)?)
    } else {
        None
    };

    let doc = Document::parse(html).into_shared();
    let root_id = find_root(&doc.borrow(), root)?;
    let handle = rtl_mirror::transform(doc.clone(), root_id, config)
        .await
        .context("Transformation failed")?;

    let stats = handle.stats();
    info!(
        transformed = stats.transformed,
        hebrew = stats.hebrew_detected,
        intensity = handle.current_intensity().value(),
        "transform complete"
    );
    handle.dispose();

    let doc = doc.borrow();
    if let Some(reporter) = reporter {
        eprintln!("{}", reporter.verify(&doc, root_id));
    }
    Ok(doc.to_html())
}

fn find_root(doc: &Document, selector: &str) -> Result<ego_tree::NodeId> {
    Ok(doc
        .query(selector)?
        .ok_or_else(|| Error::MissingElement(selector.to_string()))?)
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).map_err(|source| {
        Error::Io {
            path: PathBuf::from(input),
            source,
        }
        .into()
    })
}

fn write_output(path: Option<&Path>, html: &str) -> Result<()> {
    match path {
        Some(p) => {
            std::fs::write(p, html).with_context(|| format!("Failed to write {}", p.display()))?;
            debug!(path = %p.display(), bytes = html.len(), "wrote output");
        }
        None => println!("{html}"),
    }
    Ok(())
}
