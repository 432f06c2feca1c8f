//! Notepress - markdown note tool
//!
//! Formats notes into canonical markdown, checks note folders for round-trip
//! problems, and attaches images through the content-addressed upload pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

use notepress::asset::{local_pipeline, AssetPipeline};
use notepress::core::config::{AppConfig, StorageConfig, DEFAULT_KEY_PREFIX};
use notepress::core::file_system;
use notepress::core::{Document, EditorSession};
use notepress::intake::IntakeItem;
use notepress::markdown::MarkdownCodec;

#[derive(Parser)]
#[command(name = "notepress")]
#[command(version)]
#[command(about = "Markdown notes with content-addressed image uploads", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a note and print it in canonical form
    Fmt {
        file: PathBuf,

        /// Write the result back instead of printing it
        #[arg(short, long)]
        write: bool,
    },

    /// Report notes that do not round-trip cleanly
    Check { dir: PathBuf },

    /// Upload images and append them to a note
    Attach {
        file: PathBuf,

        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Directory mirroring the bucket
        #[arg(long)]
        store: Option<PathBuf>,

        /// `.env` file with storage settings
        #[arg(long)]
        env: Option<PathBuf>,
    },

    /// Print the parsed document tree as JSON
    Tree { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(level)
        .init();

    let result = run(cli.command).await;
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

async fn run(command: Command) -> Result<()> {
    let codec = MarkdownCodec::default();
    match command {
        Command::Fmt { file, write } => fmt(&codec, &file, write),
        Command::Check { dir } => check(&codec, &dir),
        Command::Attach {
            file,
            images,
            store,
            env,
        } => attach(&codec, &file, images, store, env).await,
        Command::Tree { file } => {
            let (document, _) = Document::open(&file, &codec)?;
            println!("{}", serde_json::to_string_pretty(document.tree())?);
            Ok(())
        }
    }
}

fn fmt(codec: &MarkdownCodec, file: &Path, write: bool) -> Result<()> {
    let (mut document, _) = Document::open(file, codec)?;
    if write {
        document.save(codec)?;
        remember_root(file);
    } else {
        print!("{}", document.to_markdown(codec)?);
    }
    Ok(())
}

fn check(codec: &MarkdownCodec, dir: &Path) -> Result<()> {
    let files = file_system::get_markdown_files(dir);
    let mut problems = 0;

    for path in &files {
        let text = file_system::read_text_file(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let (document, diagnostics) = Document::parse(path.clone(), &text, codec);

        for diagnostic in &diagnostics {
            println!("{}: bytes {:?} kept as text: {}", path.display(), diagnostic.range, diagnostic.error);
        }

        let once = document.to_markdown(codec)?;
        let (reparsed, _) = Document::parse(path.clone(), &once, codec);
        let twice = reparsed.to_markdown(codec)?;
        if once != twice {
            println!("{}: serialization is not stable", path.display());
        }

        if !diagnostics.is_empty() || once != twice {
            problems += 1;
        }
    }

    tracing::info!("Checked {} notes, {} with problems", files.len(), problems);
    if problems > 0 {
        anyhow::bail!("{} of {} notes need attention", problems, files.len());
    }
    Ok(())
}

async fn attach(
    codec: &MarkdownCodec,
    file: &Path,
    images: Vec<PathBuf>,
    store: Option<PathBuf>,
    env: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Using default config: {:#}", e);
        AppConfig::default()
    });
    let store_dir = store.unwrap_or_else(|| config.local_store_dir());

    let storage = match env.or(config.env_path.clone()) {
        Some(path) => StorageConfig::from_env_file(&path)?,
        None => None,
    };
    let pipeline = attach_pipeline(&store_dir, storage.as_ref());

    let document = if file.exists() {
        Document::open(file, codec)?.0
    } else {
        Document::new(file.to_path_buf())
    };

    let mut session = EditorSession::new(document, Some(Arc::new(pipeline)));
    session.set_cursor(usize::MAX);
    let items = images.into_iter().map(IntakeItem::from_path).collect();
    let tickets = session.pick(items)?;
    if tickets.is_empty() {
        anyhow::bail!("None of the given files is an image");
    }

    let report = session.settle().await;
    for record in &report.inserted {
        println!("{}", record.url);
    }
    for (name, error) in &report.failed {
        eprintln!("{name}: {error}");
    }
    for (name, error) in &report.rejected {
        eprintln!("{name}: {error}");
    }

    let mut document = session.close();
    if document.modified {
        document.save(codec)?;
        remember_root(file);
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} of {} images could not be attached",
            report.failed.len() + report.rejected.len(),
            tickets.len()
        );
    }
    Ok(())
}

/// Pipeline writing into the local bucket mirror. Storage settings only
/// contribute the key prefix; URLs point at the mirrored files.
fn attach_pipeline(store_dir: &Path, storage: Option<&StorageConfig>) -> AssetPipeline {
    let prefix = match storage {
        Some(storage) => {
            tracing::debug!("Using storage settings {:?}", storage);
            storage.key_prefix.as_str()
        }
        None => DEFAULT_KEY_PREFIX,
    };
    local_pipeline(store_dir, prefix)
}

/// Record the note's folder in the recent roots list
fn remember_root(file: &Path) {
    let Some(root) = file.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let result = AppConfig::load().and_then(|mut config| {
        config.add_recent_root(root);
        config.save()
    });
    if let Err(e) = result {
        tracing::warn!("Could not update recent notes folders: {:#}", e);
    }
}
