//! `cbir` command-line tool.
//!
//! ## Usage
//!
//! ```bash
//! # Extract Haar signatures for every image in a manifest
//! cbir import --manifest images.txt --base /srv/images --output all.hsigs
//!
//! # Import `hash | c, c, ...` lines as integer signatures
//! cbir import --kind integer --manifest tags.txt --output tags.isigs
//!
//! # Keep whitelisted signatures only
//! cbir filter --whitelist keep.txt --input all.hsigs --output kept.hsigs
//!
//! # Split streams into shards of 4M signatures
//! cbir build --out-dir shards all.hsigs more.hsigs
//!
//! # Query one image, or a whole stream in batch mode
//! cbir query --image cat.jpg shards/out-0.hsm shards/out-1.hsm
//! cbir batch --stream all.hsigs --output rel.tsv --threshold 0.6 shards/*.hsm
//!
//! # Text listings and pairwise scores
//! cbir dump shards/out-0.hsm
//! cbir compare a.jpg b.jpg
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cbir::{
    BatchOptions, CbirConfig, ContentHash, SignatureKind, SignatureReader, SignatureWriter,
    SparseIndex, Thresholds, WeightTable,
};

/// Content-based image retrieval tooling
#[derive(Parser)]
#[command(name = "cbir")]
#[command(about = "Build, query and inspect CBIR signature streams and index shards")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract signatures from images, or import integer feature lines
    Import {
        /// `hash | path` manifest, or `hash | c, c, ...` lines for integer
        #[arg(short, long)]
        manifest: PathBuf,

        /// Directory relative image paths resolve against
        #[arg(short, long, default_value = ".")]
        base: PathBuf,

        /// Signature kind (haar, integer, color, rgb)
        #[arg(short, long)]
        kind: Option<SignatureKind>,

        /// Output signature stream
        #[arg(short, long)]
        output: PathBuf,

        /// Append to an existing stream instead of truncating it
        #[arg(long)]
        append: bool,
    },

    /// Build index shards from signature streams
    Build {
        /// Directory the `out-{n}` shards are written to
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Signatures per shard
        #[arg(long)]
        shard_size: Option<usize>,

        /// Signature streams; the kind follows the extension
        #[arg(required = true)]
        streams: Vec<PathBuf>,
    },

    /// Keep only whitelisted signatures of a stream
    Filter {
        /// One hex hash per line; empty keeps everything
        #[arg(short, long)]
        whitelist: PathBuf,

        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Find images similar to one image
    Query {
        /// Query image
        #[arg(short, long)]
        image: PathBuf,

        /// Coefficient threshold
        #[arg(long)]
        lc: Option<f32>,

        /// Channel-average threshold
        #[arg(long)]
        le: Option<f32>,

        /// Print JSON instead of tab-separated rows
        #[arg(long)]
        json: bool,

        /// Shards to search; defaults to `index.shards` from the config
        shards: Vec<PathBuf>,
    },

    /// Match every signature of a stream against the shards
    Batch {
        /// Query signature stream
        #[arg(short, long)]
        stream: PathBuf,

        /// Rows are appended to this file
        #[arg(short, long)]
        output: PathBuf,

        /// Score cut-off; outside [0, 1] falls back to 0.6
        #[arg(short, long, default_value_t = cbir::DEFAULT_BATCH_THRESHOLD)]
        threshold: f32,

        /// Skip the stream up to and including this hash
        #[arg(long)]
        resume_after: Option<ContentHash>,

        /// Shards to search; defaults to `index.shards` from the config
        shards: Vec<PathBuf>,
    },

    /// Print an index shard or signature stream as text
    Dump {
        /// `.hsm` / `.qsm` shard or a signature stream
        path: PathBuf,
    },

    /// Similarity of two images
    Compare {
        a: PathBuf,
        b: PathBuf,

        /// Signature kind (haar, color, rgb)
        #[arg(short, long)]
        kind: Option<SignatureKind>,
    },

    /// Run the HTTP query server
    #[cfg(feature = "server")]
    Serve {
        /// Server config file (`server.toml` etc.); env overrides still apply
        #[arg(long)]
        server_config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // the server installs its own JSON subscriber
    #[cfg(feature = "server")]
    if let Commands::Serve { server_config } = cli.command {
        return serve(server_config);
    }

    let env_filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .compact(),
        )
        .init();

    let config = match &cli.config {
        Some(path) => CbirConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CbirConfig::default(),
    };

    match cli.command {
        Commands::Import {
            manifest,
            base,
            kind,
            output,
            append,
        } => import(&config, &manifest, &base, kind, &output, append),
        Commands::Build {
            out_dir,
            shard_size,
            streams,
        } => build(&config, &out_dir, shard_size, &streams),
        Commands::Filter {
            whitelist,
            input,
            output,
        } => filter(&whitelist, &input, &output),
        Commands::Query {
            image,
            lc,
            le,
            json,
            shards,
        } => query(&config, &image, lc, le, json, &shards),
        Commands::Batch {
            stream,
            output,
            threshold,
            resume_after,
            shards,
        } => batch(&config, &stream, &output, threshold, resume_after, &shards),
        Commands::Dump { path } => dump(&path),
        Commands::Compare { a, b, kind } => {
            let kind = kind.unwrap_or(config.signature.kind);
            let score =
                cbir::compare_images(kind, &read(&a)?, &read(&b)?, config.signature.profile)?;
            println!("{score}");
            Ok(())
        }
        #[cfg(feature = "server")]
        Commands::Serve { .. } => Ok(()),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn open_stream(path: &Path) -> Result<(SignatureReader<BufReader<File>>, SignatureKind)> {
    let Some(kind) = cbir::stream_kind(path) else {
        bail!(cbir::CbirError::UnknownFileKind(path.to_path_buf()));
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok((SignatureReader::new(BufReader::new(file), kind), kind))
}

fn import(
    config: &CbirConfig,
    manifest: &Path,
    base: &Path,
    kind: Option<SignatureKind>,
    output: &Path,
    append: bool,
) -> Result<()> {
    let kind = kind
        .or_else(|| cbir::stream_kind(output))
        .unwrap_or(config.signature.kind);
    let lines = BufReader::new(
        File::open(manifest).with_context(|| format!("opening {}", manifest.display()))?,
    );
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(output)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut writer = SignatureWriter::new(BufWriter::new(file), kind);

    let cfg = config.ingest_config();
    let report = match kind {
        SignatureKind::Integer => cbir::import_integer_lines(lines, &mut writer, &cfg)?,
        _ => cbir::import_images(lines, base, kind, &mut writer, &cfg)?,
    };
    println!(
        "imported {} (missing {}, failed {}, duplicates {})",
        report.imported, report.missing, report.failed, report.duplicates
    );
    Ok(())
}

fn build(
    config: &CbirConfig,
    out_dir: &Path,
    shard_size: Option<usize>,
    streams: &[PathBuf],
) -> Result<()> {
    let Some(kind) = cbir::stream_kind(&streams[0]) else {
        bail!(cbir::CbirError::UnknownFileKind(streams[0].clone()));
    };
    if let Some(other) = streams.iter().find(|s| cbir::stream_kind(s) != Some(kind)) {
        bail!("{} does not hold {kind} signatures", other.display());
    }

    let mut cfg = config.ingest_config();
    if let Some(size) = shard_size {
        cfg.shard_size = size;
    }
    let weights = WeightTable::shared(config.signature.profile);
    let shards = cbir::build_shards(streams, kind, out_dir, weights, &cfg)?;
    for shard in &shards {
        println!("{}", shard.display());
    }
    Ok(())
}

fn filter(whitelist: &Path, input: &Path, output: &Path) -> Result<()> {
    let whitelist = cbir::read_whitelist(BufReader::new(
        File::open(whitelist).with_context(|| format!("opening {}", whitelist.display()))?,
    ))?;
    let (mut reader, kind) = open_stream(input)?;
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = SignatureWriter::new(BufWriter::new(file), kind);

    let report = cbir::filter_signatures(&mut reader, &whitelist, &mut writer)?;
    println!(
        "kept {} of {} (rejected {}, duplicates {})",
        report.kept, report.read, report.rejected, report.duplicates
    );
    Ok(())
}

fn query(
    config: &CbirConfig,
    image: &Path,
    lc: Option<f32>,
    le: Option<f32>,
    json: bool,
    shards: &[PathBuf],
) -> Result<()> {
    let matcher = cbir::open_matcher(config, shards)?;
    let defaults = matcher.config().thresholds();
    let thresholds = Thresholds {
        coefficient: lc.unwrap_or(defaults.coefficient),
        average: le.unwrap_or(defaults.average),
    };

    let start = Instant::now();
    let results = cbir::query_image(&matcher, config.signature.kind, &read(image)?, thresholds)?;
    info!(
        hits = results.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "query answered"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &results)?;
        writeln!(out)?;
    } else {
        for result in &results {
            writeln!(out, "{}", cbir::format_row(result))?;
        }
    }
    Ok(())
}

fn batch(
    config: &CbirConfig,
    stream: &Path,
    output: &Path,
    threshold: f32,
    resume_after: Option<ContentHash>,
    shards: &[PathBuf],
) -> Result<()> {
    let matcher = cbir::open_matcher(config, shards)?;
    let (mut reader, _) = open_stream(stream)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .with_context(|| format!("opening {}", output.display()))?;
    let mut out = BufWriter::new(file);

    let options = BatchOptions {
        threshold,
        resume_after,
    };
    let report = cbir::run_batch(&matcher, &mut reader, &options, &mut out)?;
    println!(
        "queried {} of {} (skipped {}), {} rows",
        report.queried, report.read, report.skipped, report.rows
    );
    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    let stdout = io::stdout();
    let out = stdout.lock();
    let count = if cbir::is_shard(path) {
        let index = SparseIndex::open(path, false)?;
        cbir::dump_index(&index, out)?
    } else {
        let (mut reader, _) = open_stream(path)?;
        cbir::dump_signatures(&mut reader, out)? as usize
    };
    info!(path = %path.display(), count, "dumped");
    Ok(())
}

#[cfg(feature = "server")]
fn serve(server_config: Option<PathBuf>) -> Result<()> {
    let config = match server_config {
        Some(path) => server::ServerConfig::load_from(path)?,
        None => server::ServerConfig::load()?,
    };
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(server::start_server(config))
}

