//! `shardline`: split a stream into erasure-coded shard files and back.
//!
//! # Usage
//!
//! ```text
//! shardline split --prefix backup < backup.tar      # writes backup.0 .. backup.19
//! shardline split --prefix disk --targets 6 < img  # 4 data + 2 parity
//! shardline join backup.0 backup.1 ... > out.tar   # missing files count as lost
//! shardline inspect backup.3                       # dump a shard file's frames
//! shardline -c shardline.toml split --prefix p
//! ```

mod config;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shardline_erasure::build_code;
use shardline_stream::{FrameDecoder, ShardReader, ShardWriter};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "shardline",
    version,
    about = "Erasure-coded stream splitting and reassembly"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (overrides the config file; `RUST_LOG` wins over both).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read stdin and write one shard file per shard, named `<prefix>.<i>`.
    Split {
        /// Path prefix of the shard files.
        #[arg(short, long)]
        prefix: PathBuf,

        #[command(flatten)]
        erasure: ErasureArgs,

        /// Pick data/parity for this many independent targets.
        #[arg(short, long)]
        targets: Option<usize>,

        /// Chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Reassemble shard files, given in member order, to stdout.
    Join {
        #[command(flatten)]
        erasure: ErasureArgs,

        /// Shard files in member order. Missing files are treated as lost
        /// shards.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print every frame in a shard file.
    Inspect {
        /// Shard file to inspect.
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct ErasureArgs {
    /// Number of data shards.
    #[arg(short, long)]
    data: Option<usize>,

    /// Number of parity shards (0 for a plain split).
    #[arg(short = 'm', long)]
    parity: Option<usize>,
}

impl ErasureArgs {
    fn apply(self, config: &mut CliConfig) {
        if let Some(d) = self.data {
            config.erasure.data = Some(d);
        }
        if let Some(p) = self.parity {
            config.erasure.parity = Some(p);
        }
    }
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Split {
            prefix,
            erasure,
            targets,
            chunk_size,
        } => {
            // CLI args override config file values.
            if targets.is_some() {
                config.erasure.targets = targets;
            }
            erasure.apply(&mut config);
            if chunk_size.is_some() {
                config.stream.chunk_size = chunk_size;
            }
            let written = split(&config, &mut tokio::io::stdin(), &prefix).await?;
            info!(bytes = written, prefix = %prefix.display(), "split complete");
            Ok(())
        }
        Commands::Join { erasure, files } => {
            erasure.apply(&mut config);
            let mut stdout = tokio::io::stdout();
            let read = join(&config, &files, &mut stdout).await?;
            info!(bytes = read, "join complete");
            Ok(())
        }
        Commands::Inspect { file } => inspect(&file).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
/// Logs go to stderr; stdout carries data.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// -----------------------------------------------------------------------
// shardline split
// -----------------------------------------------------------------------

/// Path of shard `member` for `prefix`: `<prefix>.<member>`.
fn shard_path(prefix: &Path, member: usize) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(format!(".{member}"));
    PathBuf::from(name)
}

/// Shard `input` into `<prefix>.<i>` files. Returns the bytes read.
async fn split<R>(config: &CliConfig, input: &mut R, prefix: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let (data, parity) = config.erasure_params();
    let code = build_code(data, parity)
        .with_context(|| format!("invalid erasure parameters: {data} data + {parity} parity"))?;
    let mut writer =
        ShardWriter::new(code, config.writer_config()).context("failed to create shard writer")?;
    info!(
        data,
        parity,
        chunk_size = writer.chunk_size(),
        prefix = %prefix.display(),
        "splitting stream"
    );

    // Open every sink before any data flows.
    let mut files = Vec::with_capacity(data + parity);
    for member in 0..data + parity {
        let path = shard_path(prefix, member);
        let file = File::create(&path)
            .await
            .with_context(|| format!("failed to create shard file {}", path.display()))?;
        files.push((path, file));
    }

    let sinks: Vec<_> = writer
        .readers()
        .into_iter()
        .zip(files)
        .map(|(mut stream, (path, file))| {
            tokio::spawn(async move {
                let mut out = BufWriter::new(file);
                let n = tokio::io::copy(&mut stream, &mut out)
                    .await
                    .with_context(|| format!("failed to write shard file {}", path.display()))?;
                out.flush().await?;
                out.into_inner().sync_all().await?;
                debug!(path = %path.display(), bytes = n, "shard file written");
                anyhow::Ok(n)
            })
        })
        .collect();

    let copied = writer.copy_from(input).await;
    let result = match copied {
        Ok(n) => writer.close().await.map(|()| n),
        Err(e) => {
            // Ends every shard stream with the error instead of a clean end.
            writer.abort(&e.to_string());
            Err(e)
        }
    };

    let mut sink_failure = None;
    for sink in sinks {
        if let Err(e) = sink.await.context("shard sink task panicked").and_then(|r| r) {
            sink_failure.get_or_insert(e);
        }
    }

    let outcome = result
        .context("failed to shard input")
        .and_then(|n| sink_failure.map_or(Ok(n), Err));
    if outcome.is_err() {
        // A shard file cut at a frame boundary reads back as a shorter
        // stream, so incomplete files must not be left behind.
        for member in 0..data + parity {
            let path = shard_path(prefix, member);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove incomplete shard file");
            }
        }
    }
    outcome
}

// -----------------------------------------------------------------------
// shardline join
// -----------------------------------------------------------------------

/// Reassemble the stream from shard `files` into `output`. Returns the
/// bytes written.
async fn join<W>(config: &CliConfig, files: &[PathBuf], output: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let (data, parity) = config.erasure_params();
    let code = build_code(data, parity)
        .with_context(|| format!("invalid erasure parameters: {data} data + {parity} parity"))?;

    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        match File::open(path).await {
            Ok(file) => inputs.push(Some(BufReader::new(file))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "shard file unavailable, treating as lost");
                inputs.push(None);
            }
        }
    }

    let mut stream = ShardReader::new(code, inputs, config.reader_config())
        .context("failed to open shard files")?
        .into_async_read();
    let n = tokio::io::copy(&mut stream, output)
        .await
        .context("failed to reassemble stream")?;
    let chunks = stream.into_inner().map(|reader| reader.generation());
    debug!(?chunks, bytes = n, "stream reassembled");
    Ok(n)
}

// -----------------------------------------------------------------------
// shardline inspect
// -----------------------------------------------------------------------

async fn inspect(path: &Path) -> Result<()> {
    let file = File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut decoder = FrameDecoder::new(BufReader::new(file));

    println!("{}", path.display());
    let mut frames = 0u64;
    let mut corrupt = 0u64;
    while let Some(frame) = decoder
        .read_frame()
        .await
        .with_context(|| format!("failed to read frame {frames}"))?
    {
        let intact = frame.verify();
        if !intact {
            corrupt += 1;
        }
        println!(
            "  gen {:>6}  member {:>3}  size {:>10}  payload {:>10}  {}",
            frame.generation,
            frame.member,
            frame.size,
            frame.payload.len(),
            if intact { "ok" } else { "CHECKSUM MISMATCH" }
        );
        frames += 1;
    }
    println!("{frames} frames, {corrupt} with bad checksums");
    Ok(())
}
