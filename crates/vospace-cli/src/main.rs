//! VOSpace command-line client

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vospace_cli::commands::{self, parse_pair};
use vospace_cli::{VoSpaceConfig, VoSpaceState};
use vospace_core::Detail;

#[derive(Parser, Debug)]
#[command(name = "vospace")]
#[command(about = "Manage a VOSpace node tree backed by object storage")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "VOSPACE_CONFIG")]
    config: Option<PathBuf>,

    /// Authority used to build node addresses
    #[arg(long, env = "VOSPACE_AUTHORITY")]
    authority: Option<String>,

    /// Owner recorded on created nodes
    #[arg(long, env = "VOSPACE_OWNER")]
    owner: Option<String>,

    /// Metadata snapshot file
    #[arg(long, env = "VOSPACE_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Use in-memory object storage (data will not persist)
    #[arg(long, env = "VOSPACE_MEMORY_STORE")]
    memory_store: bool,

    /// Enable debug logging
    #[arg(short, long, env = "VOSPACE_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the children of a container
    Ls {
        path: String,
        /// Include soft-deleted children
        #[arg(long)]
        deleted: bool,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long)]
        count: Option<usize>,
    },
    /// Print a node's metadata
    Stat {
        path: String,
        /// json-dropbox, json-dropbox-object or xml
        #[arg(short, long, default_value = "xml")]
        format: String,
        /// min, properties or max
        #[arg(long, default_value = "max")]
        detail: Detail,
        #[arg(long)]
        deleted: bool,
    },
    /// Create a container
    Mkdir { path: String },
    /// Upload a local file to a data node
    Put {
        file: PathBuf,
        path: String,
        /// Upload in segments of this many bytes
        #[arg(long)]
        segment_size: Option<usize>,
    },
    /// Write a node's content to stdout (a tar archive for containers)
    Cat { path: String },
    /// Write a container's tar archive to a file
    Tar { path: String, output: PathBuf },
    /// Copy a node
    Cp { from: String, to: String },
    /// Move a node
    Mv { from: String, to: String },
    /// Delete a node (soft by default)
    Rm {
        path: String,
        /// Remove records and objects
        #[arg(long)]
        hard: bool,
    },
    /// Undo a soft delete
    Restore { path: String },
    /// Find nodes by name below a container
    Search {
        path: String,
        query: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long)]
        deleted: bool,
    },
    /// Show or update user properties (`key=value`, empty value removes)
    Props {
        path: String,
        #[arg(value_parser = parse_pair)]
        set: Vec<(String, String)>,
    },
    /// Show or update a container's regions
    Regions {
        path: String,
        #[arg(value_parser = parse_pair)]
        set: Vec<(String, String)>,
    },
    /// Mark a data node structured or unstructured
    Structured {
        path: String,
        #[arg(long)]
        off: bool,
    },
    /// Show or configure container sync
    Sync {
        path: String,
        #[arg(long, requires = "key")]
        to: Option<String>,
        #[arg(long)]
        key: Option<String>,
    },
    /// Bytes used by the storage account
    Du,
}

impl Command {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Mkdir { .. }
                | Command::Put { .. }
                | Command::Cp { .. }
                | Command::Mv { .. }
                | Command::Rm { .. }
                | Command::Restore { .. }
                | Command::Structured { .. }
        ) || matches!(self, Command::Props { set, .. } | Command::Regions { set, .. } if !set.is_empty())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("vospace={0},vospace_cli={0},vospace_core={0},vospace_storage={0}", log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = VoSpaceConfig::load(args.config.as_deref())?;
    if let Some(authority) = args.authority {
        config.authority = authority;
    }
    if let Some(owner) = args.owner {
        config.owner = owner;
    }
    if args.snapshot.is_some() {
        config.metadata_snapshot = args.snapshot;
    }
    config.use_memory_store |= args.memory_store;

    let owner = config.owner.clone();
    let mut state = VoSpaceState::new(config).await?;
    let mutates = args.command.mutates();

    let mut stdout = tokio::io::stdout();
    match args.command {
        Command::Ls {
            path,
            deleted,
            start,
            count,
        } => {
            let listing = commands::list(&state, &path, deleted, start, count).await?;
            stdout.write_all(listing.as_bytes()).await?;
        }
        Command::Stat {
            path,
            format,
            detail,
            deleted,
        } => {
            let out = commands::stat(&state, &path, &format, detail, deleted).await?;
            stdout.write_all(&out).await?;
            stdout.write_all(b"\n").await?;
        }
        Command::Mkdir { path } => {
            let node = commands::mkdir(&state, &path, &owner).await?;
            tracing::info!("created {}", node.address());
        }
        Command::Put {
            file,
            path,
            segment_size,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let node = commands::put(&state, &path, data.into(), segment_size, &owner).await?;
            tracing::info!("wrote {} ({} bytes)", node.address(), node.info().size);
        }
        Command::Cat { path } => {
            commands::read_to(&state, &path, &mut stdout).await?;
        }
        Command::Tar { path, output } => {
            state.container(&path).await?;
            let mut file = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("failed to create {}", output.display()))?;
            let written = commands::read_to(&state, &path, &mut file).await?;
            tracing::info!("archived {} to {} ({} bytes)", path, output.display(), written);
        }
        Command::Cp { from, to } => commands::copy(&state, &from, &to, true).await?,
        Command::Mv { from, to } => commands::copy(&state, &from, &to, false).await?,
        Command::Rm { path, hard } => commands::remove(&state, &path, hard).await?,
        Command::Restore { path } => commands::restore(&state, &path).await?,
        Command::Search {
            path,
            query,
            limit,
            deleted,
        } => {
            for address in commands::search(&state, &path, &query, limit, deleted).await? {
                stdout.write_all(format!("{}\n", address).as_bytes()).await?;
            }
        }
        Command::Props { path, set } => {
            let props = commands::set_properties(&state, &path, &set).await?;
            stdout
                .write_all(&serde_json::to_vec_pretty(&props)?)
                .await?;
            stdout.write_all(b"\n").await?;
        }
        Command::Regions { path, set } => {
            let regions = commands::regions(&state, &path, &set).await?;
            stdout
                .write_all(&serde_json::to_vec_pretty(&regions)?)
                .await?;
            stdout.write_all(b"\n").await?;
        }
        Command::Structured { path, off } => commands::set_structured(&state, &path, !off).await?,
        Command::Sync { path, to, key } => {
            let target = to.as_deref().zip(key.as_deref());
            match commands::sync(&state, &path, target).await? {
                Some(address) => stdout.write_all(format!("{}\n", address).as_bytes()).await?,
                None => stdout.write_all(b"not synced\n").await?,
            }
        }
        Command::Du => {
            let used = commands::usage(&state).await?;
            stdout.write_all(format!("{}\n", used).as_bytes()).await?;
        }
    }
    stdout.flush().await?;

    for event in state.take_events() {
        tracing::debug!(uri = %event.uri, owner = %event.owner, "node changed");
    }
    if mutates {
        state.persist().await?;
    }
    Ok(())
}
