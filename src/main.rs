use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use s2d3::cli::commands;
use s2d3::config;
use s2d3::s3::{CannedAcl, S3Client};

#[derive(Parser)]
#[command(name = "s2d3")]
#[command(version, about = "S3-compatible object storage client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true, default_value = "s2d3.yaml")]
    config: PathBuf,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Bucket to use instead of the profile's
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List objects
    Ls {
        /// S3 path (s3://bucket/prefix), or a prefix in the default bucket
        path: Option<String>,
    },

    /// List buckets
    Buckets,

    /// Download an object
    Get {
        /// S3 path
        path: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file as a multipart upload
    Put {
        /// Local file
        file: PathBuf,

        /// Destination S3 path
        path: String,

        /// Part size in MiB (minimum 5)
        #[arg(long, default_value = "8")]
        block_size: usize,

        /// Number of parallel part uploads
        #[arg(long, default_value = "4")]
        workers: usize,

        /// Content-Type of the object
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Remove an object
    Rm {
        /// S3 path to remove
        path: String,
    },

    /// Make bucket
    Mb {
        /// Bucket name (s3://bucket/)
        bucket: String,

        /// Location constraint
        #[arg(long)]
        region: Option<String>,

        /// Canned ACL for the new bucket
        #[arg(long, default_value = "private")]
        acl: CannedAcl,
    },

    /// Remove bucket
    Rb {
        /// Bucket name (s3://bucket/)
        bucket: String,
    },

    /// Show an object's access control list
    Acl {
        /// S3 path
        path: String,
    },

    /// Apply a canned ACL to an object
    SetAcl {
        /// S3 path
        path: String,

        /// private, public-read, public-read-write, ...
        acl: CannedAcl,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Part uploads run on worker tasks, so `put` gets a multi-threaded runtime
    let runtime = if matches!(cli.command, Commands::Put { .. }) {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
    };

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut profile = config::load_profile(&cli.config, cli.profile.as_deref())?;
    if let Some(bucket) = cli.bucket {
        profile.bucket = Some(bucket);
    }
    tracing::debug!(?profile, "loaded profile");

    let client = S3Client::new(&profile)?;

    match cli.command {
        Commands::Ls { path } => {
            commands::cmd_ls(&client, path.as_deref()).await?;
        }
        Commands::Buckets => {
            commands::cmd_buckets(&client).await?;
        }
        Commands::Get { path, output } => {
            commands::cmd_get(&client, &path, output.as_deref()).await?;
        }
        Commands::Put {
            file,
            path,
            block_size,
            workers,
            content_type,
        } => {
            commands::cmd_put(&client, &file, &path, block_size, workers, content_type.as_deref()).await?;
        }
        Commands::Rm { path } => {
            commands::cmd_rm(&client, &path).await?;
        }
        Commands::Mb { bucket, region, acl } => {
            commands::cmd_mb(&client, &bucket, region.as_deref(), acl).await?;
        }
        Commands::Rb { bucket } => {
            commands::cmd_rb(&client, &bucket).await?;
        }
        Commands::Acl { path } => {
            commands::cmd_acl(&client, &path).await?;
        }
        Commands::SetAcl { path, acl } => {
            commands::cmd_set_acl(&client, &path, acl).await?;
        }
    }

    Ok(())
}
