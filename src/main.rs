use std::{io::Write, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use objectcdn::{
    cdn::Cdn,
    config::CdnConfig,
    model::error::{StorageError, StorageResult},
};
use tracing::{error, info, span, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "objectcdn", version, about = "One interface over S3 and Rackspace Cloud Files")]
struct Cli {
    /// rackspace, aws, amazon or s3; defaults to CDN_SERVICE
    #[arg(long, short, env = "CDN_SERVICE")]
    service: Option<String>,

    /// Bucket or container to bind before running the command
    #[arg(long, short, global = true)]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    ListBuckets,
    CreateBucket {
        name: String,
        #[arg(long)]
        private: bool,
    },
    DeleteBucket {
        name: String,
    },
    ListObjects,
    Upload {
        path: PathBuf,
    },
    Get {
        name: String,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    ContentType {
        name: String,
    },
    DeleteObject {
        name: String,
    },
    IsPublic {
        #[arg(long)]
        object: Option<String>,
    },
    MakePublic,
    MakePrivate,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("objectcdn: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> StorageResult<()> {
    let mut config = CdnConfig::from_env()?;
    if cli.service.is_some() {
        config.service = cli.service.clone();
    }

    let mut cdn = Cdn::from_config(&config)?;
    info!(provider = %cdn.provider(), bucket = ?cli.bucket, "args");

    if let Some(bucket) = &cli.bucket {
        cdn.connect_bucket(bucket)?;
    }

    match cli.command {
        Command::ListBuckets => print_json(&cdn.list_buckets()?),
        Command::CreateBucket { name, private } => {
            cdn.create_bucket(&name, !private)?;
            println!("created {}", name);
            Ok(())
        }
        Command::DeleteBucket { name } => {
            cdn.delete_bucket(&name)?;
            println!("deleted {}", name);
            Ok(())
        }
        Command::ListObjects => print_json(&cdn.list_objects(None)?),
        Command::Upload { path } => {
            let url = cdn.upload_file(&path, None)?;
            println!("{}", url);
            Ok(())
        }
        Command::Get { name, output } => {
            let bytes = cdn.get_file_contents(&name, None)?;
            match output {
                Some(path) => std::fs::write(path, bytes)?,
                None => std::io::stdout().write_all(&bytes)?,
            }
            Ok(())
        }
        Command::ContentType { name } => {
            println!("{}", cdn.get_content_type(&name, None)?);
            Ok(())
        }
        Command::DeleteObject { name } => {
            cdn.delete_object(&name, None)?;
            println!("deleted {}", name);
            Ok(())
        }
        Command::IsPublic { object } => {
            println!("{}", cdn.is_public(None, object.as_deref())?);
            Ok(())
        }
        Command::MakePublic => cdn.make_public(None),
        Command::MakePrivate => cdn.make_private(None),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> StorageResult<()> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|err| StorageError::Vendor(format!("failed to encode output: {}", err)))?;
    println!("{}", out);
    Ok(())
}
