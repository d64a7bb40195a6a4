//! bucketfs command line entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use bucketfs::config::Config;
use bucketfs::store::s3::S3Store;
use bucketfs::{BucketFs, Context, FileMetadata};

/// Print usage information
fn print_usage() {
    eprintln!("Usage: bucketfs <config.yaml> <command> [args...]");
    eprintln!();
    eprintln!("bucketfs - filesystem operations on S3-compatible object storage");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  stat PATH          Show metadata for a file or directory");
    eprintln!("  ls [PATH]          List entries below PATH (default: bucket root)");
    eprintln!("  cat PATH           Write an object to stdout");
    eprintln!("  put LOCAL PATH     Upload a local file");
    eprintln!("  rm PATH            Remove one object");
    eprintln!("  rm-r PREFIX        Remove every object under PREFIX");
    eprintln!("  mv FROM TO         Rename an object (copy, then delete)");
    eprintln!();
    eprintln!("A failed command exits with the errno matching its error.");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  bucketfs /etc/bucketfs/config.yaml ls reports/");
}

#[derive(Debug)]
enum Command {
    Stat(String),
    Ls(String),
    Cat(String),
    Put(PathBuf, String),
    Rm(String),
    RmAll(String),
    Mv(String, String),
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let arg = |i: usize| args.get(i).cloned();
        let command = match (args.first()?.as_str(), args.len()) {
            ("stat", 2) => Command::Stat(arg(1)?),
            ("ls", 1) => Command::Ls(String::new()),
            ("ls", 2) => Command::Ls(arg(1)?),
            ("cat", 2) => Command::Cat(arg(1)?),
            ("put", 3) => Command::Put(PathBuf::from(arg(1)?), arg(2)?),
            ("rm", 2) => Command::Rm(arg(1)?),
            ("rm-r", 2) => Command::RmAll(arg(1)?),
            ("mv", 3) => Command::Mv(arg(1)?, arg(2)?),
            _ => return None,
        };
        Some(command)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let Some(command) = Command::parse(&args[2..]) else {
        print_usage();
        std::process::exit(1);
    };

    // Load and validate configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("Loaded configuration from {:?}", config_path);

    // Ctrl+C aborts whatever backend call is in flight
    let root = Context::background();
    let on_signal = root.clone();
    ctrlc::set_handler(move || {
        warn!("Received interrupt, cancelling");
        on_signal.cancel();
    })?;

    let ctx = match config.store.request_timeout {
        Some(timeout) => root.with_timeout(timeout),
        None => root,
    };

    let separator = config.store.separator_char()?;
    let dsn = config.store.connection()?;
    let store = S3Store::connect(&dsn).await?.with_delimiter(separator);
    info!("Using bucket {} at {}", dsn.bucket, dsn.endpoint_url());

    let fs = BucketFs::new(Arc::new(store), ctx)
        .with_separator(separator)
        .with_default_mode(config.store.mode()?)
        .with_remove_queue_depth(config.store.remove_queue_depth);

    if let Err(e) = run(&fs, command).await {
        eprintln!("bucketfs: {}", e);
        std::process::exit(e.to_errno());
    }

    Ok(())
}

async fn run(fs: &BucketFs, command: Command) -> bucketfs::Result<()> {
    match command {
        Command::Stat(path) => {
            let meta = fs.stat(&path).await?;
            println!("name:     {}", meta.name());
            println!("type:     {}", if meta.is_dir() { "directory" } else { "file" });
            println!("size:     {}", meta.size());
            println!("mode:     {:o}", meta.mode());
            println!("modified: {}", unix_seconds(&meta));
            if let Some(content_type) = meta.content_type() {
                println!("content:  {}", content_type);
            }
            if let Some(etag) = meta.etag() {
                println!("etag:     {}", etag);
            }
        }
        Command::Ls(path) => {
            for entry in fs.read_dir(&path).await? {
                let kind = if entry.is_dir() { 'd' } else { '-' };
                println!(
                    "{}{:04o} {:>12} {:>12} {}",
                    kind,
                    entry.permissions(),
                    entry.size(),
                    unix_seconds(&entry),
                    entry.name()
                );
            }
        }
        Command::Cat(path) => {
            let mut file = fs.open(&path).await?;
            let data = file.read_to_end().await;
            file.close().await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data?).await?;
            stdout.flush().await?;
        }
        Command::Put(local, path) => {
            let data = tokio::fs::read(&local).await?;
            let mut file = fs.create(&path).await?;
            file.write_at(&data, 0).await?;
            file.close().await?;
            info!("Uploaded {:?} to {} ({} bytes)", local, fs.normalize(&path), data.len());
        }
        Command::Rm(path) => fs.remove(&path).await?,
        Command::RmAll(prefix) => fs.remove_all(&prefix).await?,
        Command::Mv(from, to) => fs.rename(&from, &to).await?,
    }
    Ok(())
}

fn unix_seconds(meta: &FileMetadata) -> u64 {
    meta.modified()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
