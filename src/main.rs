//! carrera - offline asset proxy
//!
//! CLI entry point: installs the asset manifest into the disk cache, answers
//! single requests cache-first, and lists what is stored.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use carrera::cli::{parse_method_arg, Cli, Command};
use carrera::{
    register, CacheStorage, DiskCacheStorage, HttpFetcher, LocalRuntime, OfflineProxy, ProxyState,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("carrera=warn"),
        1 => EnvFilter::new("carrera=info"),
        _ => EnvFilter::new("carrera=debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let config = cli.proxy_config()?;
    let storage = match &cli.cache_dir {
        Some(dir) => DiskCacheStorage::with_dir(dir.clone()),
        None => DiskCacheStorage::new()?,
    };
    debug!("Cache directory: {}", storage.root().display());
    let storage: Arc<dyn CacheStorage> = Arc::new(storage);

    match cli.command {
        Command::Install => {
            let proxy = Arc::new(OfflineProxy::new(
                config,
                Arc::clone(&storage),
                Arc::new(HttpFetcher::new()),
            ));
            let mut runtime = LocalRuntime::new();
            register(proxy, &mut runtime);

            if let Some(report) = runtime.run_install().await? {
                println!(
                    "Installed {} assets into {}",
                    report.cached.len(),
                    report.cache_name
                );
            }
        }
        Command::Fetch {
            path,
            method,
            output,
        } => {
            let method = parse_method_arg(&method)?;
            let proxy = Arc::new(OfflineProxy::new(
                config,
                Arc::clone(&storage),
                Arc::new(HttpFetcher::new()),
            ));
            let request = proxy.request_for(method, &path)?;

            let mut runtime = LocalRuntime::new();
            if proxy.is_installed().await? {
                runtime.activate_existing();
            }
            register(Arc::clone(&proxy), &mut runtime);
            if runtime.state() != ProxyState::Active {
                runtime.run_install().await?;
            }

            let response = runtime.dispatch_fetch(request).await?;
            eprintln!("{} {}", response.status, response.url);
            match output {
                Some(file) => tokio::fs::write(file, &response.body).await?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&response.body).await?;
                    stdout.flush().await?;
                }
            }
        }
        Command::List => {
            let generations = storage.generations().await?;
            if generations.is_empty() {
                println!("No cache generations");
            }
            for name in generations {
                let keys = storage.keys(&name).await?;
                println!("{} ({} entries)", name, keys.len());
                for key in keys {
                    println!("  {}", key);
                }
            }
        }
    }

    Ok(())
}
