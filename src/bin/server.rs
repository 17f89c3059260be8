//! geolookup-server: HTTP service resolving IPv4 addresses to city and ASN data.

use clap::Parser;
use geolookup::{
    logging, prepare_datasets, supervise, Config, DatasetStore, Fetcher, HttpServer, HttpSettings,
    LookupService, MmdbReader, RefreshError, RefreshScheduler,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(name = "geolookup-server")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Serve IPv4 geolocation and ASN lookups from MaxMind databases", long_about = None)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,
}

/// What the main thread waits for once the server is up.
enum Event {
    Shutdown,
    RefreshExited(RefreshError),
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load {:?}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = serve(config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = Arc::new(Fetcher::new()?);
    let store = Arc::new(DatasetStore::<MmdbReader>::new());
    let datasets = Arc::new(config.download.clone());

    prepare_datasets(&fetcher, &store, &datasets)?;

    let (events_tx, events) = mpsc::channel();

    let refresh = RefreshScheduler::new(fetcher, store.clone(), datasets).spawn()?;
    let tx = events_tx.clone();
    thread::Builder::new()
        .name("refresh-supervisor".to_string())
        .spawn(move || {
            let _ = tx.send(Event::RefreshExited(supervise(refresh)));
        })?;

    ctrlc::set_handler(move || {
        let _ = events_tx.send(Event::Shutdown);
    })?;

    let server = HttpServer::bind(HttpSettings::from_config(&config), LookupService::new(store))?;

    match events.recv() {
        Ok(Event::RefreshExited(e)) => Err(format!("dataset refresh failed, exiting: {}", e).into()),
        Ok(Event::Shutdown) | Err(_) => {
            log::info!("Shutting down gracefully");
            server.shutdown();
            log::info!("Server exiting");
            Ok(())
        }
    }
}
