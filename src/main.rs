use argh::FromArgs;
use std::path::PathBuf;
use std::sync::mpsc;

use meteo_service::config::Config;
use meteo_service::ingest::meteoswiss::{HttpTransport, MeteoClient};
use meteo_service::logging::{self, DataSource};
use meteo_service::reference::ReferenceCache;
use meteo_service::scheduler::{AdminRequest, Event, Poller};
use meteo_service::state::FileStateStore;

#[derive(FromArgs)]
/// Mirror MeteoSwiss weather data for postal codes and stations into a state tree
struct Args {
    /// path to the configuration file (default: $METEO_CONFIG or meteo.toml)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// print the locations known to the reference snapshot and exit:
    /// `postal-codes` or `stations`
    #[argh(option)]
    list: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let level = logging::parse_level(&config.logging.level).unwrap_or(log::LevelFilter::Info);
    logging::init_logger(level, config.logging.file.as_deref(), config.logging.timestamps)?;

    let list = match args.list.as_deref() {
        None => None,
        Some("postal-codes") => Some(AdminRequest::ListPostalCodes),
        Some("stations") => Some(AdminRequest::ListStations),
        Some(other) => {
            eprintln!("Unknown listing '{}', expected postal-codes or stations", other);
            std::process::exit(2);
        }
    };

    let transport = HttpTransport::new(config.api_version, &config.language)?;
    let client = MeteoClient::new(transport, config.endpoints());
    let cache = ReferenceCache::new(&config.data_dir);
    let store = FileStateStore::open(config.state_file())?;

    let mut poller = Poller::new(
        client,
        cache,
        store,
        config.api_version,
        config.postal_codes.clone(),
        config.stations.clone(),
    );

    if let Some(request) = list {
        for entry in poller.admin_query(request) {
            println!("{}\t{}", entry.id, entry.label);
        }
        return Ok(());
    }

    logging::info(
        DataSource::System,
        None,
        &format!(
            "Polling {} postal codes and {} stations",
            config.postal_codes.len(),
            config.stations.len()
        ),
    );

    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
        logging::info(DataSource::System, None, "Received Ctrl+C, shutting down gracefully...");
        tx.send(Event::Shutdown).ok();
    })?;

    poller.run(&rx)?;

    logging::info(DataSource::System, None, "Stopped");
    Ok(())
}
