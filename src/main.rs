use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dicom_browser::{
    Browser, BrowserEvent, Config,
    attributes::{attribute_rows, render_rows},
    dictionary::display_name,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(err) = config.validate() {
        error!("Invalid configuration: {}", err);
        return ExitCode::FAILURE;
    }

    let (browser, mut events) = match Browser::new(config.ingest_options()) {
        Ok(browser) => browser,
        Err(err) => {
            error!("Could not start ingestion: {}", err);
            return ExitCode::FAILURE;
        }
    };

    for source in &config.sources {
        browser.add_source(source);
    }

    let mut pending = config.sources.len();
    while pending > 0 {
        let Some(event) = events.recv().await else {
            break;
        };
        if event.is_outcome() {
            pending -= 1;
        }
        match event {
            BrowserEvent::Progress(progress) if !progress.is_finished() => debug!(
                "{} ({}/{})",
                progress.stage, progress.completed, progress.total
            ),
            BrowserEvent::Progress(_) => {}
            BrowserEvent::SourceAdded { root, series } => {
                info!("Added {} with {} series", root.display(), series)
            }
            BrowserEvent::SourceRejected { root, reason } => {
                warn!("Rejected {}: {}", root.display(), reason)
            }
            BrowserEvent::Failed { root, error } => {
                error!("Could not load {}: {}", root.display(), error)
            }
        }
    }

    let rows = browser.series_table(&config.columns);
    if rows.is_empty() {
        error!("No series found");
        return ExitCode::FAILURE;
    }

    let headers: Vec<String> = config
        .columns
        .iter()
        .map(|c| display_name(c).unwrap_or_else(|| c.clone()))
        .collect();
    println!("{}", headers.join("\t"));
    for row in &rows {
        println!("{}", row.values.join("\t"));
    }

    if let Some(index) = config.show_attributes {
        let series = &rows[0].series;
        match series.get_attr_object(index) {
            Ok(object) => {
                let filter = config.filter_regex();
                println!();
                print!("{}", render_rows(&attribute_rows(&object, filter.as_ref())));
            }
            Err(err) => {
                error!("Could not show image {} of {}: {}", index, series.series_id(), err);
                return ExitCode::FAILURE;
            }
        }
    }

    browser.shutdown();
    ExitCode::SUCCESS
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "dicom_browser=debug"
    } else {
        "dicom_browser=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
