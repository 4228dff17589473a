use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use hipflat::export::{CsvConfig, CsvSink, DEFAULT_SHEET_NAME, Exporter, SheetsConfig, SheetsSink};
use hipflat::scraper::RequestDelay;
use hipflat::utils::{ListingStats, failure_lines};
use hipflat::{HipflatScraper, LISTING_URL, RenderOptions, ScrapeConfig, ScrapingBee};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "hipflat")]
#[command(
    about = "Scrape hipflat rental listings for Pattaya into CSV and Google Sheets",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(long, env = "SCRAPINGBEE_API_KEY", hide_env_values = true, help = "ScrapingBee API key")]
    api_key: String,

    #[arg(long, env = "SPREADSHEET_ID", help = "Target Google spreadsheet id")]
    spreadsheet_id: Option<String>,

    #[arg(long, default_value = DEFAULT_SHEET_NAME, help = "Worksheet title inside the spreadsheet")]
    sheet_name: String,

    #[arg(
        long,
        env = "GOOGLE_ACCESS_TOKEN",
        hide_env_values = true,
        help = "OAuth bearer token for the Sheets API"
    )]
    access_token: Option<String>,

    #[arg(
        long,
        env = "MAX_PAGES",
        default_value_t = 2,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Number of listing pages to visit"
    )]
    max_pages: u32,

    #[arg(
        long,
        env = "MAX_DETAILS",
        default_value_t = 5,
        help = "Number of listings to enrich from their detail page"
    )]
    max_details: usize,

    #[arg(
        long,
        env = "START_PAGE",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "First listing page to visit"
    )]
    start_page: u32,

    #[arg(long, help = "Also save the table as a CSV file")]
    save_csv: bool,

    #[arg(long, default_value = ".", help = "Directory for the CSV file")]
    output_dir: PathBuf,

    #[arg(long, default_value = LISTING_URL, help = "Listing index URL")]
    base_url: String,

    #[arg(long, help = "Fetch pages without JavaScript rendering")]
    no_render_js: bool,

    #[arg(long, help = "Use the standard proxy pool instead of premium proxies")]
    no_premium_proxy: bool,

    #[arg(long, default_value = "th", help = "Proxy geolocation country code")]
    country_code: String,

    #[arg(long, help = "Skip the random pauses between requests")]
    no_delay: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text",
        help = "Output format"
    )]
    format: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    fn scrape_config(&self) -> ScrapeConfig {
        let defaults = ScrapeConfig::default();
        let country_code = Some(self.country_code.trim())
            .filter(|code| !code.is_empty())
            .map(str::to_string);

        ScrapeConfig {
            base_url: self.base_url.clone(),
            start_page: self.start_page,
            max_pages: self.max_pages,
            max_details: self.max_details,
            render: RenderOptions {
                render_js: !self.no_render_js,
                premium_proxy: !self.no_premium_proxy,
                country_code,
            },
            page_delay: if self.no_delay {
                RequestDelay::NONE
            } else {
                defaults.page_delay
            },
            detail_delay: if self.no_delay {
                RequestDelay::NONE
            } else {
                defaults.detail_delay
            },
        }
    }

    fn exporter(&self) -> Exporter {
        let mut exporter = Exporter::new();

        if self.save_csv {
            exporter = exporter.with_csv(CsvSink::new(CsvConfig {
                dir: self.output_dir.clone(),
                ..CsvConfig::default()
            }));
        }

        match (&self.spreadsheet_id, &self.access_token) {
            (Some(id), Some(token)) => {
                let sink = SheetsSink::new(SheetsConfig {
                    spreadsheet_id: id.clone(),
                    sheet_name: self.sheet_name.clone(),
                    access_token: token.clone(),
                })
                .unwrap_or_else(|e| {
                    log::error!("Error creating spreadsheet client: {}", e);
                    process::exit(1);
                });
                exporter = exporter.with_sheets(sink);
            }
            (Some(_), None) => {
                log::warn!("SPREADSHEET_ID is set but GOOGLE_ACCESS_TOKEN is missing, skipping Google Sheets")
            }
            (None, Some(_)) => {
                log::warn!("GOOGLE_ACCESS_TOKEN is set but SPREADSHEET_ID is missing, skipping Google Sheets")
            }
            (None, None) => log::warn!("No spreadsheet configured, skipping Google Sheets"),
        }

        exporter
    }
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let config = cli.scrape_config().validate().unwrap_or_else(|e| {
        log::error!("Invalid args: {e}");
        process::exit(1);
    });

    let fetcher = ScrapingBee::new(cli.api_key.clone()).unwrap_or_else(|e| {
        log::error!("Error creating proxy client: {}", e);
        process::exit(1);
    });

    let exporter = cli.exporter();
    if exporter.is_empty() {
        log::warn!("No export target configured, results are only printed");
    }

    let report = HipflatScraper::new(fetcher, config).run().await;

    match cli.format {
        OutputFormat::Json => serialize_json(&report.records),
        OutputFormat::Text => {
            if report.records.is_empty() {
                println!("No listings found.");
            } else {
                for (i, record) in report.records.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, record);
                }
                print!("{}", ListingStats::from_records(&report.records));
            }

            let failures = failure_lines(&report);
            if !failures.is_empty() {
                println!("\nFailures:");
                for line in failures {
                    println!("  {}", line);
                }
            }
        }
    }

    if report.is_failed() {
        log::error!("Every listing page failed to load, export skipped to keep existing data");
        process::exit(3);
    }
    if report.records.is_empty() {
        log::warn!("No listings found, nothing to export");
        return;
    }

    let outcome = exporter.export(&report.records).await;
    if let Some(Ok(path)) = &outcome.csv {
        log::info!("CSV written to {}", path.display());
    }
    if let Some(Ok(rows)) = &outcome.sheets {
        log::info!("Wrote {} row(s) to Google Sheets", rows);
    }

    if !outcome.all_ok() {
        process::exit(2);
    }
}
