use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use melimedia::{
    ApiConfig, FetchOptions, FetchPhase, FetchReport, MeliMedia, RetryPolicy, Settings,
};

#[derive(Parser)]
#[command(name = "melimedia", about = "Reconcile MercadoLibre listings with local media folders")]
struct Cli {
    /// Config directory holding ml_credentials.json and ml_tokens.json (default: ~/.melimedia)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum API requests per second, retries included
    #[arg(long, default_value_t = 5.0)]
    rate: f64,

    /// Concurrent fetch workers
    #[arg(long, default_value_t = 10)]
    workers: usize,

    /// Base wait before retrying a failed request, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    base_wait_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize the application and store fresh tokens
    Auth,
    /// Fetch the catalog, index media folders and print the report
    Report {
        /// Folder with product images (searched recursively)
        #[arg(long)]
        images: PathBuf,
        /// Folder with one subfolder of videos per product
        #[arg(long)]
        videos: PathBuf,
        /// Output JSON instead of CSV
        #[arg(long)]
        json: bool,
        /// Write the report to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show one listing and its quality signals
    Item {
        /// Item id (MLA123...) or listing URL
        identifier: String,
    },
    /// List items penalized for incomplete technical specs
    Penalized,
    /// Index media folders without contacting MercadoLibre
    Index {
        #[arg(long)]
        images: PathBuf,
        #[arg(long)]
        videos: PathBuf,
        /// Dump the indexes as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl melimedia::FetchProgress for StderrProgress {
    fn on_ids_listed(&self, count: usize) {
        eprintln!("Found {count} listings");
    }

    fn on_phase_progress(&self, phase: FetchPhase, current: usize, total: usize) {
        if current == total {
            eprint!("\r  Fetching {phase}: {current}/{total}   \n");
        } else if current % 25 == 0 {
            eprint!("\r  Fetching {phase}: {current}/{total}   ");
        }
    }

    fn on_fetch_complete(&self, report: &FetchReport) {
        eprintln!("  Done: {} records", report.records);
    }

    fn on_reconcile_progress(&self, current: usize, total: usize) {
        if current == total {
            eprintln!("  Reconciled {current} rows");
        }
    }
}

/// Reads the authorization code from stdin.
struct StdinPrompt;

impl melimedia::AuthorizationPrompt for StdinPrompt {
    fn request_code(&self, authorization_url: &str) -> melimedia::Result<String> {
        eprintln!("Open this URL in a browser and authorize the application:\n");
        eprintln!("  {authorization_url}\n");
        eprint!("Paste the `code` parameter from the redirect URL: ");
        std::io::stderr().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings = match &cli.config_dir {
        Some(dir) => Settings::at(dir),
        None => Settings::default_location()?,
    };
    let api = ApiConfig::default();
    let policy = RetryPolicy::default().with_base_wait(Duration::from_millis(cli.base_wait_ms));
    let options = FetchOptions {
        permits_per_second: cli.rate,
        pool_size: cli.workers,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            eprintln!(
                "\nInterrupted: no new requests will start, waiting for running ones. \
                 Press Ctrl-C again to quit now."
            );
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    match cli.command {
        Commands::Auth => {
            let state = MeliMedia::authorize(&settings, api, policy, &StdinPrompt).await?;
            println!(
                "Authorized. Tokens saved to {} (valid for {}s)",
                settings.tokens_path().display(),
                state.expires_in
            );
        }
        Commands::Index {
            images,
            videos,
            json,
        } => {
            handle_index(&images, &videos, json).await?;
        }
        Commands::Report {
            images,
            videos,
            json,
            output,
        } => {
            let mm =
                MeliMedia::connect(&settings, api, policy, options, &StdinPrompt, cancel).await?;
            handle_report(&mm, &images, &videos, json, output.as_deref()).await?;
        }
        Commands::Item { identifier } => {
            let mm =
                MeliMedia::connect(&settings, api, policy, options, &StdinPrompt, cancel).await?;
            handle_item(&mm, &identifier).await?;
        }
        Commands::Penalized => {
            let mm =
                MeliMedia::connect(&settings, api, policy, options, &StdinPrompt, cancel).await?;
            let ids = mm.penalized().await?;
            for id in &ids {
                println!("{id}\t{}", melimedia::generate_listing_url(id));
            }
            eprintln!("{} penalized listings", ids.len());
        }
    }

    Ok(())
}

async fn handle_report(
    mm: &MeliMedia,
    images: &Path,
    videos: &Path,
    json: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    // Fail before spending an hour on the API if a folder is wrong
    melimedia::media::validate_folder(images, "images")?;
    melimedia::media::validate_folder(videos, "videos")?;

    let out = mm.run(images, videos, &StderrProgress).await?;
    for warning in [out.images.warning(), out.videos.warning()].into_iter().flatten() {
        eprintln!("Warning: {warning}");
    }

    let rendered = if json {
        melimedia::report::to_json(&out.rows)?
    } else {
        melimedia::report::to_csv(&out.rows)
    };
    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    print_fetch_report(&out.report);
    eprintln!(
        "Generated {}",
        melimedia::date_util::display_timestamp(chrono::Local::now())
    );
    Ok(())
}

async fn handle_item(mm: &MeliMedia, identifier: &str) -> anyhow::Result<()> {
    let records = mm.listing(identifier).await?;
    if records.is_empty() {
        println!("No records (listing has no valid SELLER_SKU)");
        return Ok(());
    }
    for r in &records {
        println!("{} ({})", r.display_id, r.primary_id);
        println!("  SKU:      {}", r.sku);
        println!("  Status:   {}", r.status.as_ref().map(|s| s.as_str()).unwrap_or("-"));
        println!("  Type:     {}", r.listing_type.label());
        println!("  Images:   {}", r.image_count_remote);
        println!("  Video:    {:?}", r.has_video_remote);
        println!(
            "  Score:    {}",
            r.score.map_or("-".to_string(), |s| s.to_string())
        );
        println!("  Level:    {}", r.level.as_deref().unwrap_or("-"));
        if !r.pending_titles.is_empty() {
            println!("  Pending:  {}", r.pending_titles.join(" | "));
        }
        if let Some(link) = &r.permalink {
            println!("  Link:     {link}");
        }
    }
    Ok(())
}

async fn handle_index(images: &Path, videos: &Path, json: bool) -> anyhow::Result<()> {
    let (image_index, video_index) = melimedia::index_folders(images, videos).await?;
    if json {
        let doc = serde_json::json!({
            "images": image_index,
            "videos": video_index,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    println!(
        "Images: {} files under {} keys",
        image_index.total_files(),
        image_index.len()
    );
    println!(
        "Videos: {} files under {} keys",
        video_index.total_files(),
        video_index.len()
    );
    for warning in [image_index.warning(), video_index.warning()].into_iter().flatten() {
        println!("Warning: {warning}");
    }
    Ok(())
}

fn print_fetch_report(report: &FetchReport) {
    eprintln!("Status: {:?}", report.status);
    eprintln!("  Listings:            {}", report.items_listed);
    eprintln!("  Records:             {}", report.records);
    eprintln!("  Without SKU:         {}", report.skipped_without_sku);
    if let Some(err) = &report.error {
        eprintln!("  Errors:              {err}");
    }
}
