pub mod api;
pub mod config;
pub mod date_util;
pub mod error;
pub mod media;
pub mod reconcile;
pub mod report;
pub mod sync;
pub mod url;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use api::{AuthorizationPrompt, MeliClient, RateLimiter, RetryHandler, RetryPolicy, TokenManager};
pub use config::{ApiConfig, Credentials, Settings, TokenState, TokenStore};
pub use error::{Error, Result};
pub use media::FileIndex;
pub use reconcile::{conclude, Conclusion, ConclusionCategory, ReportRow, Verdict};
pub use report::{level_style, style_for, StyleToken};
pub use sync::{
    FetchOptions, FetchPhase, FetchProgress, FetchReport, FetchStatus, ListingStatus, ListingType,
    NoopProgress, PerformanceSnapshot, ProductRecord, VideoPresence,
};
pub use url::{generate_listing_url, parse_listing_url, resolve_item_id, ListingUrlInfo};

use sync::fetcher;
use sync::pool::WorkerPool;

/// Everything one report run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub rows: Vec<ReportRow>,
    pub images: FileIndex,
    pub videos: FileIndex,
    pub report: FetchReport,
}

/// Main entry point: an authenticated client plus the worker pool.
pub struct MeliMedia {
    client: MeliClient,
    pool: WorkerPool,
}

/// HTTP client, shared rate limiter and retry policy for one process.
fn build_retry(
    api: &ApiConfig,
    policy: RetryPolicy,
    options: &FetchOptions,
    cancel: CancellationToken,
) -> Result<RetryHandler> {
    let http = api.build_http_client()?;
    let limiter = Arc::new(RateLimiter::new(options.permits_per_second));
    Ok(RetryHandler::new(http, limiter, policy).with_cancellation(cancel))
}

impl MeliMedia {
    /// The pool shares the client's cancellation token, so an interrupt
    /// stops new fetch tasks as well as pending backoffs.
    pub fn new(client: MeliClient, options: &FetchOptions) -> Self {
        let pool =
            WorkerPool::new(options.pool_size).with_cancellation(client.cancellation().clone());
        Self { client, pool }
    }

    /// Load credentials and tokens from `settings` (running the
    /// authorization flow on first use) and build the client.
    pub async fn connect(
        settings: &Settings,
        api: ApiConfig,
        policy: RetryPolicy,
        options: FetchOptions,
        prompt: &dyn AuthorizationPrompt,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let credentials = settings.load_credentials()?;
        let retry = build_retry(&api, policy, &options, cancel)?;
        let tokens = TokenManager::load_or_authorize(
            credentials,
            settings.token_store(),
            retry.clone(),
            &api,
            prompt,
        )
        .await?;
        let client = MeliClient::new(retry, Arc::new(tokens), &api);
        Ok(Self::new(client, &options))
    }

    /// Run the authorization-code flow and store fresh tokens, replacing any
    /// existing ones.
    pub async fn authorize(
        settings: &Settings,
        api: ApiConfig,
        policy: RetryPolicy,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<TokenState> {
        let credentials = settings.load_credentials()?;
        let retry = build_retry(&api, policy, &FetchOptions::default(), CancellationToken::new())?;
        let tokens =
            TokenManager::authorize(credentials, settings.token_store(), retry, &api, prompt)
                .await?;
        Ok(tokens.current().await)
    }

    /// Access the client (for one-off calls in the CLI).
    pub fn client(&self) -> &MeliClient {
        &self.client
    }

    pub async fn user_id(&self) -> Result<String> {
        self.client.user_id().await
    }

    /// Fetch every listing with its variations and performance data.
    pub async fn fetch_catalog(
        &self,
        progress: &dyn FetchProgress,
    ) -> Result<(Vec<ProductRecord>, FetchReport)> {
        self.client.tokens().ensure_valid().await?;
        let user_id = self.user_id().await?;
        log::info!("Fetching catalog for user {user_id}");
        fetcher::fetch_all(&self.client, &user_id, &self.pool, progress).await
    }

    /// Full run: fetch the catalog, index both folders, reconcile.
    pub async fn run(
        &self,
        images: &Path,
        videos: &Path,
        progress: &dyn FetchProgress,
    ) -> Result<RunOutput> {
        let (records, report) = self.fetch_catalog(progress).await?;
        let (image_index, video_index) = index_folders(images, videos).await?;
        let rows = reconcile::reconcile(&records, &image_index, &video_index, progress);
        Ok(RunOutput {
            rows,
            images: image_index,
            videos: video_index,
            report,
        })
    }

    /// Records for one listing, given an item id or a listing URL.
    pub async fn listing(&self, id_or_url: &str) -> Result<Vec<ProductRecord>> {
        let item_id = resolve_item_id(id_or_url)?;
        fetcher::fetch_listing(&self.client, &item_id).await
    }

    /// Item ids flagged for incomplete technical specs.
    pub async fn penalized(&self) -> Result<Vec<String>> {
        let user_id = self.user_id().await?;
        self.client.penalized_item_ids(&user_id).await
    }
}

/// Build the image and video indexes off the async runtime.
pub async fn index_folders(images: &Path, videos: &Path) -> Result<(FileIndex, FileIndex)> {
    let images: PathBuf = images.to_path_buf();
    let videos: PathBuf = videos.to_path_buf();
    let image_task = tokio::task::spawn_blocking(move || media::index_images(&images));
    let video_task = tokio::task::spawn_blocking(move || media::index_videos(&videos));
    Ok((image_task.await?, video_task.await?))
}
