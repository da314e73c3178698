use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::types::{CatalogItem, VariationRef};
use crate::api::MeliClient;
use crate::error::{Error, Result};
use crate::sync::performance::snapshot;
use crate::sync::pool::WorkerPool;
use crate::sync::record::{sort_records, PerformanceSnapshot, ProductRecord};
use crate::sync::sku::{item_sku, user_product_sku};
use crate::sync::{FetchCounts, FetchPhase, FetchProgress, FetchReport};

/// Page through the seller's item ids with the scan search. Ids are
/// returned in listing order, each once.
pub async fn list_item_ids(client: &MeliClient, user_id: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut scroll_id: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = client.scan_page(user_id, scroll_id.as_deref()).await?;
        if page.results.is_empty() {
            break;
        }
        pages += 1;
        for id in page.results {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        match page.scroll_id {
            Some(next) if !next.is_empty() => scroll_id = Some(next),
            _ => break,
        }
    }

    log::debug!("Scan search returned {} ids over {pages} pages", ids.len());
    Ok(ids)
}

/// Fetch items, then their variations, then performance data; sorted.
pub async fn fetch_all(
    client: &MeliClient,
    user_id: &str,
    pool: &WorkerPool,
    progress: &dyn FetchProgress,
) -> Result<(Vec<ProductRecord>, FetchReport)> {
    let ids = list_item_ids(client, user_id).await?;
    log::info!("Listed {} items for user {user_id}", ids.len());
    progress.on_ids_listed(ids.len());

    let (records, mut counts) = fetch_records(client, ids, pool, progress).await;
    if pool.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let (mut records, performance_failed) =
        attach_performance(client, records, pool, progress).await;
    if pool.is_cancelled() {
        return Err(Error::Cancelled);
    }
    sort_records(&mut records);

    counts.performance_failed = performance_failed;
    counts.records = records.len() as u64;
    let report = FetchReport::from_counts(user_id.to_string(), counts);
    log::info!(
        "Fetched {} records ({} items failed, {} variations failed, {} without SKU)",
        report.records,
        report.items_failed,
        report.variations_failed,
        report.skipped_without_sku
    );
    progress.on_fetch_complete(&report);
    Ok((records, report))
}

struct VariationJob {
    item: Arc<CatalogItem>,
    variation: VariationRef,
}

/// Item pass then variation pass on the same pool. Failed tasks are logged
/// and counted; they never abort the others.
pub async fn fetch_records(
    client: &MeliClient,
    ids: Vec<String>,
    pool: &WorkerPool,
    progress: &dyn FetchProgress,
) -> (Vec<ProductRecord>, FetchCounts) {
    let mut counts = FetchCounts {
        items_listed: ids.len() as u64,
        ..Default::default()
    };

    let items = pool
        .map(
            ids.clone(),
            |id| {
                let client = client.clone();
                async move { client.item(&id).await }
            },
            |done, total| progress.on_phase_progress(FetchPhase::Items, done, total),
        )
        .await;

    let mut records = Vec::new();
    let mut jobs = Vec::new();
    for (id, result) in ids.iter().zip(items) {
        let item = match result {
            Ok(item) => item,
            Err(e) => {
                log::warn!("Failed to fetch item {id}: {e}");
                counts.items_failed += 1;
                continue;
            }
        };

        if item.variations.is_empty() {
            match item_sku(&item) {
                Some(sku) => records.push(ProductRecord::from_item(&item, sku)),
                None => {
                    log::debug!("Item {id} has no valid SELLER_SKU, skipping");
                    counts.skipped_without_sku += 1;
                }
            }
            continue;
        }

        let item = Arc::new(item);
        for variation in &item.variations {
            if variation.user_product_id.is_none() {
                log::debug!("Variation of {id} has no user product id, skipping");
                counts.skipped_without_sku += 1;
                continue;
            }
            jobs.push(VariationJob {
                item: item.clone(),
                variation: variation.clone(),
            });
        }
    }

    log::info!(
        "Item pass done: {} records, {} variations to fetch",
        records.len(),
        jobs.len()
    );

    let labels: Vec<String> = jobs
        .iter()
        .map(|j| j.variation.user_product_id.clone().unwrap_or_default())
        .collect();
    let variations = pool
        .map(
            jobs,
            |job| {
                let client = client.clone();
                async move { fetch_variation(&client, job).await }
            },
            |done, total| progress.on_phase_progress(FetchPhase::Variations, done, total),
        )
        .await;

    for (label, result) in labels.iter().zip(variations) {
        match result {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {
                log::debug!("Variation {label} has no valid SELLER_SKU, skipping");
                counts.skipped_without_sku += 1;
            }
            Err(e) => {
                log::warn!("Failed to fetch variation {label}: {e}");
                counts.variations_failed += 1;
            }
        }
    }

    counts.records = records.len() as u64;
    (records, counts)
}

async fn fetch_variation(client: &MeliClient, job: VariationJob) -> Result<Option<ProductRecord>> {
    let up_id = job
        .variation
        .user_product_id
        .as_deref()
        .ok_or_else(|| Error::Other("variation without user product id".into()))?;
    let product = client.user_product(up_id).await?;
    Ok(user_product_sku(&product)
        .map(|sku| ProductRecord::from_variation(&job.item, &job.variation, sku)))
}

/// Query performance once per distinct performance id and attach the
/// snapshot to every record sharing it. Returns the records and the number
/// of failed lookups; failed records carry `VideoPresence::Unknown`.
pub async fn attach_performance(
    client: &MeliClient,
    records: Vec<ProductRecord>,
    pool: &WorkerPool,
    progress: &dyn FetchProgress,
) -> (Vec<ProductRecord>, u64) {
    let mut perf_ids: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for r in &records {
        if seen.insert(r.performance_id.as_str()) {
            perf_ids.push(r.performance_id.clone());
        }
    }

    let results = pool
        .map(
            perf_ids.clone(),
            |id| {
                let client = client.clone();
                async move { client.performance(&id).await.map(|p| snapshot(&p)) }
            },
            |done, total| progress.on_phase_progress(FetchPhase::Performance, done, total),
        )
        .await;

    let mut snapshots: HashMap<String, PerformanceSnapshot> = HashMap::new();
    let mut failed = 0;
    for (id, result) in perf_ids.into_iter().zip(results) {
        match result {
            Ok(snap) => {
                snapshots.insert(id, snap);
            }
            Err(e) => {
                log::warn!("Failed to fetch performance for {id}: {e}");
                failed += 1;
            }
        }
    }

    let records = records
        .iter()
        .map(|r| {
            let snap = snapshots.get(&r.performance_id).cloned().unwrap_or_default();
            r.with_performance(snap)
        })
        .collect();
    (records, failed)
}

/// Records for a single listing (one per valid variation, or the item
/// itself), with performance attached. Used for one-off lookups.
pub async fn fetch_listing(client: &MeliClient, item_id: &str) -> Result<Vec<ProductRecord>> {
    let item = client.item(item_id).await?;
    let mut records = Vec::new();

    if item.variations.is_empty() {
        if let Some(sku) = item_sku(&item) {
            records.push(ProductRecord::from_item(&item, sku));
        }
    } else {
        let item = Arc::new(item);
        for variation in &item.variations {
            if variation.user_product_id.is_none() {
                continue;
            }
            let job = VariationJob {
                item: item.clone(),
                variation: variation.clone(),
            };
            match fetch_variation(client, job).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => log::warn!("Failed to fetch variation of {item_id}: {e}"),
            }
        }
    }

    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let snap = match client.performance(&record.performance_id).await {
            Ok(p) => snapshot(&p),
            Err(e) => {
                log::warn!("Failed to fetch performance for {}: {e}", record.performance_id);
                PerformanceSnapshot::default()
            }
        };
        out.push(record.with_performance(snap));
    }
    Ok(out)
}
