use std::sync::Arc;

use edgelog::bucket::DayBucket;
use edgelog::config::Config;
use edgelog::export;
use edgelog::pipeline::{IngestionPipeline, PipelineOptions};
use edgelog::source::ObjectStoreSource;
use edgelog::store::{BucketStore, FjallBucketStore};
use tracing::{info, warn};

use crate::cli::{ExportArgs, IngestArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn open_store(config: &Config) -> Result<FjallBucketStore, AnyError> {
    info!(
        path = %config.store.path.display(),
        cache = %config.store.cache_size,
        "Opening bucket store"
    );
    let store =
        FjallBucketStore::open_with_cache(&config.store.path, Some(config.store.cache_size.as_u64()))?;
    Ok(store)
}

pub async fn ingest(config: Config, args: IngestArgs) -> Result<(), AnyError> {
    let source = ObjectStoreSource::from_config(&config.source)?;
    let store = Arc::new(open_store(&config)?);

    let mut options = PipelineOptions::from(&config.ingest);
    if args.keep {
        options.delete_after = false;
    }

    let pipeline = IngestionPipeline::new(Arc::new(source), store.clone(), options);
    let prefix = args.prefix.unwrap_or(config.source.prefix);
    let summary = pipeline.run(&prefix).await?;
    store.persist()?;

    for boundary in &summary.boundaries {
        println!(
            "{}\t{}",
            boundary.completed,
            boundary
                .records
                .map_or_else(|| "?".to_string(), |count| count.to_string())
        );
    }
    for failure in &summary.failures {
        warn!(key = %failure.key, error = %failure.error, "Left in source");
    }

    let metrics = &summary.metrics;
    info!(
        objects = summary.objects,
        ingested = metrics.objects_ingested,
        failed = metrics.objects_failed,
        deleted = metrics.objects_deleted,
        committed = metrics.records_committed,
        duplicates = metrics.records_duplicate,
        rejected = metrics.records_rejected,
        "Ingest complete"
    );

    Ok(())
}

pub fn export(config: Config, args: ExportArgs) -> Result<(), AnyError> {
    let store = open_store(&config)?;
    let output_dir = args.output_dir.unwrap_or(config.export.output_dir);
    let include_today = args.include_today || config.export.include_today;

    let exports = export::export_all(&store, &output_dir, include_today, DayBucket::today())?;
    store.persist()?;

    for item in exports {
        match item.outcome {
            export::ExportOutcome::Written { path, records } => {
                println!("{}\t{}\t{}", item.bucket, records, path.display());
            }
            export::ExportOutcome::Skipped { dir } => {
                println!("{}\tskipped\t{}", item.bucket, dir.display());
            }
        }
    }

    Ok(())
}

pub fn stats(config: Config) -> Result<(), AnyError> {
    let store = open_store(&config)?;
    for bucket in store.list_buckets()? {
        let sealed = if store.is_sealed(bucket)? { "sealed" } else { "open" };
        println!("{}\t{}\t{}", bucket, store.record_count(bucket)?, sealed);
    }
    Ok(())
}
