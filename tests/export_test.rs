//! Ingest-then-export flow against the durable store

use std::fs;
use std::io::Write;
use std::sync::Arc;

use edgelog::bucket::DayBucket;
use edgelog::error::IngestError;
use edgelog::export::{self, ExportOutcome};
use edgelog::pipeline::{IngestionPipeline, PipelineOptions, RetryPolicy};
use edgelog::source::ObjectStoreSource;
use edgelog::store::{BucketStore, FjallBucketStore, StoreError};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

const DIRECTIVE: &str = "#Fields: date time x-edge-location sc-bytes c-ip cs-method cs(Host) cs-uri-stem sc-status cs(Referer) cs(User-Agent) cs-uri-query";

fn gzip(lines: &[&str]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    writeln!(encoder, "{DIRECTIVE}").unwrap();
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap()
}

fn day(d: u32) -> DayBucket {
    DayBucket::from_ymd(2023, 5, d).unwrap()
}

fn pipeline(store: Arc<FjallBucketStore>) -> IngestionPipeline {
    IngestionPipeline::new(
        Arc::new(ObjectStoreSource::in_memory()),
        store,
        PipelineOptions {
            workers: 1,
            delete_after: false,
            retry: RetryPolicy::no_delay(3),
        },
    )
}

#[tokio::test]
async fn test_export_after_ingest() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let store = Arc::new(FjallBucketStore::open(temp.path().join("buckets")).unwrap());
    let pipeline = pipeline(store.clone());

    pipeline
        .ingest_object(
            "E1.2023-05-01-12.x.gz",
            &gzip(&[
                "2023-05-01\t12:00:02\tIAD12\t300\t198.51.100.7\tPOST\td1.cloudfront.net\t/api\t201\thttps://example.com/\tcurl/8.0\t-",
                "2023-05-01\t12:00:01\tIAD12\t100\t198.51.100.7\tGET\td1.cloudfront.net\t/\t200\t-\tMozilla/5.0%20(Macintosh)\tq=1",
            ]),
            day(1),
        )
        .await
        .unwrap();

    let exports = export::export_all(store.as_ref(), &out, false, day(2)).unwrap();
    assert_eq!(exports.len(), 1);
    let ExportOutcome::Written { path, records } = &exports[0].outcome else {
        panic!("expected a written file");
    };
    assert_eq!(*records, 2);
    assert_eq!(path, &out.join("2023-05-01/cloudfront/cf-access.log"));

    let content = fs::read_to_string(path).unwrap();
    assert_eq!(
        content,
        "2023-05-01T12:00:01\t1682942401\td1.cloudfront.net\tIAD12\taws.cloudfront\t198.51.100.7\tGET\t-\t200\t100\t/\tq=1\t-\tMozilla/5.0 (Macintosh)\n\
         2023-05-01T12:00:02\t1682942402\td1.cloudfront.net\tIAD12\taws.cloudfront\t198.51.100.7\tPOST\t-\t201\t300\t/api\t-\thttps://example.com/\tcurl/8.0\n"
    );
}

#[tokio::test]
async fn test_exported_bucket_rejects_new_records() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FjallBucketStore::open(temp.path().join("buckets")).unwrap());
    let pipeline = pipeline(store.clone());
    let first = gzip(&["2023-05-01\t00:00:01\tIAD12\t1\t198.51.100.7\tGET\th\t/a\t200\t-\tua\t-"]);

    pipeline
        .ingest_object("E1.2023-05-01-00.a.gz", &first, day(1))
        .await
        .unwrap();
    export::export_day(store.as_ref(), day(1), &temp.path().join("out")).unwrap();

    // Replaying an already exported object is harmless
    let replay = pipeline
        .ingest_object("E1.2023-05-01-00.a.gz", &first, day(1))
        .await
        .unwrap();
    assert_eq!(replay.inserted, 0);

    let late = gzip(&["2023-05-01\t23:59:59\tIAD12\t1\t198.51.100.7\tGET\th\t/late\t200\t-\tua\t-"]);
    let err = pipeline
        .ingest_object("E1.2023-05-01-23.b.gz", &late, day(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::StoreCommit {
            attempts: 1,
            source: StoreError::BucketSealed(_)
        }
    ));
    assert_eq!(store.record_count(day(1)).unwrap(), 1);
}
