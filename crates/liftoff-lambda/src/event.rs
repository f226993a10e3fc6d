//! S3 notification decoding.

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use liftoff_core::ArtifactRef;
use tracing::warn;

/// Extract artifact references from an S3 notification, in record order.
///
/// The URL-decoded key is used when the notification carries one. Records
/// without a bucket name or key are skipped with a warning.
#[must_use]
pub fn artifacts(event: &S3Event) -> Vec<ArtifactRef> {
    event.records.iter().filter_map(artifact).collect()
}

fn artifact(record: &S3EventRecord) -> Option<ArtifactRef> {
    let bucket = record.s3.bucket.name.as_deref().filter(|b| !b.is_empty());
    let key = record
        .s3
        .object
        .url_decoded_key
        .as_deref()
        .or(record.s3.object.key.as_deref())
        .filter(|k| !k.is_empty());

    match (bucket, key) {
        (Some(bucket), Some(key)) => Some(ArtifactRef::new(bucket, key)),
        _ => {
            warn!(
                event_name = record.event_name.as_deref().unwrap_or_default(),
                bucket = bucket.unwrap_or_default(),
                key = key.unwrap_or_default(),
                "skipping S3 record without bucket or key"
            );
            None
        }
    }
}
