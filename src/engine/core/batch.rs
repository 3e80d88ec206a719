use tracing::{info, warn};

/// Resolve the configured batch size into a selection limit.
///
/// `None` means unlimited. Absent, zero, negative and unparsable values all
/// resolve to unlimited; bad values are logged and never fail the run.
pub fn resolve_batch_limit(value: Option<&str>) -> Option<usize> {
    let Some(raw) = value.map(str::trim) else {
        info!("Batch is not set; unlimited.");
        return None;
    };

    let batch = match raw.parse::<i64>() {
        Ok(batch) => batch,
        Err(_) => {
            warn!("BATCH is not an integer. BATCH={:?}. Setting batch to unlimited.", raw);
            return None;
        }
    };

    match batch {
        0 => {
            info!("Batch is 0; unlimited.");
            None
        }
        n if n < 0 => {
            warn!(
                "BATCH={}. BATCH must be a positive number. Setting batch to unlimited.",
                n
            );
            None
        }
        n => match usize::try_from(n) {
            Ok(limit) => {
                info!("Setting batch limit to {}.", limit);
                Some(limit)
            }
            Err(_) => {
                warn!("BATCH={} does not fit this platform. Setting batch to unlimited.", n);
                None
            }
        },
    }
}
