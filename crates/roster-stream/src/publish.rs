//! Commit-and-publish glue — run projection under the committing
//! writer, then hand the batch downstream.
//!
//! Projection must read the writer's own view (consistent with the
//! changeset), so it runs before the commit; the batch reaches the sink
//! only after the commit succeeds, tagged with the commit's index.

use tracing::{debug, warn};

use roster_state::CatalogTxn;

use crate::buffer::EventSink;
use crate::error::StreamResult;
use crate::project::service_health_events;

/// Project the transaction's changeset, commit, and publish the batch.
/// Returns the commit index.
///
/// A projection failure does not block the commit — the catalog
/// mutation is valid regardless — so the batch is dropped with a
/// warning and subscribers converge again through their next snapshot.
/// Sink failures after a successful commit do surface to the caller.
pub fn commit_and_publish(txn: CatalogTxn, sink: &impl EventSink) -> StreamResult<u64> {
    let projected = service_health_events(&txn, txn.changes());
    let index = txn.commit()?;

    match projected {
        Ok(events) => {
            if !events.is_empty() {
                debug!(index, count = events.len(), "publishing catalog events");
                sink.append(events)?;
            }
            Ok(index)
        }
        Err(error) => {
            warn!(index, %error, "dropping event batch for committed transaction");
            Ok(index)
        }
    }
}
