use crossbeam_channel::Receiver;
use tracing::debug;

use crate::aggregate::AggregateMap;
use crate::shutdown::Shutdown;

/// Drain worker maps as they arrive and fold them into one global map.
///
/// Returns `None` if the run was aborted; whatever was merged so far is
/// discarded.
pub fn merge_partials(
    partials: Receiver<AggregateMap>,
    shutdown: &Shutdown,
) -> Option<AggregateMap> {
    let mut global = AggregateMap::new();
    let mut received = 0usize;

    for partial in partials.iter() {
        if shutdown.is_aborted() {
            return None;
        }
        received += 1;
        debug!(partial = received, keys = partial.len(), "merging worker map");
        global.merge(partial);
    }

    if shutdown.is_aborted() {
        return None;
    }
    debug!(partials = received, keys = global.len(), "merger drained");
    Some(global)
}
