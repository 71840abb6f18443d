use std::{sync::Arc, thread};

use super::{ClientFactory, object::ObjectPool};
use crate::{Error, Result};

/// Starts the background eviction thread for `pool`.
///
/// Between passes the thread parks on the pool's stop token and holds only a
/// weak reference, so it never keeps the pool alive. It exits once the pool
/// is closed or dropped.
pub(crate) fn spawn<F: ClientFactory>(pool: &Arc<ObjectPool<F>>, name: &str) -> Result<()> {
    let weak = Arc::downgrade(pool);
    let stop = pool.stop_token().clone();
    let interval = pool.config().eviction_interval();
    let _pool_name = name.to_owned();

    thread::Builder::new()
        .name(format!("seqforge-evict-{name}"))
        .spawn(move || {
            while !stop.wait_timeout(interval) {
                let Some(pool) = weak.upgrade() else {
                    break;
                };
                let _report = pool.evict();
                #[cfg(feature = "tracing")]
                if _report != Default::default() {
                    tracing::debug!(
                        pool = %_pool_name,
                        destroyed = _report.destroyed,
                        created = _report.created,
                        "eviction pass"
                    );
                }
            }
            #[cfg(feature = "tracing")]
            tracing::trace!(pool = %_pool_name, "pool maintainer exiting");
        })
        .map(drop)
        .map_err(|e| Error::unavailable(format!("cannot start pool maintainer: {e}")))
}
