//! One diagnostic pass: list PDBs, sync the pod cache, report the blockers.

use std::io::Write;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::filter;
use crate::k8s::{cache::PodCache, source::ClusterSource};
use crate::report::{self, Reporter};
use crate::selector;

/// Default time allowed for the initial pod list.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Restrict PDBs and pods to one namespace. `None` means all.
    pub namespace: Option<String>,
    pub sync_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// Counters for the end-of-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub pdbs: usize,
    pub blocking: usize,
    pub reported: usize,
    pub invalid_selectors: usize,
}

/// Run the whole pipeline once against `source`, writing to `reporter`.
///
/// Fails on transport, sync or output errors, and when `cancel` fires. A PDB
/// with an invalid selector is logged and skipped.
#[instrument(skip_all, fields(namespace = opts.namespace.as_deref().unwrap_or("*")))]
pub async fn diagnose<S, W>(
    source: &S,
    opts: &RunOptions,
    reporter: &mut Reporter<W>,
    cancel: &CancellationToken,
) -> Result<Summary>
where
    S: ClusterSource,
    W: Write,
{
    let ns = opts.namespace.as_deref();

    // Start the watch first so the initial list overlaps the PDB request.
    let cache = PodCache::new();
    cache.start(source.watch_pods(ns), cancel.child_token())?;

    let pdbs = tokio::select! {
        pdbs = source.list_pdbs(ns) => pdbs?,
        () = cancel.cancelled() => return Err(Error::Cancelled),
    };
    debug!(count = pdbs.len(), "listed pod disruption budgets");

    tokio::select! {
        synced = cache.wait_for_sync(opts.sync_timeout) => synced?,
        () = cancel.cancelled() => return Err(Error::Cancelled),
    }
    if cache.is_empty() {
        debug!("no pods in scope, every blocking pdb will be suppressed");
    } else {
        debug!(pods = cache.len(), "pods in scope");
    }

    let blocking = filter::blocking(&pdbs);
    let mut summary = Summary {
        pdbs: pdbs.len(),
        blocking: blocking.len(),
        ..Summary::default()
    };

    for pdb in blocking {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (selector, pods) = match selector::matching_pods(&cache, &pdb) {
            Ok(found) => found,
            Err(e @ Error::InvalidSelector(_)) => {
                warn!(
                    pdb = %pdb.name,
                    namespace = %pdb.namespace,
                    error = %e,
                    "skipping pdb"
                );
                summary.invalid_selectors += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let name = pdb.name.clone();
        let expected = pdb.expected_pods;
        match report::build(pdb, &selector, pods) {
            Some(r) => {
                reporter.emit(&r)?;
                summary.reported += 1;
            }
            None => debug!(
                pdb = %name,
                expected_pods = expected,
                "blocking pdb covers no live pods"
            ),
        }
    }

    info!(
        pdbs = summary.pdbs,
        blocking = summary.blocking,
        reported = summary.reported,
        invalid_selectors = summary.invalid_selectors,
        "diagnostic complete"
    );
    Ok(summary)
}
