use time::Duration;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, error, info};

use crate::{
    acl::Principal,
    demo::DEMO_CONTENT_GROUP,
    error::StoreError,
    model::{ResourceId, RscUpdate},
    store::Store,
};

/// How old and how idle demo content must be before it is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    pub max_age: Duration,
    pub idle_grace: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::hours(24),
            idle_grace: Duration::hours(1),
        }
    }
}

/// Outcome of a single sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Removes stale resources from the demo content group.
#[derive(Clone)]
pub struct Janitor {
    store: Store,
    policy: SweepPolicy,
}

impl Janitor {
    pub fn new(store: Store, policy: SweepPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Delete demo content created more than `max_age` ago and not modified
    /// within `idle_grace`.
    ///
    /// Rows are handled one at a time; the first real failure stops the
    /// sweep and the next run picks up whatever is left.
    pub fn periodic_cleanup(&self) -> Result<SweepReport, StoreError> {
        let now = self.store.now();
        // a cutoff before the earliest representable date matches nothing
        let (Some(day_ago), Some(hour_ago)) = (
            now.checked_sub(self.policy.max_age),
            now.checked_sub(self.policy.idle_grace),
        ) else {
            debug!("sweep window reaches past the calendar, nothing to sweep");
            return Ok(SweepReport::default());
        };

        let Some(group) = self.store.lookup(DEMO_CONTENT_GROUP)? else {
            debug!("no demo content group, nothing to sweep");
            return Ok(SweepReport::default());
        };
        let ids = self
            .store
            .find_stale(group, day_ago.unix_timestamp(), hour_ago.unix_timestamp())?;
        self.remove(ids)
    }

    /// Unprotect and delete each id in turn.
    fn remove(&self, ids: Vec<ResourceId>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport {
            candidates: ids.len(),
            ..Default::default()
        };
        let sys = Principal::unrestricted();
        for id in ids {
            let rsc = match self.store.get(&sys, id) {
                Ok(rsc) => rsc,
                Err(e) if e.is_not_found() => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if rsc.is_protected {
                self.store.update(
                    &sys,
                    id,
                    RscUpdate {
                        is_protected: Some(false),
                        ..Default::default()
                    },
                )?;
            }
            match self.store.delete(&sys, id) {
                Ok(()) => {
                    debug!(id, "stale demo resource deleted");
                    report.deleted += 1;
                }
                Err(e) if e.is_not_found() => report.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

/// Run [`Janitor::periodic_cleanup`] on a blocking thread.
pub async fn run_cleanup(janitor: Janitor) -> anyhow::Result<SweepReport> {
    let report = tokio::task::spawn_blocking(move || janitor.periodic_cleanup()).await??;
    Ok(report)
}

/// Like [`run_cleanup`], but logs the outcome instead of returning errors.
pub async fn sweep_once(janitor: Janitor) -> Option<SweepReport> {
    match run_cleanup(janitor).await {
        Ok(report) => {
            info!(
                candidates = report.candidates,
                deleted = report.deleted,
                skipped = report.skipped,
                "demo cleanup finished"
            );
            Some(report)
        }
        Err(e) => {
            error!("demo cleanup failed: {e:#}");
            None
        }
    }
}

/// Sweep every `every`, starting immediately.
pub fn spawn_periodic(janitor: Janitor, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        loop {
            tick.tick().await;
            sweep_once(janitor.clone()).await;
        }
    })
}
