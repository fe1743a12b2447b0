//! Scheduler module for polling targets and publishing snapshots.

use crate::metrics::{compute, MetricParseError, Snapshot};
use crate::source::{QueryError, StatusSource};
use crate::store::SnapshotStore;
use crate::targets::{Target, TargetSource};

use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub published: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, joined: Result<PollOutcome, JoinError>) {
        match joined {
            Ok((_, Ok(()))) => self.published += 1,
            Ok((name, Err(e))) => {
                tracing::warn!("Scheduler: poll failed for {}: {}", name, e);
                self.failed += 1;
            }
            Err(e) => {
                tracing::error!("Scheduler: poll task failed: {}", e);
                self.failed += 1;
            }
        }
    }
}

type PollOutcome = (String, Result<(), QueryError>);

/// Handle on the background polling task.
struct Running {
    stop_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Names of targets with a poll in progress.
type InFlight = Arc<std::sync::Mutex<HashSet<String>>>;

/// Marks a target as being polled until dropped, including when the poll
/// task is aborted.
struct InFlightGuard {
    in_flight: InFlight,
    name: String,
}

impl InFlightGuard {
    /// Claim `name`, or `None` if a poll for it is still running.
    fn claim(in_flight: &InFlight, name: &str) -> Option<Self> {
        let mut names = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: in_flight.clone(),
            name: name.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Everything a poll needs, shared with the background task.
struct Poller<S, T> {
    source: Arc<S>,
    target_source: Arc<T>,
    store: Arc<SnapshotStore>,
    query_timeout: Duration,
    /// Last target list that loaded successfully.
    targets: RwLock<Vec<Target>>,
    in_flight: InFlight,
}

/// Periodically polls every configured target and publishes the results.
///
/// Targets are polled independently: a slow target is skipped on ticks
/// while its previous poll is still running, and never delays the others.
pub struct Scheduler<S, T> {
    poller: Arc<Poller<S, T>>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl<S: StatusSource, T: TargetSource> Scheduler<S, T> {
    /// Create a scheduler. `targets` is the list validated at startup, used
    /// whenever a later reload of `target_source` fails.
    pub fn new(
        source: Arc<S>,
        target_source: Arc<T>,
        targets: Vec<Target>,
        store: Arc<SnapshotStore>,
        interval: Duration,
        query_timeout: Duration,
    ) -> Self {
        Self {
            poller: Arc::new(Poller {
                source,
                target_source,
                store,
                query_timeout,
                targets: RwLock::new(targets),
                in_flight: Arc::default(),
            }),
            interval,
            running: Mutex::new(None),
        }
    }

    /// Run a single poll cycle across all targets and wait for it to finish.
    pub async fn poll_once(&self) -> CycleReport {
        let mut tasks = JoinSet::new();
        self.poller.spawn_polls(&mut tasks).await;

        let mut report = CycleReport::default();
        while let Some(joined) = tasks.join_next().await {
            report.record(joined);
        }
        report
    }

    /// Run two cycles one interval apart, so the first snapshots anyone reads
    /// already carry rates.
    pub async fn warm_up(&self) {
        let first = self.poll_once().await;
        tracing::info!(
            "Scheduler: initial poll published {} snapshots ({} failed)",
            first.published,
            first.failed
        );

        tokio::time::sleep(self.interval).await;

        let second = self.poll_once().await;
        tracing::info!(
            "Scheduler: warm-up complete, {} of {} targets ready ({} failed this cycle)",
            self.poller.store.len(),
            second.published + second.failed,
            second.failed
        );
    }

    /// Start polling in the background, once per interval.
    ///
    /// The first background tick fires one interval from now. Calling
    /// `start` on a running scheduler does nothing.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let poller = self.poller.clone();
        let period = self.interval;

        tracing::info!("Starting scheduler with a {:?} interval", period);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tasks = JoinSet::new();
            let mut report = CycleReport::default();

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        let spawned = poller.spawn_polls(&mut tasks).await;
                        tracing::debug!(
                            "Scheduler: started {} polls, {} published and {} failed since last tick",
                            spawned,
                            report.published,
                            report.failed
                        );
                        report = CycleReport::default();
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => report.record(joined),
                }
            }

            // Abandoned polls never publish: a snapshot is only stored once complete.
            tasks.shutdown().await;
            tracing::info!("Scheduler: stopped");
        });

        *running = Some(Running { stop_tx, task });
    }

    /// Stop background polling and wait for the task to exit.
    ///
    /// Polls still in flight are abandoned. Published snapshots stay in the
    /// store.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.stop_tx.send(());
        if let Err(e) = running.task.await {
            tracing::error!("Scheduler: polling task ended abnormally: {}", e);
        }
    }
}

impl<S: StatusSource, T: TargetSource> Poller<S, T> {
    /// Reload the target list, falling back to the last good one.
    async fn refresh_targets(&self) -> Vec<Target> {
        match self.target_source.load() {
            Ok(targets) => {
                let mut current = self.targets.write().await;
                if *current != targets {
                    tracing::info!("Scheduler: target list changed, now {} targets", targets.len());
                    *current = targets.clone();
                }
                targets
            }
            Err(e) => {
                tracing::warn!("Scheduler: keeping previous targets, reload failed: {}", e);
                self.targets.read().await.clone()
            }
        }
    }

    /// Spawn one poll per target into `tasks`, skipping targets whose last
    /// poll has not finished. Returns the number of polls started.
    async fn spawn_polls(&self, tasks: &mut JoinSet<PollOutcome>) -> usize {
        let targets = self.refresh_targets().await;
        self.store.retain(targets.iter().map(|t| t.name.as_str()));

        let mut spawned = 0;
        for target in targets {
            let Some(guard) = InFlightGuard::claim(&self.in_flight, &target.name) else {
                tracing::debug!("Scheduler: skipping {}, previous poll still running", target.name);
                continue;
            };

            let source = self.source.clone();
            let store = self.store.clone();
            let timeout = self.query_timeout;

            tasks.spawn(async move {
                let _guard = guard;
                let result = poll_target(source.as_ref(), &store, &target, timeout).await;
                (target.name, result)
            });
            spawned += 1;
        }

        spawned
    }
}

/// Poll one target and publish its new snapshot.
///
/// On error nothing is published and the previous snapshot stays current.
async fn poll_target<S: StatusSource>(
    source: &S,
    store: &SnapshotStore,
    target: &Target,
    timeout: Duration,
) -> Result<(), QueryError> {
    let readings = tokio::time::timeout(timeout, source.fetch(target))
        .await
        .map_err(|_| QueryError::Timeout {
            target: target.name.clone(),
            timeout,
        })??;
    let observed_at = Instant::now();

    let previous = store
        .read_one(&target.name)
        .filter(|snapshot| snapshot.describes(target));
    let computed = match &previous {
        Some(prev) => {
            let elapsed = observed_at.duration_since(prev.observed_at).as_secs_f64();
            compute(
                Some(&prev.accumulators),
                &readings.status,
                &readings.variables,
                elapsed,
            )
        }
        None => compute(None, &readings.status, &readings.variables, 0.0),
    };

    let already_reported: &[MetricParseError] = previous
        .as_deref()
        .map(|prev| prev.parse_errors.as_slice())
        .unwrap_or_default();
    for err in new_parse_errors(already_reported, &computed.errors) {
        tracing::warn!("Scheduler: {}: {}", target.name, err);
    }

    let snapshot = Snapshot::new(
        target,
        computed.metrics,
        computed.variables,
        computed.accumulators,
        observed_at,
    )
    .with_parse_errors(computed.errors);
    store.publish(&target.name, snapshot);

    Ok(())
}

/// Parse errors not already reported by the previous poll, so a counter that
/// stays malformed is logged once rather than every interval.
fn new_parse_errors<'a>(
    previous: &'a [MetricParseError],
    current: &'a [MetricParseError],
) -> impl Iterator<Item = &'a MetricParseError> {
    current.iter().filter(move |err| !previous.contains(err))
}
