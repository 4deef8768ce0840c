//! Plan watcher: polls the platform for plans and drives a [`PlanListener`]
//!
//! Every tick lists plans from one hour ago to one day ahead. A plan id seen
//! for the first time is started; a started plan that disappears from the
//! listing, or whose LOS has passed, is ended. Ended plans are not started
//! again while they keep appearing in listings.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::platform::PlatformClient;
use crate::types::Plan;

/// How far back each listing reaches.
pub const LIST_LOOKBEHIND: Duration = Duration::from_secs(3600);
/// How far ahead each listing reaches.
pub const LIST_LOOKAHEAD: Duration = Duration::from_secs(24 * 3600);

/// Receiver of plan notifications.
///
/// Both calls must return promptly; they run on the watcher's task.
pub trait PlanListener: Send + Sync + 'static {
    fn plan_start(&self, plan: Plan);
    fn plan_end(&self, plan: &Plan);
}

/// Background task polling [`PlatformClient::list_plans`].
pub struct PlanWatcher {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl PlanWatcher {
    /// Start polling every `interval`, beginning immediately.
    pub fn start(
        client: Arc<dyn PlatformClient>,
        listener: Arc<dyn PlanListener>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let tracker = TaskTracker::new();
        tracker.spawn(poll_loop(client, listener, interval, cancel.clone()));
        info!(interval_secs = interval.as_secs_f64(), "Plan watcher started");
        Self { cancel, tracker }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn wait(&self) {
        self.cancel.cancelled().await;
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for PlanWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    client: Arc<dyn PlatformClient>,
    listener: Arc<dyn PlanListener>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tracked = TrackedPlans::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = SystemTime::now();
        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            listed = client.list_plans(now - LIST_LOOKBEHIND, now + LIST_LOOKAHEAD) => listed,
        };

        match listed {
            Ok(plans) => {
                debug!("Listed {} plans", plans.len());
                tracked.reconcile(plans, SystemTime::now(), listener.as_ref());
            }
            Err(e) => warn!("Couldn't list plans, retrying next interval: {}", e),
        }
    }

    debug!("Plan watcher stopped");
}

/// Plans the watcher has started, and ids it must not start again.
#[derive(Debug, Default)]
struct TrackedPlans {
    running: HashMap<String, Plan>,
    finished: HashSet<String>,
}

impl TrackedPlans {
    fn reconcile(&mut self, listed: Vec<Plan>, now: SystemTime, listener: &dyn PlanListener) {
        let listed_ids: HashSet<String> = listed.iter().map(|plan| plan.plan_id.clone()).collect();

        let ended: Vec<String> = self
            .running
            .iter()
            .filter(|(id, plan)| {
                !listed_ids.contains(*id)
                    || plan.window().map_or(true, |window| window.has_ended(now))
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in ended {
            if let Some(plan) = self.running.remove(&id) {
                listener.plan_end(&plan);
                self.finished.insert(id);
            }
        }

        for plan in listed {
            if self.running.contains_key(&plan.plan_id) || self.finished.contains(&plan.plan_id) {
                continue;
            }

            match plan.window() {
                Ok(window) if window.has_ended(now) => {
                    debug!(plan_id = %plan.plan_id, "Plan already over, not starting");
                    self.finished.insert(plan.plan_id);
                }
                Ok(_) => {
                    self.running.insert(plan.plan_id.clone(), plan.clone());
                    listener.plan_start(plan);
                }
                // Started once so every channel logs the rejection, then remembered.
                Err(_) => {
                    self.finished.insert(plan.plan_id.clone());
                    listener.plan_start(plan);
                }
            }
        }

        self.finished.retain(|id| listed_ids.contains(id));
    }
}
