//! The Roost scheduler.
//!
//! A single heartbeat task (the sole timing authority over the task
//! table) polls for due tasks and originates a synthetic turn for each
//! through the same `TurnOriginator` port presentation adapters use, so
//! scheduled work flows through the identical dispatch and approval path
//! as a user message.
//!
//! Bookkeeping is advanced before the turn runs: the next-due instant
//! moves strictly forward from the firing instant, so an outage spanning
//! several intervals yields exactly one catch-up firing, and a slow turn
//! is never double-fired by the next heartbeat.

pub mod parse;
pub mod trigger;

pub use parse::parse_schedule;

use chrono::{DateTime, Utc};
use roost_core::error::Error;
use roost_core::event::{DomainEvent, EventBus};
use roost_core::message::ConversationOrigin;
use roost_core::originate::{TurnOriginator, TurnRequest};
use roost_core::schedule::{ScheduledTask, TriggerSpec};
use roost_storage::TaskStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    originator: Arc<dyn TurnOriginator>,
    events: Arc<EventBus>,
    heartbeat: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        originator: Arc<dyn TurnOriginator>,
        events: Arc<EventBus>,
        heartbeat: Duration,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            store,
            originator,
            events,
            heartbeat,
            shutdown_tx,
        })
    }

    /// Start the heartbeat loop. There must be exactly one running
    /// heartbeat per task table.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        info!(heartbeat_secs = self.heartbeat.as_secs(), "Scheduler started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.heartbeat);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.poll_once().await {
                            warn!(error = %e, "Scheduler heartbeat error");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Scheduler stopped");
                            return;
                        }
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// One heartbeat: fire everything due. Returns how many tasks fired.
    pub async fn poll_once(&self) -> Result<usize, Error> {
        let now = Utc::now();
        let due = self.store.due_before(now).await?;
        let fired = due.len();

        for task in due {
            self.fire(task, now).await?;
        }
        Ok(fired)
    }

    /// Advance the task's bookkeeping, then run its turn in the
    /// background. Disabling a task after this point does not cancel the
    /// firing already in flight.
    async fn fire(&self, task: ScheduledTask, now: DateTime<Utc>) -> Result<(), Error> {
        let mut updated = task.clone();
        updated.last_run = Some(now);
        updated.run_count += 1;
        match trigger::next_due_after(&task.trigger, now) {
            Some(next) => updated.next_due = next,
            // One-shot that has fired: no future occurrence.
            None => updated.enabled = false,
        }
        self.store.upsert(&updated).await?;

        self.events.publish(DomainEvent::TaskFired {
            task_id: task.id.clone(),
            name: task.name.clone(),
            timestamp: now,
        });
        debug!(task = %task.name, next_due = %updated.next_due, "Task fired");

        let originator = self.originator.clone();
        let request = TurnRequest::new(
            ConversationOrigin::scheduler(&task.id),
            format!("[Scheduled task: {}]\n\n{}", task.name, task.prompt),
        );
        let name = task.name.clone();
        tokio::spawn(async move {
            match originator.submit_turn(request).await {
                Ok(text) => debug!(task = %name, chars = text.len(), "Scheduled turn completed"),
                Err(e) => warn!(task = %name, error = %e, "Scheduled turn failed"),
            }
        });
        Ok(())
    }

    // --- Definition interface ---

    /// Create a task from a trigger spec. Names are unique; the trigger
    /// is validated here so bad definitions fail loudly at creation.
    pub async fn create_task(
        &self,
        name: &str,
        prompt: &str,
        spec: TriggerSpec,
    ) -> Result<ScheduledTask, Error> {
        trigger::validate(&spec).map_err(|e| Error::Config {
            message: format!("invalid schedule: {e}"),
        })?;
        if self.store.get_by_name(name).await?.is_some() {
            return Err(Error::Config {
                message: format!("task '{name}' already exists"),
            });
        }

        let now = Utc::now();
        let next_due = trigger::initial_due(&spec, now).ok_or_else(|| Error::Config {
            message: "schedule has no future occurrence".into(),
        })?;

        let task = ScheduledTask::new(name, prompt, spec, next_due);
        self.store.upsert(&task).await?;
        info!(task = %name, next_due = %task.next_due, "Task created");
        Ok(task)
    }

    /// Create a task from a natural schedule string.
    pub async fn create_task_from_str(
        &self,
        name: &str,
        prompt: &str,
        schedule: &str,
    ) -> Result<ScheduledTask, Error> {
        let spec = parse::parse_schedule(schedule, Utc::now()).map_err(|e| Error::Config {
            message: e,
        })?;
        self.create_task(name, prompt, spec).await
    }

    pub async fn list(&self) -> Result<Vec<ScheduledTask>, Error> {
        Ok(self.store.list().await?)
    }

    /// Enable or disable by name. Disabling prevents future firings only.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, Error> {
        match self.store.get_by_name(name).await? {
            Some(task) => Ok(self.store.set_enabled(&task.id, enabled).await?),
            None => Ok(false),
        }
    }

    pub async fn remove(&self, name: &str) -> Result<bool, Error> {
        match self.store.get_by_name(name).await? {
            Some(task) => Ok(self.store.remove(&task.id).await?),
            None => Ok(false),
        }
    }

    /// The next due instant for a task, if it exists.
    pub async fn next_due(&self, name: &str) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.store.get_by_name(name).await?.map(|t| t.next_due))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roost_storage::InMemoryStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingOriginator {
        turns: AtomicUsize,
        requests: Mutex<Vec<TurnRequest>>,
    }

    impl RecordingOriginator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                turns: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TurnOriginator for RecordingOriginator {
        async fn submit_turn(&self, request: TurnRequest) -> Result<String, Error> {
            self.turns.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            Ok("ok".into())
        }
    }

    fn scheduler_with(
        store: Arc<InMemoryStore>,
        originator: Arc<RecordingOriginator>,
    ) -> Arc<Scheduler> {
        Scheduler::new(
            store,
            originator,
            Arc::new(EventBus::default()),
            Duration::from_secs(5),
        )
    }

    async fn drain_spawned() {
        // Let the fired turn tasks run to completion.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn missed_intervals_collapse_into_one_catch_up_firing() {
        let store = Arc::new(InMemoryStore::new());
        let originator = RecordingOriginator::new();
        let scheduler = scheduler_with(store.clone(), originator.clone());

        // A 60s task whose process was unavailable for 185s: next_due is
        // three intervals in the past.
        let now = Utc::now();
        let task = ScheduledTask::new(
            "check",
            "check things",
            TriggerSpec::Interval { secs: 60 },
            now - chrono::Duration::seconds(185),
        );
        store.upsert(&task).await.unwrap();

        // Exactly one catch-up firing, not three.
        assert_eq!(scheduler.poll_once().await.unwrap(), 1);
        drain_spawned().await;
        assert_eq!(originator.turns.load(Ordering::SeqCst), 1);

        // The next heartbeat finds nothing due: next_due advanced
        // strictly forward from the firing instant.
        assert_eq!(scheduler.poll_once().await.unwrap(), 0);
        let stored = store.get(&task.id).await.unwrap().unwrap();
        assert!(stored.next_due > now);
        assert_eq!(stored.run_count, 1);
    }

    #[tokio::test]
    async fn fired_turn_goes_through_the_shared_originator_port() {
        let store = Arc::new(InMemoryStore::new());
        let originator = RecordingOriginator::new();
        let scheduler = scheduler_with(store.clone(), originator.clone());

        let task = ScheduledTask::new(
            "briefing",
            "Summarize my inbox",
            TriggerSpec::Interval { secs: 60 },
            Utc::now() - chrono::Duration::seconds(1),
        );
        store.upsert(&task).await.unwrap();

        scheduler.poll_once().await.unwrap();
        drain_spawned().await;

        let requests = originator.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].origin.adapter, "scheduler");
        assert_eq!(requests[0].origin.session, format!("task_{}", task.id));
        assert!(requests[0].content.contains("Summarize my inbox"));
        assert!(requests[0].content.contains("briefing"));
    }

    #[tokio::test]
    async fn disabled_task_does_not_fire() {
        let store = Arc::new(InMemoryStore::new());
        let originator = RecordingOriginator::new();
        let scheduler = scheduler_with(store.clone(), originator.clone());

        scheduler
            .create_task("t", "p", TriggerSpec::Interval { secs: 60 })
            .await
            .unwrap();
        // Make it due, then disable it.
        let mut task = store.get_by_name("t").await.unwrap().unwrap();
        task.next_due = Utc::now() - chrono::Duration::seconds(1);
        store.upsert(&task).await.unwrap();
        scheduler.set_enabled("t", false).await.unwrap();

        assert_eq!(scheduler.poll_once().await.unwrap(), 0);
        assert_eq!(originator.turns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_shot_disables_itself_after_firing() {
        let store = Arc::new(InMemoryStore::new());
        let originator = RecordingOriginator::new();
        let scheduler = scheduler_with(store.clone(), originator.clone());

        let task = ScheduledTask::new(
            "reminder",
            "remind me",
            TriggerSpec::Once {
                at: Utc::now() - chrono::Duration::seconds(1),
            },
            Utc::now() - chrono::Duration::seconds(1),
        );
        store.upsert(&task).await.unwrap();

        assert_eq!(scheduler.poll_once().await.unwrap(), 1);
        drain_spawned().await;
        let stored = store.get(&task.id).await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(scheduler.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_bad_schedules() {
        let store = Arc::new(InMemoryStore::new());
        let originator = RecordingOriginator::new();
        let scheduler = scheduler_with(store, originator);

        scheduler
            .create_task("t", "p", TriggerSpec::Interval { secs: 60 })
            .await
            .unwrap();
        let err = scheduler
            .create_task("t", "p", TriggerSpec::Interval { secs: 60 })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let err = scheduler
            .create_task_from_str("u", "p", "sometimes, maybe")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("couldn't parse"));
    }

    #[tokio::test]
    async fn next_due_is_queryable() {
        let store = Arc::new(InMemoryStore::new());
        let originator = RecordingOriginator::new();
        let scheduler = scheduler_with(store, originator);

        scheduler
            .create_task_from_str("t", "p", "every 10 minutes")
            .await
            .unwrap();
        let next = scheduler.next_due("t").await.unwrap().unwrap();
        assert!(next > Utc::now());
        assert!(scheduler.next_due("missing").await.unwrap().is_none());
    }
}
