//! The scheduler: a cron subsystem and an event subsystem, both submitting
//! executions into the same [`Engine`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use nodes::SharedClock;

use crate::error::{EngineError, ValidationError};
use crate::executor::Engine;
use crate::expression::ExpressionEvaluator;
use crate::metrics;
use crate::models::{Event, EventTrigger, ScheduledTrigger, TriggerStatus, TriggeredBy};
use crate::storage::Store;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Depth of the bounded, drop-oldest event buffer.
    pub event_buffer_capacity: usize,
    /// Safety bound on how many missed cron occurrences are scanned before
    /// giving up and firing just the most recent one found so far.
    pub max_misfire_scan: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            event_buffer_capacity: 1024,
            max_misfire_scan: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TriggerKind {
    Cron,
    Event,
}

struct SchedulerInner {
    engine: Engine,
    store: Arc<dyn Store>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    clock: SharedClock,
    config: SchedulerConfig,
    cron_triggers: RwLock<HashMap<Uuid, ScheduledTrigger>>,
    cron_schedules: RwLock<HashMap<Uuid, cron::Schedule>>,
    event_triggers: RwLock<HashMap<Uuid, EventTrigger>>,
    event_buffer: queue::EventBuffer<Event>,
    kinds: parking_lot::Mutex<HashMap<Uuid, TriggerKind>>,
    wake_cron: Notify,
    shutdown: CancellationToken,
}

/// Owns the cron timetable and event-trigger table; on fire, submits an
/// execution to the `Engine`. Cheaply cloneable.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(
        engine: Engine,
        store: Arc<dyn Store>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        clock: SharedClock,
        config: SchedulerConfig,
    ) -> Self {
        let event_buffer = queue::EventBuffer::new(config.event_buffer_capacity);
        Self {
            inner: Arc::new(SchedulerInner {
                engine,
                store,
                evaluator,
                clock,
                config,
                cron_triggers: RwLock::new(HashMap::new()),
                cron_schedules: RwLock::new(HashMap::new()),
                event_triggers: RwLock::new(HashMap::new()),
                event_buffer,
                kinds: parking_lot::Mutex::new(HashMap::new()),
                wake_cron: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the cron timer task and the event consumer task. Returns their
    /// join handles for graceful shutdown.
    pub fn spawn(&self) -> SchedulerTasks {
        let cron_inner = self.inner.clone();
        let cron = tokio::spawn(run_cron_loop(cron_inner));
        let event_inner = self.inner.clone();
        let events = tokio::spawn(run_event_loop(event_inner));
        SchedulerTasks { cron, events }
    }

    /// Trip the shutdown token; background loops observe it and exit.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub async fn add_cron(
        &self,
        workflow_id: Uuid,
        expression: impl Into<String>,
        trigger_params: HashMap<String, Value>,
    ) -> Result<Uuid, EngineError> {
        let expression = expression.into();
        let schedule: cron::Schedule =
            expression
                .parse()
                .map_err(|e: cron::error::Error| ValidationError::InvalidCronExpression {
                    expression: expression.clone(),
                    reason: e.to_string(),
                })?;

        let now = self.inner.clock.now();
        let next_fire_at = schedule
            .after(&now)
            .next()
            .ok_or_else(|| ValidationError::InvalidCronExpression {
                expression: expression.clone(),
                reason: "expression never fires".to_string(),
            })?;

        let trigger = ScheduledTrigger {
            id: Uuid::new_v4(),
            workflow_id,
            expression,
            trigger_params,
            status: TriggerStatus::Active,
            last_fired_at: None,
            next_fire_at,
        };

        self.inner.store.put_scheduled_trigger(trigger.clone()).await?;
        self.inner
            .cron_schedules
            .write()
            .await
            .insert(trigger.id, schedule);
        self.inner.cron_triggers.write().await.insert(trigger.id, trigger.clone());
        self.inner.kinds.lock().insert(trigger.id, TriggerKind::Cron);
        self.inner.wake_cron.notify_one();

        info!(trigger_id = %trigger.id, %workflow_id, "cron trigger added");
        Ok(trigger.id)
    }

    pub async fn add_event(
        &self,
        workflow_id: Uuid,
        event_pattern: impl Into<String>,
        conditions: Option<String>,
        trigger_params_template: HashMap<String, Value>,
    ) -> Result<Uuid, EngineError> {
        let trigger = EventTrigger {
            id: Uuid::new_v4(),
            workflow_id,
            event_pattern: event_pattern.into(),
            conditions,
            trigger_params_template,
            status: TriggerStatus::Active,
        };

        self.inner.store.put_event_trigger(trigger.clone()).await?;
        self.inner.event_triggers.write().await.insert(trigger.id, trigger.clone());
        self.inner.kinds.lock().insert(trigger.id, TriggerKind::Event);

        info!(trigger_id = %trigger.id, %workflow_id, "event trigger added");
        Ok(trigger.id)
    }

    /// Publish an event into the bounded buffer. If the buffer is full, the
    /// oldest pending event is dropped and `event_drops` is incremented.
    pub fn publish(&self, event: Event) {
        if self.inner.event_buffer.publish(event) {
            metrics::event_dropped();
        }
    }

    pub async fn pause(&self, trigger_id: Uuid) -> Result<(), EngineError> {
        self.set_status(trigger_id, TriggerStatus::Paused).await
    }

    pub async fn resume(&self, trigger_id: Uuid) -> Result<(), EngineError> {
        self.set_status(trigger_id, TriggerStatus::Active).await
    }

    async fn set_status(&self, trigger_id: Uuid, status: TriggerStatus) -> Result<(), EngineError> {
        let kind = self
            .inner
            .kinds
            .lock()
            .get(&trigger_id)
            .copied()
            .ok_or(EngineError::TriggerNotFound(trigger_id))?;

        match kind {
            TriggerKind::Cron => {
                let mut triggers = self.inner.cron_triggers.write().await;
                let trigger = triggers
                    .get_mut(&trigger_id)
                    .ok_or(EngineError::TriggerNotFound(trigger_id))?;
                trigger.status = status;
                self.inner.store.put_scheduled_trigger(trigger.clone()).await?;
                if status == TriggerStatus::Active {
                    self.inner.wake_cron.notify_one();
                }
            }
            TriggerKind::Event => {
                let mut triggers = self.inner.event_triggers.write().await;
                let trigger = triggers
                    .get_mut(&trigger_id)
                    .ok_or(EngineError::TriggerNotFound(trigger_id))?;
                trigger.status = status;
                self.inner.store.put_event_trigger(trigger.clone()).await?;
            }
        }
        Ok(())
    }

    pub async fn remove(&self, trigger_id: Uuid) -> Result<(), EngineError> {
        let kind = self
            .inner
            .kinds
            .lock()
            .remove(&trigger_id)
            .ok_or(EngineError::TriggerNotFound(trigger_id))?;

        match kind {
            TriggerKind::Cron => {
                self.inner.cron_triggers.write().await.remove(&trigger_id);
                self.inner.cron_schedules.write().await.remove(&trigger_id);
                self.inner.store.remove_scheduled_trigger(trigger_id).await?;
            }
            TriggerKind::Event => {
                self.inner.event_triggers.write().await.remove(&trigger_id);
                self.inner.store.remove_event_trigger(trigger_id).await?;
            }
        }
        Ok(())
    }
}

/// Handles returned by [`Scheduler::spawn`].
pub struct SchedulerTasks {
    pub cron: tokio::task::JoinHandle<()>,
    pub events: tokio::task::JoinHandle<()>,
}

async fn run_cron_loop(inner: Arc<SchedulerInner>) {
    loop {
        let next_deadline = {
            let triggers = inner.cron_triggers.read().await;
            triggers
                .values()
                .filter(|t| t.status == TriggerStatus::Active)
                .map(|t| t.next_fire_at)
                .min()
        };

        let sleep_fut = async {
            match next_deadline {
                Some(deadline) => {
                    let now = inner.clock.now();
                    let dur = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                    tokio::time::sleep(dur).await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            _ = inner.wake_cron.notified() => continue,
            _ = sleep_fut => {
                fire_due_cron_triggers(&inner).await;
            }
        }
    }
}

async fn fire_due_cron_triggers(inner: &Arc<SchedulerInner>) {
    let now = inner.clock.now();
    let due_ids: Vec<Uuid> = {
        let triggers = inner.cron_triggers.read().await;
        triggers
            .values()
            .filter(|t| t.status == TriggerStatus::Active && t.next_fire_at <= now)
            .map(|t| t.id)
            .collect()
    };

    for trigger_id in due_ids {
        let (trigger, schedule) = {
            let triggers = inner.cron_triggers.read().await;
            let schedules = inner.cron_schedules.read().await;
            match (triggers.get(&trigger_id), schedules.get(&trigger_id)) {
                (Some(t), Some(s)) => (t.clone(), s.clone()),
                _ => continue,
            }
        };

        let catchup = compute_catchup(&schedule, trigger.next_fire_at, now, inner.config.max_misfire_scan);
        for _ in 0..catchup.dropped {
            metrics::scheduler_misfire();
        }

        if let Some(fire_at) = catchup.fire_at {
            let workflow = match inner.store.get_workflow(trigger.workflow_id).await {
                Ok(w) => w,
                Err(e) => {
                    warn!(%trigger_id, error = %e, "cron trigger fired for unknown workflow");
                    continue;
                }
            };

            let mut params = trigger.trigger_params.clone();
            params.insert("fired_at".to_string(), serde_json::to_value(fire_at).unwrap_or(Value::Null));

            if let Err(e) = inner.engine.submit(workflow, params, TriggeredBy::Scheduler).await {
                warn!(%trigger_id, error = %e, "failed to submit cron-triggered execution");
            }
        }

        let mut triggers = inner.cron_triggers.write().await;
        if let Some(t) = triggers.get_mut(&trigger_id) {
            t.last_fired_at = catchup.fire_at;
            t.next_fire_at = catchup.next_fire_at;
            let _ = inner.store.put_scheduled_trigger(t.clone()).await;
        }
    }
}

struct CatchUp {
    fire_at: Option<DateTime<Utc>>,
    dropped: usize,
    next_fire_at: DateTime<Utc>,
}

/// "Most recent occurrence only" misfire policy: scan occurrences from
/// `next_fire_at` up to `now`, fire only the last one found, and report how
/// many earlier ones were dropped.
fn compute_catchup(
    schedule: &cron::Schedule,
    next_fire_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_scan: usize,
) -> CatchUp {
    if next_fire_at > now {
        return CatchUp {
            fire_at: None,
            dropped: 0,
            next_fire_at,
        };
    }

    let mut occurrences = vec![next_fire_at];
    let mut cursor = next_fire_at;
    let next_after_window = loop {
        if occurrences.len() >= max_scan {
            break schedule.after(&cursor).next();
        }
        match schedule.after(&cursor).next() {
            Some(next) if next <= now => {
                occurrences.push(next);
                cursor = next;
            }
            other => break other,
        }
    };

    let dropped = occurrences.len() - 1;
    let fire_at = occurrences.last().copied();
    let next_fire_at = next_after_window.unwrap_or(now);

    CatchUp {
        fire_at,
        dropped,
        next_fire_at,
    }
}

async fn run_event_loop(inner: Arc<SchedulerInner>) {
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            event = inner.event_buffer.recv() => {
                dispatch_event(&inner, event).await;
            }
        }
    }
}

async fn dispatch_event(inner: &Arc<SchedulerInner>, event: Event) {
    let matching: Vec<EventTrigger> = {
        let triggers = inner.event_triggers.read().await;
        triggers
            .values()
            .filter(|t| t.status == TriggerStatus::Active)
            .filter(|t| t.event_pattern == "*" || t.event_pattern == event.event_type)
            .cloned()
            .collect()
    };

    for trigger in matching {
        if let Some(expr) = &trigger.conditions {
            match inner.evaluator.eval_condition(expr, &event.payload) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(trigger_id = %trigger.id, error = %e, "event condition evaluation failed");
                    continue;
                }
            }
        }

        let workflow = match inner.store.get_workflow(trigger.workflow_id).await {
            Ok(w) => w,
            Err(e) => {
                warn!(trigger_id = %trigger.id, error = %e, "event trigger fired for unknown workflow");
                continue;
            }
        };

        let mut params = trigger.trigger_params_template.clone();
        params.insert("event".to_string(), event.payload.clone());
        params.insert("event_type".to_string(), Value::String(event.event_type.clone()));

        if let Err(e) = inner.engine.submit(workflow, params, TriggeredBy::Event).await {
            warn!(trigger_id = %trigger.id, error = %e, "failed to submit event-triggered execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn catchup_with_no_misfire_fires_once() {
        let schedule: cron::Schedule = "0 * * * * *".parse().unwrap();
        let next_fire_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let now = next_fire_at;
        let result = compute_catchup(&schedule, next_fire_at, now, 1000);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.fire_at, Some(next_fire_at));
    }

    #[test]
    fn catchup_after_downtime_fires_most_recent_only() {
        let schedule: cron::Schedule = "0 * * * * *".parse().unwrap();
        let next_fire_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 30).unwrap();
        let result = compute_catchup(&schedule, next_fire_at, now, 1000);
        assert_eq!(result.dropped, 5);
        assert_eq!(result.fire_at, Some(Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap()));
        assert_eq!(result.next_fire_at, Utc.with_ymd_and_hms(2026, 1, 1, 12, 6, 0).unwrap());
    }

    #[test]
    fn not_yet_due_fires_nothing() {
        let schedule: cron::Schedule = "0 * * * * *".parse().unwrap();
        let next_fire_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 11, 59, 0).unwrap();
        let result = compute_catchup(&schedule, next_fire_at, now, 1000);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.fire_at, None);
        assert_eq!(result.next_fire_at, next_fire_at);
    }
}
