//! Delayed turn-off timer.
//!
//! [`DelayedOff`] holds at most one countdown. Starting a new one cancels the
//! previous one. While active it publishes a [`HubEvent::DelayedOff`] on
//! start, on every countdown tick and on cancel or fire.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::events::{DelayedOffState, EventDispatcher, HubEvent};
use crate::timer::{ScheduledTask, call_later, call_periodic};
use crate::util::{format_rfc3339, lock};

/// Shortest accepted delay.
pub const MIN_DELAY_MINUTES: u32 = 1;

/// Longest accepted delay.
pub const MAX_DELAY_MINUTES: u32 = 120;

/// Interval between countdown ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// What to do when the countdown runs out.
#[async_trait]
pub trait TurnOffAction: Send + Sync + 'static {
    /// Switch the device off.
    async fn turn_off(&self) -> Result<()>;
}

#[derive(Default)]
struct Slot {
    active: bool,
    remaining_minutes: u32,
    scheduled_time: Option<OffsetDateTime>,
    fire: Option<ScheduledTask>,
    tick: Option<ScheduledTask>,
    generation: u64,
}

impl Slot {
    fn snapshot(&self) -> DelayedOffState {
        DelayedOffState {
            active: self.active,
            remaining_minutes: self.remaining_minutes,
            scheduled_time: self.scheduled_time.map(format_rfc3339),
        }
    }

    fn clear(&mut self) {
        self.active = false;
        self.remaining_minutes = 0;
        self.scheduled_time = None;
        self.generation += 1;
    }
}

struct Inner {
    events: EventDispatcher,
    tick_interval: Duration,
    slot: Mutex<Slot>,
}

/// Single-slot cancelable turn-off countdown.
///
/// Cloning is cheap; clones share the same slot.
#[derive(Clone)]
pub struct DelayedOff {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DelayedOff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedOff")
            .field("state", &self.state())
            .finish()
    }
}

impl DelayedOff {
    /// Create a helper publishing on `events`, ticking once a minute.
    pub fn new(events: EventDispatcher) -> Self {
        Self::with_tick_interval(events, DEFAULT_TICK_INTERVAL)
    }

    /// Create a helper with a custom countdown tick interval.
    pub fn with_tick_interval(events: EventDispatcher, tick_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                events,
                tick_interval,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Whether a countdown is running.
    pub fn is_active(&self) -> bool {
        lock(&self.inner.slot).active
    }

    /// Whole minutes left on the countdown.
    pub fn remaining_minutes(&self) -> u32 {
        lock(&self.inner.slot).remaining_minutes
    }

    /// When the action will run.
    pub fn scheduled_time(&self) -> Option<OffsetDateTime> {
        lock(&self.inner.slot).scheduled_time
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> DelayedOffState {
        lock(&self.inner.slot).snapshot()
    }

    /// Attributes exposed on the fan entity.
    pub fn state_attributes(&self) -> Map<String, Value> {
        let state = self.state();
        let mut attrs = Map::new();
        attrs.insert("delayed_off_active".to_string(), Value::from(state.active));
        attrs.insert(
            "delayed_off_remaining".to_string(),
            Value::from(state.remaining_minutes),
        );
        if let Some(time) = state.scheduled_time {
            attrs.insert("delayed_off_scheduled_time".to_string(), Value::from(time));
        }
        attrs
    }

    /// Start a countdown of `delay_minutes` that ends with `action`.
    ///
    /// The delay is clamped to `1..=120` minutes and returned. Any running
    /// countdown is cancelled first.
    pub fn start(&self, delay_minutes: u32, action: Arc<dyn TurnOffAction>) -> u32 {
        let minutes = delay_minutes.clamp(MIN_DELAY_MINUTES, MAX_DELAY_MINUTES);
        self.cancel();

        let scheduled = OffsetDateTime::now_utc() + time::Duration::minutes(i64::from(minutes));
        let state = {
            let mut slot = lock(&self.inner.slot);
            slot.generation += 1;
            let generation = slot.generation;
            slot.active = true;
            slot.remaining_minutes = minutes;
            slot.scheduled_time = Some(scheduled);

            let weak = Arc::downgrade(&self.inner);
            let delay = Duration::from_secs(u64::from(minutes) * 60);
            slot.fire = Some(call_later(delay, move || {
                fire(weak, generation, action)
            }));

            let weak = Arc::downgrade(&self.inner);
            slot.tick = Some(call_periodic(self.inner.tick_interval, move || {
                let weak = weak.clone();
                async move { tick(weak, generation) }
            }));
            slot.snapshot()
        };

        info!(
            "Starting delayed turn-off: {} minutes (until {})",
            minutes,
            format_rfc3339(scheduled)
        );
        self.inner.events.send(HubEvent::DelayedOff(state));
        minutes
    }

    /// Cancel the countdown. Publishes only if one was running.
    pub fn cancel(&self) {
        let (fire, tick, was_active, state) = {
            let mut slot = lock(&self.inner.slot);
            let was_active = slot.active;
            slot.clear();
            (slot.fire.take(), slot.tick.take(), was_active, slot.snapshot())
        };
        for task in [fire, tick].into_iter().flatten() {
            task.cancel();
        }
        if was_active {
            info!("Delayed turn-off cancelled");
            self.inner.events.send(HubEvent::DelayedOff(state));
        }
    }
}

fn tick(weak: Weak<Inner>, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let state = {
        let mut slot = lock(&inner.slot);
        if slot.generation != generation || !slot.active || slot.remaining_minutes == 0 {
            return;
        }
        slot.remaining_minutes -= 1;
        slot.snapshot()
    };
    debug!("Delayed turn-off: {} minutes left", state.remaining_minutes);
    inner.events.send(HubEvent::DelayedOff(state));
}

async fn fire(weak: Weak<Inner>, generation: u64, action: Arc<dyn TurnOffAction>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let tick = {
        let mut slot = lock(&inner.slot);
        if slot.generation != generation || !slot.active {
            return;
        }
        slot.clear();
        // Dropping our own handle detaches this task instead of cancelling it.
        drop(slot.fire.take());
        slot.tick.take()
    };
    if let Some(tick) = tick {
        tick.cancel();
    }

    info!("Executing delayed turn-off");
    if let Err(e) = action.turn_off().await {
        error!("Delayed turn-off failed: {}", e);
    }
    let state = lock(&inner.slot).snapshot();
    inner.events.send(HubEvent::DelayedOff(state));
    info!("Delayed turn-off completed");
}
