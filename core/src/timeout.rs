//! Self-destruct scheduling: a single cancellable deadline that shuts the
//! sandbox down through a pluggable hook when it fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sandboxd_protocol::TimeoutEvent;
use sandboxd_protocol::TimeoutStatus;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::error::SandboxErr;

/// Minutes granted per keep-alive nudge.
pub const DEFAULT_EXTEND_MINUTES: f64 = 3.0;

/// What to do when the deadline fires. In production this is the supervisor
/// bridge; tests substitute a recorder.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    async fn shutdown(&self) -> Result<()>;
}

/// Tracks at most one pending self-destruct deadline. Re-arming always
/// cancels the previous timer first, so two timers can never race to fire.
pub struct TimeoutScheduler {
    default_minutes: Option<u64>,
    hook: Arc<dyn ShutdownHook>,
    inner: Mutex<TimerState>,
}

struct TimerState {
    deadline: Option<DateTime<Utc>>,
    auto_extend: bool,
    timer: Option<JoinHandle<()>>,
}

impl TimeoutScheduler {
    /// Must run inside a tokio runtime: when the configured default timeout
    /// is present the initial deadline is armed immediately, with keep-alive
    /// left enabled.
    pub fn new(config: &Config, hook: Arc<dyn ShutdownHook>) -> Self {
        let mut state = TimerState {
            deadline: None,
            auto_extend: true,
            timer: None,
        };
        if let Some(minutes) = config.run_timeout_minutes {
            let minutes = minutes as f64;
            state.deadline = Some(deadline_after(minutes));
            arm(&mut state, Arc::clone(&hook), minutes);
            info!(minutes, "armed default self-destruct deadline");
        }
        Self {
            default_minutes: config.run_timeout_minutes,
            hook,
            inner: Mutex::new(state),
        }
    }

    /// Arms a deadline `minutes` from now, replacing any pending one, and
    /// disables keep-alive so routine traffic can no longer push it back.
    /// Without an explicit value the configured default applies; lacking
    /// both is a caller error.
    pub async fn activate(&self, minutes: Option<f64>) -> Result<TimeoutStatus> {
        let minutes = minutes
            .or(self.default_minutes.map(|m| m as f64))
            .ok_or_else(|| {
                SandboxErr::bad_request("no timeout given and no default timeout configured")
            })?;
        let mut state = self.inner.lock().await;
        let deadline = deadline_after(minutes);
        state.deadline = Some(deadline);
        state.auto_extend = false;
        arm(&mut state, Arc::clone(&self.hook), minutes);
        info!(minutes, %deadline, "self-destruct deadline activated");
        Ok(status_for(TimeoutEvent::TimeoutActivated, deadline, minutes))
    }

    /// Pushes the pending deadline back by `minutes` on top of whatever time
    /// remains. Requires an armed deadline; extending nothing is a caller
    /// error, not a silent activate.
    pub async fn extend(&self, minutes: Option<f64>) -> Result<TimeoutStatus> {
        let minutes = minutes.unwrap_or(DEFAULT_EXTEND_MINUTES);
        let mut state = self.inner.lock().await;
        let deadline = state.deadline.ok_or_else(|| {
            SandboxErr::bad_request("no active self-destruct deadline to extend")
        })?;
        let total_minutes = remaining_seconds(deadline) / 60.0 + minutes;
        let deadline = deadline_after(total_minutes);
        state.deadline = Some(deadline);
        state.auto_extend = false;
        arm(&mut state, Arc::clone(&self.hook), total_minutes);
        info!(minutes, %deadline, "self-destruct deadline extended");
        Ok(status_for(
            TimeoutEvent::TimeoutExtended,
            deadline,
            total_minutes,
        ))
    }

    /// Keep-alive nudge for routine traffic: while enabled and a deadline is
    /// armed, each call re-arms it [`DEFAULT_EXTEND_MINUTES`] past the
    /// remaining time. A no-op once a caller has taken explicit control via
    /// activate or extend.
    pub async fn auto_extend(&self) -> Option<TimeoutStatus> {
        let mut state = self.inner.lock().await;
        if !state.auto_extend {
            return None;
        }
        let deadline = state.deadline?;
        let total_minutes = remaining_seconds(deadline) / 60.0 + DEFAULT_EXTEND_MINUTES;
        let deadline = deadline_after(total_minutes);
        state.deadline = Some(deadline);
        arm(&mut state, Arc::clone(&self.hook), total_minutes);
        Some(status_for(
            TimeoutEvent::TimeoutExtended,
            deadline,
            total_minutes,
        ))
    }

    /// Cancels the pending deadline and re-enables keep-alive. Cancelling
    /// when nothing is armed reports `no_timeout_active`.
    pub async fn cancel(&self) -> TimeoutStatus {
        let mut state = self.inner.lock().await;
        if state.deadline.is_none() {
            return TimeoutStatus::inactive(Some(TimeoutEvent::NoTimeoutActive));
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.deadline = None;
        state.auto_extend = true;
        info!("self-destruct deadline cancelled");
        TimeoutStatus::inactive(Some(TimeoutEvent::TimeoutCancelled))
    }

    pub async fn status(&self) -> TimeoutStatus {
        let state = self.inner.lock().await;
        match state.deadline {
            None => TimeoutStatus::inactive(None),
            Some(deadline) => TimeoutStatus {
                status: None,
                active: true,
                shutdown_time: Some(deadline),
                timeout_minutes: None,
                remaining_seconds: Some(remaining_seconds(deadline)),
            },
        }
    }

    pub async fn auto_extend_enabled(&self) -> bool {
        self.inner.lock().await.auto_extend
    }

    pub async fn enable_auto_extend(&self) {
        self.inner.lock().await.auto_extend = true;
    }

    pub async fn disable_auto_extend(&self) {
        self.inner.lock().await.auto_extend = false;
    }
}

fn arm(state: &mut TimerState, hook: Arc<dyn ShutdownHook>, minutes: f64) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    let delay = Duration::from_secs_f64(minutes.max(0.0) * 60.0);
    state.timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        warn!("self-destruct deadline reached, shutting sandbox down");
        if let Err(err) = hook.shutdown().await {
            warn!(error = %err, "shutdown hook failed");
        }
    }));
}

fn status_for(event: TimeoutEvent, deadline: DateTime<Utc>, minutes: f64) -> TimeoutStatus {
    TimeoutStatus {
        status: Some(event),
        active: true,
        shutdown_time: Some(deadline),
        timeout_minutes: Some(minutes),
        remaining_seconds: Some(remaining_seconds(deadline)),
    }
}

fn deadline_after(minutes: f64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds((minutes * 60_000.0) as i64)
}

fn remaining_seconds(deadline: DateTime<Utc>) -> f64 {
    let remaining = (deadline - Utc::now()).num_milliseconds() as f64 / 1_000.0;
    remaining.max(0.0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct RecordingHook {
        fired: AtomicUsize,
    }

    #[async_trait]
    impl ShutdownHook for RecordingHook {
        async fn shutdown(&self) -> Result<()> {
            self.fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler(default_minutes: Option<u64>) -> (TimeoutScheduler, Arc<RecordingHook>) {
        let hook = Arc::new(RecordingHook::default());
        let config = Config {
            run_timeout_minutes: default_minutes,
            ..Config::default()
        };
        let scheduler = TimeoutScheduler::new(&config, Arc::clone(&hook) as Arc<dyn ShutdownHook>);
        (scheduler, hook)
    }

    #[tokio::test(start_paused = true)]
    async fn default_deadline_fires_exactly_once() {
        let (scheduler, hook) = scheduler(Some(1));
        assert!(scheduler.status().await.active);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(hook.fired.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(hook.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_default_means_nothing_is_armed() {
        let (scheduler, hook) = scheduler(None);
        assert!(!scheduler.status().await.active);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(hook.fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn activate_without_minutes_or_default_is_rejected() {
        let (scheduler, _hook) = scheduler(None);
        let err = scheduler.activate(None).await.expect_err("must fail");
        assert_matches!(err, SandboxErr::BadRequest(_));
    }

    #[tokio::test(start_paused = true)]
    async fn extend_without_deadline_is_rejected() {
        let (scheduler, _hook) = scheduler(None);
        let err = scheduler.extend(Some(5.0)).await.expect_err("must fail");
        assert_matches!(err, SandboxErr::BadRequest(_));
    }

    #[tokio::test(start_paused = true)]
    async fn extend_accumulates_remaining_time() {
        let (scheduler, _hook) = scheduler(None);
        let activated = scheduler.activate(Some(10.0)).await.unwrap();
        assert_eq!(activated.status, Some(TimeoutEvent::TimeoutActivated));
        let extended = scheduler.extend(Some(5.0)).await.unwrap();
        assert_eq!(extended.status, Some(TimeoutEvent::TimeoutExtended));
        let remaining = extended.remaining_seconds.unwrap();
        assert!((remaining - 15.0 * 60.0).abs() < 2.0, "remaining {remaining}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_and_restores_keep_alive() {
        let (scheduler, hook) = scheduler(None);
        scheduler.activate(Some(1.0)).await.unwrap();
        assert!(!scheduler.auto_extend_enabled().await);
        let cancelled = scheduler.cancel().await;
        assert_eq!(cancelled.status, Some(TimeoutEvent::TimeoutCancelled));
        assert!(scheduler.auto_extend_enabled().await);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(hook.fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_fires_shutdown_once_after_the_deadline() {
        let (scheduler, hook) = scheduler(None);
        scheduler.activate(Some(1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(hook.fired.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(hook.fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_deadline_reports_no_timeout() {
        let (scheduler, _hook) = scheduler(None);
        let result = scheduler.cancel().await;
        assert_eq!(result.status, Some(TimeoutEvent::NoTimeoutActive));
        assert!(!result.active);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_extend_is_a_noop_after_explicit_activate() {
        let (scheduler, _hook) = scheduler(Some(30));
        assert!(scheduler.auto_extend().await.is_some());
        scheduler.activate(Some(5.0)).await.unwrap();
        assert!(scheduler.auto_extend().await.is_none());
    }
}
