use crate::api::{ApiError, ImageDeleter, ImageFetcher};
use crate::core::metrics::{
    Metrics, ACTIVE_POLLS, BACKGROUND_FAILURES, DELETES, DELETE_FAILURES, FETCHES,
    FETCH_FAILURES, TIMERS_STARTED,
};
use crate::core::models::GalleryView;
use crate::core::retry::RetryState;
use crate::gallery::polling::{evaluate, PollConfig, PollState};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const LOAD_ERROR_MESSAGE: &str = "Failed to load your images. Please try again later.";
pub const SESSION_ERROR_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const DELETE_ERROR_MESSAGE: &str = "Failed to delete the image. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// User-visible load: toggles the loading flag and surfaces errors.
    Initial,
    /// Poll tick: silent on failure, never touches the loading flag.
    Background,
}

#[derive(Debug, Clone, Copy)]
enum Busy {
    Loading,
    Deleting,
}

#[derive(Default)]
struct ControllerState {
    view: GalleryView,
    poll_state: PollState,
    timer: Option<JoinHandle<()>>,
    active: bool,
}

struct ControllerInner {
    fetcher: Arc<dyn ImageFetcher>,
    deleter: Arc<dyn ImageDeleter>,
    config: PollConfig,
    metrics: Metrics,
    state: Mutex<ControllerState>,
    view_tx: watch::Sender<GalleryView>,
}

/// Keeps a busy flag raised until dropped, whichever way the operation ends.
struct BusyGuard<'a> {
    inner: &'a ControllerInner,
    busy: Busy,
}

impl<'a> BusyGuard<'a> {
    fn engage(inner: &'a ControllerInner, busy: Busy) -> Self {
        inner.set_busy(busy, true);
        Self { inner, busy }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.inner.set_busy(self.busy, false);
    }
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &ControllerState) {
        self.view_tx.send_replace(state.view.clone());
    }

    fn set_busy(&self, busy: Busy, value: bool) {
        let mut state = self.lock();
        match busy {
            Busy::Loading => state.view.is_loading = value,
            Busy::Deleting => state.view.delete_in_progress = value,
        }
        self.publish(&state);
    }

    async fn refresh(self: &Arc<Self>, mode: RefreshMode) -> Result<(), ApiError> {
        let _loading = match mode {
            RefreshMode::Initial => Some(BusyGuard::engage(self, Busy::Loading)),
            RefreshMode::Background => None,
        };

        self.metrics.inc_counter(FETCHES);
        let result = self.fetcher.fetch_all().await;

        match result {
            Ok(items) => {
                let mut state = self.lock();
                tracing::debug!(?mode, items = items.len(), "Replaced image snapshot");
                state.view.items = items;
                state.view.error = None;
                self.reevaluate(&mut state);
                self.publish(&state);
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_counter(FETCH_FAILURES);
                match mode {
                    RefreshMode::Initial => {
                        tracing::warn!(error = %e, "Failed to load images");
                        let message = if e.is_auth() {
                            SESSION_ERROR_MESSAGE
                        } else {
                            LOAD_ERROR_MESSAGE
                        };
                        let mut state = self.lock();
                        state.view.error = Some(message.to_string());
                        self.publish(&state);
                    }
                    RefreshMode::Background => {
                        self.metrics.inc_counter(BACKGROUND_FAILURES);
                        tracing::debug!(
                            error = %e,
                            "Background poll failed, keeping last snapshot"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn delete_item(self: &Arc<Self>, image_id: &str) -> Result<(), ApiError> {
        let _deleting = BusyGuard::engage(self, Busy::Deleting);
        self.metrics.inc_counter(DELETES);

        let result = match self.deleter.delete_by_id(image_id).await {
            Err(e) if e.is_not_found() => {
                tracing::info!(image_id, "Image already deleted on server");
                Ok(())
            }
            other => other,
        };

        let mut state = self.lock();
        match result {
            Ok(()) => {
                state.view.items.retain(|item| item.image_id != image_id);
                tracing::info!(image_id, remaining = state.view.items.len(), "Deleted image");
                self.reevaluate(&mut state);
                self.publish(&state);
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_counter(DELETE_FAILURES);
                tracing::warn!(image_id, error = %e, "Failed to delete image");
                state.view.error = Some(DELETE_ERROR_MESSAGE.to_string());
                self.publish(&state);
                Err(e)
            }
        }
    }

    /// Runs after every change to the item list. The previous timer is always
    /// cancelled before a new one may be stored.
    fn reevaluate(self: &Arc<Self>, state: &mut ControllerState) {
        self.cancel_timer(state);

        let previous = state.poll_state;
        let next = match evaluate(&state.view.items) {
            PollState::Polling if state.active => {
                state.timer = Some(self.spawn_timer());
                self.metrics.inc_counter(TIMERS_STARTED);
                self.metrics.add_gauge(ACTIVE_POLLS, 1);
                PollState::Polling
            }
            _ => PollState::Idle,
        };

        state.poll_state = next;
        state.view.is_polling = next == PollState::Polling;

        if previous != next {
            match next {
                PollState::Polling => tracing::info!(
                    interval_ms = self.config.interval.as_millis() as u64,
                    "Images still being analysed, polling started"
                ),
                PollState::Idle => tracing::info!("All images settled, polling stopped"),
            }
        }
    }

    fn cancel_timer(&self, state: &mut ControllerState) {
        if let Some(handle) = state.timer.take() {
            handle.abort();
            self.metrics.add_gauge(ACTIVE_POLLS, -1);
        }
    }

    fn spawn_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut retry = if self.config.backoff {
            RetryState::new(self.config.interval, self.config.max_interval, true)
        } else {
            RetryState::fixed(self.config.interval)
        };

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(retry.current_delay()).await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };

                match inner.refresh(RefreshMode::Background).await {
                    Ok(()) => retry.record_success(),
                    Err(e) => {
                        retry.record_failure();
                        tracing::debug!(
                            error = %e,
                            consecutive_failures = retry.consecutive_failures(),
                            backoff = retry.is_in_backoff(),
                            next_delay_ms = retry.current_delay().as_millis() as u64,
                            "Poll tick failed"
                        );
                    }
                }
            }
        })
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = state.timer.take() {
            handle.abort();
            self.metrics.add_gauge(ACTIVE_POLLS, -1);
        }
    }
}

/// Tracks a user's images and polls while any of them is still being analysed.
///
/// Cloning yields another handle to the same controller. The background timer
/// is cancelled on [`GalleryController::deactivate`] or when the last handle
/// is dropped.
#[derive(Clone)]
pub struct GalleryController {
    inner: Arc<ControllerInner>,
}

impl GalleryController {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        deleter: Arc<dyn ImageDeleter>,
        config: PollConfig,
        metrics: Metrics,
    ) -> Self {
        let (view_tx, _) = watch::channel(GalleryView::default());

        Self {
            inner: Arc::new(ControllerInner {
                fetcher,
                deleter,
                config,
                metrics,
                state: Mutex::new(ControllerState::default()),
                view_tx,
            }),
        }
    }

    /// Brings the controller into scope and performs the first load.
    pub async fn activate(&self) -> Result<(), ApiError> {
        {
            let mut state = self.inner.lock();
            if state.active {
                tracing::debug!("Controller already active, reloading");
            }
            state.active = true;
        }
        self.inner.refresh(RefreshMode::Initial).await
    }

    /// Cancels any scheduled poll. Safe to call repeatedly.
    pub fn deactivate(&self) {
        let mut state = self.inner.lock();
        state.active = false;
        self.inner.cancel_timer(&mut state);
        state.poll_state = PollState::Idle;
        state.view.is_polling = false;
        self.inner.publish(&state);
        tracing::debug!(
            active_polls = self.inner.metrics.gauge(ACTIVE_POLLS),
            "Controller deactivated"
        );
    }

    pub async fn refresh(&self, mode: RefreshMode) -> Result<(), ApiError> {
        self.inner.refresh(mode).await
    }

    /// Deletes an image remotely, then drops it from the local snapshot.
    ///
    /// The caller is responsible for confirming the deletion with the user.
    pub async fn delete_item(&self, image_id: &str) -> Result<(), ApiError> {
        self.inner.delete_item(image_id).await
    }

    pub fn view(&self) -> GalleryView {
        self.inner.lock().view.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryView> {
        self.inner.view_tx.subscribe()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}
