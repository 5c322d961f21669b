use crate::cli::{build_controller, print_image_table};
use crate::core::metrics::{Metrics, ACTIVE_POLLS, BACKGROUND_FAILURES, FETCHES, TIMERS_STARTED};
use crate::core::models::{GalleryView, ImageStatus};
use crate::core::session::SessionWatcher;
use crate::core::settings::Settings;
use crate::gallery::RefreshMode;
use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;

pub struct WatchOptions {
    pub json: bool,
    pub until_settled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent {
    Status {
        image_id: String,
        file_name: String,
        previous: Option<ImageStatus>,
        status: ImageStatus,
    },
    Removed {
        image_id: String,
    },
    Error {
        message: String,
    },
    Snapshot {
        view: GalleryView,
    },
}

/// Remembers the last status seen per image so only transitions are reported.
#[derive(Debug, Default)]
struct StatusTracker {
    statuses: HashMap<String, ImageStatus>,
    last_error: Option<String>,
}

impl StatusTracker {
    fn observe(&mut self, view: &GalleryView) -> Vec<WatchEvent> {
        let mut events = Vec::new();

        if view.error != self.last_error {
            if let Some(message) = &view.error {
                events.push(WatchEvent::Error {
                    message: message.clone(),
                });
            }
            self.last_error = view.error.clone();
        }

        let mut current = HashMap::with_capacity(view.items.len());
        for item in &view.items {
            let previous = self.statuses.get(&item.image_id).copied();
            if previous != Some(item.status) {
                events.push(WatchEvent::Status {
                    image_id: item.image_id.clone(),
                    file_name: item.file_name.clone(),
                    previous,
                    status: item.status,
                });
            }
            current.insert(item.image_id.clone(), item.status);
        }

        let mut removed: Vec<&String> = self
            .statuses
            .keys()
            .filter(|id| !current.contains_key(*id))
            .collect();
        removed.sort();
        events.extend(removed.into_iter().map(|id| WatchEvent::Removed {
            image_id: id.clone(),
        }));

        self.statuses = current;
        events
    }
}

fn print_event(event: &WatchEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode watch event"),
        }
        return;
    }

    let now = Local::now().format("%H:%M:%S");
    match event {
        WatchEvent::Status {
            image_id,
            file_name,
            previous: Some(previous),
            status,
        } => println!(
            "[{now}] {file_name} ({image_id}): {} -> {}",
            previous.label(),
            status.label()
        ),
        WatchEvent::Status {
            image_id,
            file_name,
            previous: None,
            status,
        } => println!(
            "[{now}] {file_name} ({image_id}): {} ({})",
            status.label(),
            status.description()
        ),
        WatchEvent::Removed { image_id } => println!("[{now}] {image_id}: removed"),
        WatchEvent::Error { message } => eprintln!("[{now}] {message}"),
        WatchEvent::Snapshot { view } => {
            println!();
            print_image_table(&view.items);
        }
    }
}

async fn next_session_change(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub async fn run(settings: &Settings, options: WatchOptions) -> Result<()> {
    let controller = build_controller(settings, Metrics::new())?;
    let mut view_rx = controller.subscribe();

    let (_session_watcher, mut session_rx) = match settings.session_path() {
        Some(path) => match SessionWatcher::start(path) {
            Ok((watcher, rx)) => (Some(watcher), Some(rx)),
            Err(e) => {
                tracing::warn!(error = %e, "Session watching disabled");
                (None, None)
            }
        },
        None => (None, None),
    };

    let mut tracker = StatusTracker::default();

    if let Err(e) = controller.activate().await {
        if options.until_settled {
            controller.deactivate();
            return Err(e.into());
        }
        tracing::warn!(error = %e, "Initial load failed, waiting for a session change");
    }

    let initial = view_rx.borrow_and_update().clone();
    if !options.json && initial.error.is_none() {
        print_image_table(&initial.items);
        println!();
    }
    for event in tracker.observe(&initial) {
        if options.json || matches!(event, WatchEvent::Error { .. }) {
            print_event(&event, options.json);
        }
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let view = controller.view();
        if options.until_settled && view.error.is_none() && !view.has_non_terminal() {
            tracing::info!("All images settled");
            break;
        }

        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                for event in tracker.observe(&view) {
                    print_event(&event, options.json);
                }
            }
            Some(()) = next_session_change(&mut session_rx) => {
                tracing::info!("Session changed, reloading images");
                if let Err(e) = controller.refresh(RefreshMode::Initial).await {
                    tracing::warn!(error = %e, "Reload after session change failed");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    controller.deactivate();
    print_event(
        &WatchEvent::Snapshot {
            view: controller.view(),
        },
        options.json,
    );

    let metrics = controller.metrics();
    if options.json {
        let snapshot = metrics.snapshot();
        println!(
            "{}",
            serde_json::json!({
                "event": "metrics",
                "counters": snapshot.counters,
                "gauges": snapshot.gauges,
            })
        );
    } else {
        tracing::info!(
            fetches = metrics.counter(FETCHES),
            background_failures = metrics.counter(BACKGROUND_FAILURES),
            timers_started = metrics.counter(TIMERS_STARTED),
            peak_polls = metrics.gauge_peak(ACTIVE_POLLS),
            "Stopped watching"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TrackedImage;

    fn image(id: &str, status: ImageStatus) -> TrackedImage {
        TrackedImage {
            image_id: id.to_string(),
            status,
            file_name: format!("{id}.jpg"),
            created_at: 0,
            image_url: None,
        }
    }

    fn view(items: Vec<TrackedImage>) -> GalleryView {
        GalleryView {
            items,
            ..GalleryView::default()
        }
    }

    #[test]
    fn test_first_observation_reports_everything() {
        let mut tracker = StatusTracker::default();
        let events = tracker.observe(&view(vec![
            image("a", ImageStatus::Pending),
            image("b", ImageStatus::Completed),
        ]));

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(
            e,
            WatchEvent::Status { previous: None, .. }
        )));
    }

    #[test]
    fn test_only_transitions_are_reported() {
        let mut tracker = StatusTracker::default();
        tracker.observe(&view(vec![
            image("a", ImageStatus::Pending),
            image("b", ImageStatus::Completed),
        ]));

        let events = tracker.observe(&view(vec![
            image("a", ImageStatus::Processing),
            image("b", ImageStatus::Completed),
        ]));
        assert_eq!(
            events,
            vec![WatchEvent::Status {
                image_id: "a".to_string(),
                file_name: "a.jpg".to_string(),
                previous: Some(ImageStatus::Pending),
                status: ImageStatus::Processing,
            }]
        );

        let events = tracker.observe(&view(vec![
            image("a", ImageStatus::Processing),
            image("b", ImageStatus::Completed),
        ]));
        assert!(events.is_empty());
    }

    #[test]
    fn test_removed_images_are_reported() {
        let mut tracker = StatusTracker::default();
        tracker.observe(&view(vec![
            image("a", ImageStatus::Completed),
            image("b", ImageStatus::Failed),
        ]));

        let events = tracker.observe(&view(vec![image("b", ImageStatus::Failed)]));
        assert_eq!(
            events,
            vec![WatchEvent::Removed {
                image_id: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_error_reported_once() {
        let mut tracker = StatusTracker::default();
        let failed = GalleryView {
            error: Some("Failed to load your images. Please try again later.".to_string()),
            ..GalleryView::default()
        };

        let events = tracker.observe(&failed);
        assert!(matches!(events.as_slice(), [WatchEvent::Error { .. }]));
        assert!(tracker.observe(&failed).is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let event = WatchEvent::Status {
            image_id: "a".to_string(),
            file_name: "a.jpg".to_string(),
            previous: Some(ImageStatus::Pending),
            status: ImageStatus::Processing,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "status",
                "image_id": "a",
                "file_name": "a.jpg",
                "previous": "pending",
                "status": "processing"
            })
        );
    }

    #[test]
    fn test_snapshot_json_shape() {
        let event = WatchEvent::Snapshot {
            view: view(vec![image("a", ImageStatus::Completed)]),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "snapshot");
        assert_eq!(value["view"]["items"][0]["imageId"], "a");
        assert_eq!(value["view"]["items"][0]["status"], "completed");
        assert_eq!(value["view"]["is_polling"], false);
        assert_eq!(value["view"]["error"], serde_json::Value::Null);
    }
}
