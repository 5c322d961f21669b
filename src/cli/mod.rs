pub mod delete;
pub mod list;
pub mod results;
pub mod upload;
pub mod watch;

use crate::api::GalleryClient;
use crate::core::metrics::Metrics;
use crate::core::models::TrackedImage;
use crate::core::settings::Settings;
use crate::gallery::{GalleryController, PollConfig};
use anyhow::Result;
use std::sync::Arc;

const NAME_WIDTH: usize = 20;

fn build_controller(settings: &Settings, metrics: Metrics) -> Result<GalleryController> {
    let client = Arc::new(GalleryClient::new(settings)?);

    Ok(GalleryController::new(
        client.clone(),
        client,
        PollConfig::from(&settings.polling),
        metrics,
    ))
}

fn format_created(image: &TrackedImage) -> String {
    image
        .created_at_utc()
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "Unknown date".to_string())
}

fn print_image_table(images: &[TrackedImage]) {
    if images.is_empty() {
        println!(
            "No images found. Run `gallery-watch upload <file>` to get started with analysis!"
        );
        return;
    }

    println!(
        "{:<38} {:<width$} {:<11} CREATED",
        "ID",
        "NAME",
        "STATUS",
        width = NAME_WIDTH
    );
    for image in images {
        println!(
            "{:<38} {:<width$} {:<11} {}",
            image.image_id,
            image.short_name(NAME_WIDTH),
            image.status.label(),
            format_created(image),
            width = NAME_WIDTH
        );
    }
}
