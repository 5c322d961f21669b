use crate::api::{GalleryClient, ImageFetcher};
use crate::cli::print_image_table;
use crate::core::models::ImageStatus;
use crate::core::settings::Settings;
use anyhow::{Context, Result};

pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    let client = GalleryClient::new(settings)?;
    let images = client
        .fetch_all()
        .await
        .context("Failed to load your images")?;

    tracing::debug!(count = images.len(), "Listing images");

    if json {
        println!("{}", serde_json::to_string_pretty(&images)?);
        return Ok(());
    }

    print_image_table(&images);

    let in_progress = images.iter().filter(|i| !i.status.is_terminal()).count();
    if in_progress > 0 {
        println!();
        println!(
            "{in_progress} image(s) still {} or {}; run `gallery-watch watch` to follow them.",
            ImageStatus::Pending.label().to_lowercase(),
            ImageStatus::Processing.label().to_lowercase()
        );
    }

    Ok(())
}
