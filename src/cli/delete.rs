use crate::cli::build_controller;
use crate::core::metrics::Metrics;
use crate::core::settings::Settings;
use crate::gallery::GalleryController;
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(settings: &Settings, image_id: &str, yes: bool) -> Result<()> {
    let controller = build_controller(settings, Metrics::new())?;
    let result = delete_with_confirmation(&controller, image_id, yes).await;
    controller.deactivate();
    result
}

async fn delete_with_confirmation(
    controller: &GalleryController,
    image_id: &str,
    yes: bool,
) -> Result<()> {
    controller
        .activate()
        .await
        .context("Failed to load your images")?;

    let view = controller.view();
    let description = match view.find(image_id) {
        Some(image) => format!(
            "{} ({}, {})",
            image.file_name,
            image_id,
            image.status.label()
        ),
        None => {
            tracing::warn!(image_id, "Image is not in the current gallery listing");
            image_id.to_string()
        }
    };

    if !yes && !confirm(&format!("Delete {description}? [y/N] ")).await? {
        println!("Cancelled");
        return Ok(());
    }

    if let Err(e) = controller.delete_item(image_id).await {
        if let Some(message) = controller.view().error {
            eprintln!("{message}");
        }
        return Err(e).with_context(|| format!("Failed to delete image {image_id}"));
    }

    println!("Deleted {description}");
    Ok(())
}

async fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await
        .context("Failed to read confirmation")?;

    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
