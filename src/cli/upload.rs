use crate::api::GalleryClient;
use crate::cli::watch::{self, WatchOptions};
use crate::core::settings::Settings;
use anyhow::{Context, Result};
use std::path::Path;

pub struct UploadOptions {
    pub watch: bool,
    pub json: bool,
}

pub async fn run(settings: &Settings, file: &Path, options: UploadOptions) -> Result<()> {
    let client = GalleryClient::new(settings)?;
    let image_id = client
        .upload(file)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    if options.json {
        println!(
            "{}",
            serde_json::json!({ "event": "uploaded", "image_id": image_id, "path": file })
        );
    } else {
        println!("Uploaded {} as {image_id}", file.display());
    }

    if options.watch {
        watch::run(
            settings,
            WatchOptions {
                json: options.json,
                until_settled: true,
            },
        )
        .await?;
    }

    Ok(())
}
