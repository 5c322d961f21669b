use crate::api::{ApiError, GalleryClient};
use crate::core::models::{AnalysisSummary, ImageResults, ImageStatus, ScoredName};
use crate::core::settings::Settings;
use anyhow::{Context, Result};

pub struct ResultsOptions {
    pub json: bool,
    pub wait: bool,
    pub open: bool,
}

pub async fn run(settings: &Settings, image_id: &str, options: ResultsOptions) -> Result<()> {
    let client = GalleryClient::new(settings)?;
    let mut results = client
        .fetch_results(image_id)
        .await
        .with_context(|| format!("Failed to load analysis results for {image_id}"))?;

    if options.wait && !results.status.is_terminal() {
        results = wait_for_analysis(&client, settings, results).await?;
    }

    if options.open {
        match &results.image_url {
            Some(url) => {
                tracing::info!(image_id, "Opening image");
                if let Err(e) = open::that(url) {
                    tracing::error!(error = %e, "Failed to open browser");
                }
            }
            None => tracing::warn!(image_id, "Image has no preview URL"),
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", render_results(&results));
    }

    Ok(())
}

async fn wait_for_analysis(
    client: &GalleryClient,
    settings: &Settings,
    mut results: ImageResults,
) -> Result<ImageResults> {
    let mut interval = tokio::time::interval(settings.polling.results_interval());
    interval.tick().await;

    while !results.status.is_terminal() {
        tracing::info!(
            image_id = %results.image_id,
            status = results.status.label(),
            "Waiting for analysis to finish"
        );
        interval.tick().await;

        match client.fetch_results(&results.image_id).await {
            Ok(fresh) => results = fresh,
            Err(e @ (ApiError::Auth(_) | ApiError::NotFound(_))) => {
                return Err(e).context("Stopped waiting for analysis");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll analysis results, retrying");
            }
        }
    }

    Ok(results)
}

fn format_scored(items: &[ScoredName]) -> String {
    items
        .iter()
        .map(|item| {
            let name = item.name.as_deref().unwrap_or("unknown");
            match item.confidence {
                Some(confidence) => format!("{name} ({confidence:.1}%)"),
                None => name.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_summary(summary: &AnalysisSummary, out: &mut String) {
    if !summary.top_labels.is_empty() {
        out.push_str(&format!(
            "  Objects & scenes: {}\n",
            format_scored(&summary.top_labels)
        ));
    }

    match summary.face_count {
        Some(0) => out.push_str("  Faces: none detected\n"),
        Some(count) => {
            out.push_str(&format!("  Faces: {count} detected\n"));
            if let Some(emotion) = &summary.primary_emotion {
                out.push_str(&format!("    Main emotion: {emotion}\n"));
            }
            if let Some(range) = summary.age_range {
                out.push_str(&format!(
                    "    Age range: {} - {} years\n",
                    range.low, range.high
                ));
            }
        }
        None => {}
    }

    let celebrities = summary
        .celebrity_count
        .unwrap_or(summary.recognized_celebrities.len() as u32);
    if celebrities > 0 {
        out.push_str(&format!("  Celebrities: {celebrities} recognized"));
        if !summary.recognized_celebrities.is_empty() {
            out.push_str(&format!(
                " ({})",
                format_scored(&summary.recognized_celebrities)
            ));
        }
        out.push('\n');
    }

    if summary.has_text == Some(true) {
        match &summary.text_snippet {
            Some(snippet) => out.push_str(&format!("  Text: {snippet}\n")),
            None => out.push_str("  Text: detected\n"),
        }
    }

    match summary.is_safe {
        Some(true) => out.push_str("  Moderation: no inappropriate content detected\n"),
        Some(false) => out.push_str(&format!(
            "  Moderation: flagged ({})\n",
            format_scored(&summary.moderation_issues)
        )),
        None => {}
    }
}

fn render_results(results: &ImageResults) -> String {
    let mut out = format!(
        "{} ({})\nStatus: {}\n",
        results.file_name,
        results.image_id,
        match results.status {
            ImageStatus::Pending => "Pending Analysis",
            ImageStatus::Processing => "Analysis in Progress...",
            ImageStatus::Completed => "Analysis Complete",
            ImageStatus::Failed => "Analysis Failed",
        }
    );

    if results.status != ImageStatus::Completed {
        return out;
    }

    match &results.results.summary {
        Some(summary) => {
            out.push_str("Summary:\n");
            render_summary(summary, &mut out);
        }
        None => out.push_str("No analysis summary available\n"),
    }

    out
}
