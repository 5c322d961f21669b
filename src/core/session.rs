use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

const DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(200);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id_token: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
}

impl Session {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from {}", path.display()))?;

        let session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file {}", path.display()))?;
        Ok(Some(session))
    }

    /// Expiry taken from the token's `exp` claim, if it is a JWT carrying one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let payload = self.id_token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: TokenClaims = serde_json::from_slice(&bytes).ok()?;
        Utc.timestamp_opt(claims.exp?, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

pub struct SessionWatcher {
    _watcher: RecommendedWatcher,
}

impl SessionWatcher {
    /// Watches the session file's directory and reports (debounced) writes to the file.
    pub fn start(path: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<()>)> {
        let (async_tx, async_rx) = mpsc::unbounded_channel::<()>();
        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<()>();

        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .context("Session path has no parent directory")?;
        let file_name = path
            .file_name()
            .map(|f| f.to_os_string())
            .context("Session path has no file name")?;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else {
                    return;
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    let _ = notify_tx.send(());
                }
            },
            Config::default(),
        )?;

        if parent.exists() {
            watcher
                .watch(&parent, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;
            tracing::info!(?parent, "Watching session directory");
        } else {
            tracing::warn!(?parent, "Session directory does not exist, skipping watch");
        }

        tokio::spawn(async move {
            while notify_rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while notify_rx.try_recv().is_ok() {}

                tracing::info!("Session file changed on disk");
                if async_tx.send(()).is_err() {
                    break;
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}
