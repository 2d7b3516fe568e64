//! Source adossée à l'outil `yt-dlp`
//!
//! Les métadonnées sont obtenues par `--dump-single-json` ; l'audio est lu
//! sur la sortie standard d'un second processus.

use crate::http::{is_http_url, name_from_url};
use crate::{Candidate, Result, SourceError, StreamOpener, TrackSource};
use async_trait::async_trait;
use pmolibrary::Community;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Metadata {
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    is_live: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct DownloadSource {
    binary: PathBuf,
    priority: i32,
}

impl DownloadSource {
    pub fn new(binary: impl Into<PathBuf>, priority: i32) -> Self {
        Self {
            binary: binary.into(),
            priority,
        }
    }
}

fn parse_metadata(raw: &[u8]) -> Result<Metadata> {
    serde_json::from_slice(raw).map_err(|e| SourceError::InvalidMetadata(e.to_string()))
}

#[async_trait]
impl TrackSource for DownloadSource {
    fn id(&self) -> &str {
        "ytdlp"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn find(&self, _community: &Community, url: &str) -> Result<Option<Candidate>> {
        if !is_http_url(url) {
            return Ok(None);
        }

        let output = tokio::process::Command::new(&self.binary)
            .args(["--dump-single-json", "--no-playlist", "--quiet", "--", url])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(SourceError::Process(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let metadata = parse_metadata(&output.stdout)?;
        // Un direct n'a pas de durée : on ne le met jamais en cache
        let length = if metadata.is_live == Some(true) {
            None
        } else {
            metadata.duration
        };

        Ok(Some(Candidate::remote(
            metadata.title.unwrap_or_else(|| name_from_url(url)),
            length,
            Arc::new(DownloadOpener {
                binary: self.binary.clone(),
                url: url.to_string(),
            }),
        )))
    }
}

struct DownloadOpener {
    binary: PathBuf,
    url: String,
}

impl StreamOpener for DownloadOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let mut child = Command::new(&self.binary)
            .args(["-f", "bestaudio/best", "--no-playlist", "--quiet", "-o", "-", "--"])
            .arg(&self.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Process("yt-dlp stdout unavailable".to_string()))?;
        tracing::debug!(url = %self.url, pid = child.id(), "Spawned yt-dlp download");
        Ok(Box::new(ProcessReader { child, stdout }))
    }
}

/// Sortie standard d'un processus, tué s'il est encore vivant à la fermeture
struct ProcessReader {
    child: Child,
    stdout: ChildStdout,
}

impl Read for ProcessReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::other(format!("yt-dlp exited with {}", status)));
            }
        }
        Ok(n)
    }
}

impl Drop for ProcessReader {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
