//! Source HTTP : URLs pointant directement sur un fichier audio

use crate::{Candidate, Result, StreamOpener, TrackSource};
use async_trait::async_trait;
use pmolibrary::Community;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepte les URL http(s) dont le serveur annonce un contenu audio
#[derive(Debug, Clone)]
pub struct HttpSource {
    priority: i32,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(priority: i32) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HEAD_TIMEOUT).build()?;
        Ok(Self { priority, client })
    }
}

fn is_audio_content_type(value: &str) -> bool {
    let mime = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime.starts_with("audio/") || mime == "application/ogg"
}

/// Dernier segment du chemin, à défaut l'URL entière
pub(crate) fn name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| url.to_string())
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[async_trait]
impl TrackSource for HttpSource {
    fn id(&self) -> &str {
        "http"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn find(&self, _community: &Community, url: &str) -> Result<Option<Candidate>> {
        if !is_http_url(url) {
            return Ok(None);
        }

        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "HEAD request rejected");
            return Ok(None);
        }
        let audio = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_audio_content_type);
        if !audio {
            return Ok(None);
        }

        Ok(Some(Candidate::remote(
            name_from_url(url),
            None,
            Arc::new(HttpOpener {
                url: url.to_string(),
            }),
        )))
    }
}

struct HttpOpener {
    url: String,
}

impl StreamOpener for HttpOpener {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        // Client bloquant : construit dans le thread appelant, hors runtime
        let client = reqwest::blocking::Client::builder().build()?;
        let response = client.get(&self.url).send()?.error_for_status()?;
        tracing::debug!(url = %self.url, length = ?response.content_length(), "Opened HTTP stream");
        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_content_types() {
        assert!(is_audio_content_type("audio/mpeg"));
        assert!(is_audio_content_type("Audio/OGG; codecs=opus"));
        assert!(is_audio_content_type("application/ogg"));
        assert!(!is_audio_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn test_name_from_url() {
        assert_eq!(name_from_url("https://example.com/music/song.ogg"), "song.ogg");
        assert_eq!(name_from_url("https://example.com/"), "https://example.com/");
        assert_eq!(name_from_url("not a url"), "not a url");
    }
}
