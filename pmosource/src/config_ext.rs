//! Extension pmoconfig pour les sources de pistes

use crate::{DownloadSource, HttpSource};
use anyhow::Result;
use pmoconfig::Config;

const DEFAULT_HTTP_PRIORITY: i64 = 10;
const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
const DEFAULT_YTDLP_PRIORITY: i64 = 0;

pub trait SourceConfigExt {
    fn get_http_priority(&self) -> i32;

    fn get_ytdlp_path(&self) -> String;

    fn get_ytdlp_priority(&self) -> i32;

    /// Source HTTP configurée par `sources.http.*`
    fn create_http_source(&self) -> Result<HttpSource>;

    /// Source yt-dlp configurée par `sources.ytdlp.*`
    fn create_download_source(&self) -> DownloadSource;
}

fn clamp_priority(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl SourceConfigExt for Config {
    fn get_http_priority(&self) -> i32 {
        clamp_priority(self.get_i64_or(&["sources", "http", "priority"], DEFAULT_HTTP_PRIORITY))
    }

    fn get_ytdlp_path(&self) -> String {
        self.get_string_or(&["sources", "ytdlp", "path"], DEFAULT_YTDLP_PATH)
    }

    fn get_ytdlp_priority(&self) -> i32 {
        clamp_priority(self.get_i64_or(&["sources", "ytdlp", "priority"], DEFAULT_YTDLP_PRIORITY))
    }

    fn create_http_source(&self) -> Result<HttpSource> {
        Ok(HttpSource::new(self.get_http_priority())?)
    }

    fn create_download_source(&self) -> DownloadSource {
        DownloadSource::new(self.get_ytdlp_path(), self.get_ytdlp_priority())
    }
}
