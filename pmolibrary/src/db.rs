//! Implémentation SQLite de la bibliothèque
//!
//! Une seule connexion protégée par un `Mutex`, comme pour la base du cache :
//! chaque méthode du trait [`Library`] prend le verrou le temps d'une requête
//! ou d'une transaction courte.

use crate::error::{LibraryError, Result};
use crate::model::*;
use crate::Library;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    location TEXT,
    format_json TEXT
);
CREATE TABLE IF NOT EXISTS communities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    repository_id INTEGER NOT NULL REFERENCES repositories(id)
);
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    community_id INTEGER NOT NULL REFERENCES communities(id),
    url TEXT NOT NULL,
    name TEXT NOT NULL,
    length REAL,
    plays INTEGER NOT NULL DEFAULT 0,
    likes INTEGER NOT NULL DEFAULT 0,
    dislikes INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    UNIQUE (community_id, url)
);
CREATE TABLE IF NOT EXISTS track_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks(id),
    repository_id INTEGER NOT NULL REFERENCES repositories(id),
    uuid TEXT NOT NULL,
    created TEXT NOT NULL,
    UNIQUE (track_id, repository_id)
);
CREATE TABLE IF NOT EXISTS play_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks(id),
    user_id TEXT NOT NULL,
    started TEXT NOT NULL,
    ended TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_play_history_track ON play_history (track_id);
";

const TRACK_COLUMNS: &str =
    "id, community_id, url, name, length, plays, likes, dislikes, deleted, created, updated";

/// Bibliothèque stockée dans une base SQLite
#[derive(Debug)]
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    /// Ouvre (ou crée) la base au chemin donné
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened library database");
        Self::init(conn)
    }

    /// Base éphémère, utile pour les tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LibraryError::Poisoned)
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        community_id: row.get(1)?,
        url: row.get(2)?,
        name: row.get(3)?,
        length: row.get(4)?,
        plays: row.get(5)?,
        likes: row.get(6)?,
        dislikes: row.get(7)?,
        deleted: row.get(8)?,
        created: time_at(row, 9)?,
        updated: time_at(row, 10)?,
    })
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<TrackRepository> {
    let format_json: Option<String> = row.get(4)?;
    let format = match format_json {
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| conversion_error(4, e))?),
        None => None,
    };
    Ok(TrackRepository {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        location: row.get(3)?,
        format,
    })
}

fn track_file_from_row(row: &Row<'_>) -> rusqlite::Result<TrackFile> {
    let raw: String = row.get(3)?;
    Ok(TrackFile {
        id: row.get(0)?,
        track_id: row.get(1)?,
        repository_id: row.get(2)?,
        uuid: Uuid::parse_str(&raw).map_err(|e| conversion_error(3, e))?,
        created: time_at(row, 4)?,
    })
}

/// Motif LIKE littéral (les jokers de la requête sont échappés)
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn select_track(conn: &Connection, id: TrackId) -> Result<Option<Track>> {
    let sql = format!("SELECT {} FROM tracks WHERE id = ?1", TRACK_COLUMNS);
    Ok(conn.query_row(&sql, [id], track_from_row).optional()?)
}

impl Library for SqliteLibrary {
    fn community(&self, id: CommunityId) -> Result<Option<Community>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, repository_id FROM communities WHERE id = ?1",
                [id],
                |row| {
                    Ok(Community {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        repository_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn community_by_name(&self, name: &str) -> Result<Option<Community>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, repository_id FROM communities WHERE name = ?1",
                [name],
                |row| {
                    Ok(Community {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        repository_id: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn create_community(&self, name: &str, repository_id: RepositoryId) -> Result<Community> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO communities (name, repository_id) VALUES (?1, ?2)",
            params![name, repository_id],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(community_id = id, name, repository_id, "Created community");
        Ok(Community {
            id,
            name: name.to_string(),
            repository_id,
        })
    }

    fn repository(&self, id: RepositoryId) -> Result<Option<TrackRepository>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name, kind, location, format_json FROM repositories WHERE id = ?1",
                [id],
                repository_from_row,
            )
            .optional()?)
    }

    fn repositories(&self) -> Result<Vec<TrackRepository>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, kind, location, format_json FROM repositories ORDER BY id")?;
        let rows = stmt.query_map([], repository_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn create_repository(
        &self,
        name: &str,
        kind: &str,
        location: Option<&str>,
        format: Option<&DownloadFormat>,
    ) -> Result<TrackRepository> {
        let format_json = format.map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO repositories (name, kind, location, format_json) VALUES (?1, ?2, ?3, ?4)",
            params![name, kind, location, format_json],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(repository_id = id, name, kind, "Created track repository");
        Ok(TrackRepository {
            id,
            name: name.to_string(),
            kind: kind.to_string(),
            location: location.map(str::to_string),
            format: format.cloned(),
        })
    }

    fn track(&self, id: TrackId) -> Result<Option<Track>> {
        let conn = self.conn()?;
        select_track(&conn, id)
    }

    fn find_track(&self, community_id: CommunityId, url: &str) -> Result<Option<Track>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM tracks WHERE community_id = ?1 AND url = ?2",
            TRACK_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![community_id, url], track_from_row)
            .optional()?)
    }

    fn create_track(
        &self,
        community_id: CommunityId,
        url: &str,
        name: &str,
        length: Option<f64>,
    ) -> Result<Track> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tracks (community_id, url, name, length, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![community_id, url, name, length, now],
        )?;
        if inserted > 0 {
            tracing::debug!(community_id, url, "Created track");
        }

        let sql = format!(
            "SELECT {} FROM tracks WHERE community_id = ?1 AND url = ?2",
            TRACK_COLUMNS
        );
        Ok(conn.query_row(&sql, params![community_id, url], track_from_row)?)
    }

    fn update_track(&self, id: TrackId, update: TrackUpdate) -> Result<Track> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let changed = match &update {
            TrackUpdate::Name(name) => conn.execute(
                "UPDATE tracks SET name = ?1, updated = ?2 WHERE id = ?3",
                params![name, now, id],
            )?,
            TrackUpdate::Length(length) => conn.execute(
                "UPDATE tracks SET length = ?1, updated = ?2 WHERE id = ?3",
                params![length, now, id],
            )?,
            TrackUpdate::IncrementPlays => conn.execute(
                "UPDATE tracks SET plays = plays + 1, updated = ?1 WHERE id = ?2",
                params![now, id],
            )?,
            TrackUpdate::Like => conn.execute(
                "UPDATE tracks SET likes = likes + 1, updated = ?1 WHERE id = ?2",
                params![now, id],
            )?,
            TrackUpdate::Dislike => conn.execute(
                "UPDATE tracks SET dislikes = dislikes + 1, updated = ?1 WHERE id = ?2",
                params![now, id],
            )?,
            TrackUpdate::Deleted(deleted) => conn.execute(
                "UPDATE tracks SET deleted = ?1, updated = ?2 WHERE id = ?3",
                params![deleted, now, id],
            )?,
        };

        if changed == 0 {
            return Err(LibraryError::NotFound(format!("track {}", id)));
        }

        select_track(&conn, id)?.ok_or_else(|| LibraryError::NotFound(format!("track {}", id)))
    }

    fn track_file(
        &self,
        track_id: TrackId,
        repository_id: RepositoryId,
    ) -> Result<Option<TrackFile>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, track_id, repository_id, uuid, created FROM track_files
                 WHERE track_id = ?1 AND repository_id = ?2",
                params![track_id, repository_id],
                track_file_from_row,
            )
            .optional()?)
    }

    fn create_track_file(
        &self,
        track_id: TrackId,
        repository_id: RepositoryId,
        uuid: Uuid,
    ) -> Result<TrackFile> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO track_files (track_id, repository_id, uuid, created)
             VALUES (?1, ?2, ?3, ?4)",
            params![track_id, repository_id, uuid.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(conn.query_row(
            "SELECT id, track_id, repository_id, uuid, created FROM track_files
             WHERE track_id = ?1 AND repository_id = ?2",
            params![track_id, repository_id],
            track_file_from_row,
        )?)
    }

    fn record_play(&self, record: &PlayRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO play_history (track_id, user_id, started, ended) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.track_id,
                record.user_id,
                record.started.to_rfc3339(),
                record.ended.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn plays(&self, track_id: TrackId) -> Result<Vec<PlayRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT track_id, user_id, started, ended FROM play_history
             WHERE track_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([track_id], |row| {
            Ok(PlayRecord {
                track_id: row.get(0)?,
                user_id: row.get(1)?,
                started: time_at(row, 2)?,
                ended: time_at(row, 3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn search_tracks(
        &self,
        community_id: CommunityId,
        query: &str,
        after: Option<TrackId>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM tracks
             WHERE community_id = ?1 AND deleted = 0 AND id > ?2
               AND (name LIKE ?3 ESCAPE '\\' OR url LIKE ?3 ESCAPE '\\')
             ORDER BY id LIMIT ?4",
            TRACK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                community_id,
                after.unwrap_or(0),
                like_pattern(query),
                limit as i64
            ],
            track_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_tracks(&self, community_id: CommunityId, query: &str) -> Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks
             WHERE community_id = ?1 AND deleted = 0
               AND (name LIKE ?2 ESCAPE '\\' OR url LIKE ?2 ESCAPE '\\')",
            params![community_id, like_pattern(query)],
            |row| row.get(0),
        )?;
        u64::try_from(count).map_err(|_| LibraryError::InvalidData(format!("count {}", count)))
    }
}
