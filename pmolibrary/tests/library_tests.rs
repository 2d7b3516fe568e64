use pmolibrary::{DownloadFormat, Library, LibraryError, PlayRecord, SqliteLibrary, TrackUpdate};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

fn library_with_community() -> (SqliteLibrary, i64, i64) {
    let library = SqliteLibrary::open_in_memory().unwrap();
    let repo = library
        .create_repository("local", "file", Some("/tmp/tracks"), None)
        .unwrap();
    let community = library.create_community("lobby", repo.id).unwrap();
    (library, repo.id, community.id)
}

#[test]
fn test_create_track_is_unique_per_community_and_url() {
    let (library, repo_id, community_id) = library_with_community();

    let first = library
        .create_track(community_id, "https://example.com/a.ogg", "A", Some(12.0))
        .unwrap();
    let again = library
        .create_track(community_id, "https://example.com/a.ogg", "Other name", None)
        .unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(again.name, "A");

    let other = library.create_community("other", repo_id).unwrap();
    let elsewhere = library
        .create_track(other.id, "https://example.com/a.ogg", "A", None)
        .unwrap();
    assert_ne!(first.id, elsewhere.id);
}

#[test]
fn test_update_track_counters_and_soft_delete() {
    let (library, _, community_id) = library_with_community();
    let track = library
        .create_track(community_id, "https://example.com/b.ogg", "B", None)
        .unwrap();

    library.increment_plays(track.id).unwrap();
    library.like(track.id).unwrap();
    library.update_track(track.id, TrackUpdate::Length(Some(42.5))).unwrap();
    let updated = library.update_track(track.id, TrackUpdate::Deleted(true)).unwrap();

    assert_eq!(updated.plays, 1);
    assert_eq!(updated.likes, 1);
    assert_eq!(updated.dislikes, 0);
    assert_eq!(updated.length, Some(42.5));
    assert!(updated.deleted);
    assert!(updated.updated >= track.updated);

    // La ligne reste présente
    assert!(library.track(track.id).unwrap().is_some());
}

#[test]
fn test_update_missing_track_is_not_found() {
    let (library, _, _) = library_with_community();
    let err = library.update_track(999, TrackUpdate::Like).unwrap_err();
    assert!(matches!(err, LibraryError::NotFound(_)));
}

#[test]
fn test_track_file_creation_is_idempotent() {
    let (library, repo_id, community_id) = library_with_community();
    let track = library
        .create_track(community_id, "https://example.com/c.ogg", "C", None)
        .unwrap();
    assert!(library.track_file(track.id, repo_id).unwrap().is_none());

    let uuid = Uuid::new_v4();
    let first = library.create_track_file(track.id, repo_id, uuid).unwrap();
    let second = library
        .create_track_file(track.id, repo_id, Uuid::new_v4())
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.uuid, uuid);
}

#[test]
fn test_repository_format_is_persisted() {
    let library = SqliteLibrary::open_in_memory().unwrap();
    let format = DownloadFormat {
        container: "flac".to_string(),
        sample_rate: Some(44100),
        ..Default::default()
    };
    let repo = library
        .create_repository("lossless", "file", Some("/srv/flac"), Some(&format))
        .unwrap();

    let loaded = library.repository(repo.id).unwrap().unwrap();
    assert_eq!(loaded.format, Some(format));
    assert_eq!(library.repositories().unwrap().len(), 1);
}

#[test]
fn test_search_pages_skip_deleted_tracks() {
    let (library, _, community_id) = library_with_community();
    let mut ids = Vec::new();
    for i in 0..5 {
        let t = library
            .create_track(
                community_id,
                &format!("https://example.com/song{}.ogg", i),
                &format!("Song {}", i),
                None,
            )
            .unwrap();
        ids.push(t.id);
    }
    library
        .create_track(community_id, "https://example.com/other.ogg", "Other", None)
        .unwrap();
    library.update_track(ids[2], TrackUpdate::Deleted(true)).unwrap();

    assert_eq!(library.count_tracks(community_id, "song").unwrap(), 4);

    let page = library.search_tracks(community_id, "Song", None, 2).unwrap();
    assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[0], ids[1]]);

    let page = library
        .search_tracks(community_id, "Song", Some(ids[1]), 2)
        .unwrap();
    assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![ids[3], ids[4]]);

    // Les jokers SQL sont pris littéralement
    assert_eq!(library.count_tracks(community_id, "%").unwrap(), 0);
}

#[test]
fn test_play_history_round_trip() {
    let (library, _, community_id) = library_with_community();
    let track = library
        .create_track(community_id, "https://example.com/d.ogg", "D", None)
        .unwrap();
    let now = Utc::now();
    library
        .record_play(&PlayRecord {
            track_id: track.id,
            user_id: "u1".to_string(),
            started: now - chrono::Duration::seconds(30),
            ended: now,
        })
        .unwrap();

    let plays = library.plays(track.id).unwrap();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].user_id, "u1");
    assert_eq!(plays[0].ended.timestamp(), now.timestamp());
}

#[test]
fn test_open_file_database_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("library.db");
    {
        let library = SqliteLibrary::open(&path).unwrap();
        let repo = library.create_repository("r", "null", None, None).unwrap();
        library.create_community("c", repo.id).unwrap();
    }
    let library = SqliteLibrary::open(&path).unwrap();
    assert!(library.community_by_name("c").unwrap().is_some());
}
