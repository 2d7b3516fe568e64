use async_trait::async_trait;
use pmocache::RepositoryManager;
use pmocodec::{encode_wav, AudioFormat, SymphoniaCodec};
use pmolibrary::{Community, Library, SqliteLibrary, Track, User};
use pmoplayback::testing::{MockChannel, MockChannelProvider};
use pmoplayback::{Behavior, ErrorKind, Playback, PlayRequest, TrackSelector};
use pmoplaylist::{Music, Playlist, PlaylistBuilder, PlaylistError, TrackQueue};
use pmosource::{Candidate, SourceRegistry, StreamOpener, TrackSource};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const FORMAT: AudioFormat = AudioFormat::new(48_000, 2);

struct WavOpener;

impl StreamOpener for WavOpener {
    fn open(&self) -> pmosource::Result<Box<dyn Read + Send>> {
        let samples = vec![0.25f32; 960];
        Ok(Box::new(Cursor::new(encode_wav(FORMAT, &samples).unwrap())))
    }
}

struct WavSource;

#[async_trait]
impl TrackSource for WavSource {
    fn id(&self) -> &str {
        "wav"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn find(&self, _community: &Community, url: &str) -> pmosource::Result<Option<Candidate>> {
        Ok(Some(Candidate::remote(url, Some(180.0), Arc::new(WavOpener))))
    }
}

struct Fixture {
    _dir: TempDir,
    library: Arc<SqliteLibrary>,
    community: Community,
    channel: Arc<MockChannel>,
    playback: Playback,
    music: Music,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
    let repo = library
        .create_repository("local", "file", Some(dir.path().to_str().unwrap()), None)
        .unwrap();
    let community = library.create_community("lobby", repo.id).unwrap();
    let manager = Arc::new(RepositoryManager::new(library.clone(), dir.path()));
    let registry = SourceRegistry::new(library.clone(), manager);
    registry.register(Arc::new(WavSource)).await;

    let channel = Arc::new(MockChannel::new("ch-lobby", FORMAT, 8));
    let channels = Arc::new(MockChannelProvider::new());
    channels.insert("lobby", channel.clone());

    let playback = Playback::builder(registry, Arc::new(SymphoniaCodec::new()), channels)
        .build()
        .unwrap();
    let music = Music::new(playback.clone());

    Fixture {
        _dir: dir,
        library,
        community,
        channel,
        playback,
        music,
    }
}

impl Fixture {
    fn tracks(&self, names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .map(|name| {
                self.library
                    .create_track(
                        self.community.id,
                        &format!("https://example.com/{}", name),
                        name,
                        Some(180.0),
                    )
                    .unwrap()
            })
            .collect()
    }

    fn playlist(&self, owner: &User, queue: TrackQueue) -> PlaylistBuilder {
        Playlist::builder(
            self.playback.clone(),
            self.community.clone(),
            "lobby",
            owner.clone(),
            queue,
        )
        .allow_cache(false)
    }

    fn bare(&self, user: &User, name: &str) -> PlayRequest {
        PlayRequest::new(
            user.clone(),
            self.community.clone(),
            "lobby",
            TrackSelector::Url(format!("https://example.com/{}", name)),
        )
        .allow_cache(false)
    }
}

fn alice() -> User {
    User::new("alice", "Alice")
}

fn bob() -> User {
    User::new("bob", "Bob")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&Playlist, &Track) + Send + Sync) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    (changes, move |_: &Playlist, track: &Track| {
        sink.lock().unwrap().push(track.name.clone())
    })
}

#[tokio::test]
async fn test_fade_out_advances_playlist_once() {
    let f = fixture().await;
    let tracks = f.tracks(&["one", "two", "three"]);
    let (changes, on_change) = recorder();

    let playlist = f
        .music
        .start_playlist(
            f.playlist(&alice(), TrackQueue::fifo(tracks))
                .on_track_changed(on_change),
        )
        .await
        .unwrap();
    assert!(playlist.is_running());
    assert_eq!(playlist.current().unwrap().name, "one");
    assert_eq!(playlist.remaining(), 2);

    f.channel.playing()[0].fade_out();
    wait_until(|| changes.lock().unwrap().len() == 2).await;
    assert_eq!(*changes.lock().unwrap(), vec!["one", "two"]);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(changes.lock().unwrap().len(), 2);
    assert_eq!(playlist.remaining(), 1);
    assert_eq!(playlist.players().len(), 2);
}

#[tokio::test]
async fn test_second_playlist_on_channel_is_rejected() {
    let f = fixture().await;
    let first = f
        .music
        .start_playlist(f.playlist(&alice(), TrackQueue::looped(f.tracks(&["one"]))))
        .await
        .unwrap();

    let err = f
        .music
        .start_playlist(f.playlist(&bob(), TrackQueue::fifo(f.tracks(&["two"]))))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::AlreadyRunning(_)));
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let registered = f.music.playlist("lobby").unwrap().unwrap();
    assert!(registered.ptr_eq(&first));
    assert_eq!(f.channel.playing().len(), 1);
}

#[tokio::test]
async fn test_exhausted_playlist_stops_and_deregisters() {
    let f = fixture().await;
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = stopped.clone();

    let playlist = f
        .music
        .start_playlist(
            f.playlist(&alice(), TrackQueue::fifo(f.tracks(&["only"])))
                .on_stopped(move |_| flag.store(true, Ordering::SeqCst)),
        )
        .await
        .unwrap();

    f.channel.playing()[0].fade_out();
    wait_until(|| stopped.load(Ordering::SeqCst)).await;
    assert!(!playlist.is_running());
    assert!(f.music.playlist("lobby").unwrap().is_none());

    let err = playlist.next().await.unwrap_err();
    assert!(matches!(err, PlaylistError::NotRunning(_)));
}

#[tokio::test]
async fn test_starting_playlist_stops_bare_playback() {
    let f = fixture().await;
    f.playback.play(f.bare(&alice(), "bare")).await.unwrap();
    f.playback.play(f.bare(&alice(), "queued")).await.unwrap();

    f.music
        .start_playlist(f.playlist(&alice(), TrackQueue::fifo(f.tracks(&["one"]))))
        .await
        .unwrap();

    let players = f.channel.mock_players();
    assert!(players[0].is_finished());
    assert_eq!(f.channel.playing().len(), 1);
    assert!(f.playback.queued("lobby").unwrap().is_empty());
}

#[tokio::test]
async fn test_queued_bare_track_plays_before_playlist_resumes() {
    let f = fixture().await;
    let (changes, on_change) = recorder();
    let playlist = f
        .music
        .start_playlist(
            f.playlist(&alice(), TrackQueue::fifo(f.tracks(&["one", "two"])))
                .on_track_changed(on_change),
        )
        .await
        .unwrap();

    let queued = f.music.play(f.bare(&bob(), "request")).await.unwrap();
    assert!(queued.was_queued());

    // Le fade-out démarre la demande en attente ; la playlist patiente
    f.channel.playing()[0].fade_out();
    wait_until(|| f.channel.playing().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(changes.lock().unwrap().len(), 1);
    assert_eq!(playlist.remaining(), 1);

    // La demande hérite du callback : sa fin relance la playlist
    let request_player = f.channel.mock_players()[1].clone();
    request_player.fade_out();
    wait_until(|| changes.lock().unwrap().len() == 2).await;
    assert_eq!(*changes.lock().unwrap(), vec!["one", "two"]);
}

#[tokio::test]
async fn test_transfer_requires_authority() {
    let f = fixture().await;
    let transfers = Arc::new(Mutex::new(Vec::new()));
    let sink = transfers.clone();
    let playlist = f
        .music
        .start_playlist(
            f.playlist(&alice(), TrackQueue::looped(f.tracks(&["one"])))
                .on_transferred(move |_, from, to| {
                    sink.lock().unwrap().push((from.id.clone(), to.id.clone()))
                }),
        )
        .await
        .unwrap();

    assert!(!f.music.transfer_playlist("lobby", &alice(), alice()).unwrap());

    let err = f.music.transfer_playlist("lobby", &bob(), bob()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert!(f.music.transfer_playlist("lobby", &alice(), bob()).unwrap());
    assert_eq!(playlist.owner(), bob());
    assert_eq!(
        *transfers.lock().unwrap(),
        vec![("alice".to_string(), "bob".to_string())]
    );
}

#[tokio::test]
async fn test_exclusive_bare_play_stops_playlist() {
    let f = fixture().await;
    let playlist = f
        .music
        .start_playlist(f.playlist(&alice(), TrackQueue::looped(f.tracks(&["one"]))))
        .await
        .unwrap();

    let play = f
        .music
        .play(f.bare(&alice(), "solo").behavior(Behavior::Exclusive))
        .await
        .unwrap();
    assert!(!play.was_queued());
    assert!(!playlist.is_running());
    assert!(f.music.playlist("lobby").unwrap().is_none());
    assert_eq!(f.channel.playing().len(), 1);
}

#[tokio::test]
async fn test_failed_advance_stops_playlist() {
    let f = fixture().await;
    let tracks = f.tracks(&["gone"]);
    f.library.set_deleted(tracks[0].id, true).unwrap();

    let err = f
        .music
        .start_playlist(f.playlist(&alice(), TrackQueue::fifo(tracks)))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaylistError::Advance { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(f.music.playlist_count(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let f = fixture().await;
    f.music
        .start_playlist(f.playlist(&alice(), TrackQueue::looped(f.tracks(&["one"]))))
        .await
        .unwrap();
    f.playback
        .play(f.bare(&bob(), "extra").behavior(Behavior::Passive))
        .await
        .unwrap();

    f.music.shutdown();
    assert_eq!(f.music.playlist_count(), 0);
    assert!(f.channel.playing().is_empty());
}
