use crate::testing::{MockChannel, MockChannelProvider};
use crate::*;
use async_trait::async_trait;
use pmoaudiocache::{CacheCoordinator, WorkerPool};
use pmocache::RepositoryManager;
use pmocodec::{
    encode_wav, AudioFormat, Codec, CodecError, EncodeFormat, FrameConsumer, FrameProvider,
    Resampler, SoxrResampler, SymphoniaCodec, WAV_CONTAINER,
};
use pmolibrary::{Community, DownloadFormat, Library, SqliteLibrary, Track, User};
use pmosource::{Candidate, SourceRegistry, StreamOpener, TrackSource};
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const SOURCE_FORMAT: AudioFormat = AudioFormat::new(48_000, 2);
const FRAMES: usize = 4800;

/// Provider WAV dont les fermetures sont comptées
struct TrackedProvider {
    inner: Box<dyn FrameProvider>,
    closes: Arc<AtomicUsize>,
}

impl FrameProvider for TrackedProvider {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn read(&mut self, buffer: &mut [f32]) -> pmocodec::Result<Option<usize>> {
        self.inner.read(buffer)
    }

    fn close(&mut self) -> pmocodec::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}

#[derive(Default)]
struct TrackingCodec {
    opened: AtomicUsize,
    closes: Arc<AtomicUsize>,
    /// Les resamplers ouverts attendent le format de sortie en entrée
    mismatched_resampler: AtomicBool,
}

impl Codec for TrackingCodec {
    fn name(&self) -> &str {
        "tracking"
    }

    fn open_provider(&self, input: Box<dyn Read + Send>) -> pmocodec::Result<Box<dyn FrameProvider>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedProvider {
            inner: SymphoniaCodec::new().open_provider(input)?,
            closes: self.closes.clone(),
        }))
    }

    fn open_consumer(
        &self,
        output: Box<dyn Write + Send>,
        format: &EncodeFormat,
    ) -> pmocodec::Result<Box<dyn FrameConsumer>> {
        SymphoniaCodec::new().open_consumer(output, format)
    }

    fn open_resampler(
        &self,
        input: AudioFormat,
        output: AudioFormat,
        buffer_size: usize,
    ) -> pmocodec::Result<Box<dyn Resampler>> {
        let input = if self.mismatched_resampler.load(Ordering::SeqCst) {
            output
        } else {
            input
        };
        Ok(Box::new(SoxrResampler::new(input, output, buffer_size)?))
    }
}

struct WavOpener(Vec<u8>);

impl StreamOpener for WavOpener {
    fn open(&self) -> pmosource::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.0.clone())))
    }
}

/// Sert un flux WAV pour n'importe quelle URL
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
        let samples: Vec<f32> = (0..FRAMES * 2).map(|i| (i % 50) as f32 / 50.0).collect();
        Ok(Some(Candidate::remote(
            url.rsplit('/').next().unwrap_or(url),
            Some(FRAMES as f64 / 48_000.0),
            Arc::new(WavOpener(encode_wav(SOURCE_FORMAT, &samples).unwrap())),
        )))
    }
}

struct Fixture {
    _dir: TempDir,
    library: Arc<SqliteLibrary>,
    registry: SourceRegistry,
    community: Community,
    codec: Arc<TrackingCodec>,
    channel: Arc<MockChannel>,
    channels: Arc<MockChannelProvider>,
}

async fn fixture(channel_format: AudioFormat, max_queue: usize) -> Fixture {
    let dir = TempDir::new().unwrap();
    let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
    let format = DownloadFormat {
        container: WAV_CONTAINER.to_string(),
        ..Default::default()
    };
    let repo = library
        .create_repository("local", "file", Some(dir.path().to_str().unwrap()), Some(&format))
        .unwrap();
    let community = library.create_community("lobby", repo.id).unwrap();
    let manager = Arc::new(RepositoryManager::new(library.clone(), dir.path()));
    let registry = SourceRegistry::new(library.clone(), manager);
    registry.register(Arc::new(WavSource)).await;

    let channel = Arc::new(MockChannel::new("ch-lobby", channel_format, max_queue));
    let channels = Arc::new(MockChannelProvider::new());
    channels.insert("lobby", channel.clone());

    Fixture {
        _dir: dir,
        library,
        registry,
        community,
        codec: Arc::new(TrackingCodec::default()),
        channel,
        channels,
    }
}

impl Fixture {
    fn builder(&self) -> PlaybackBuilder {
        Playback::builder(self.registry.clone(), self.codec.clone(), self.channels.clone())
    }

    fn playback(&self) -> Playback {
        self.builder().build().unwrap()
    }

    fn request(&self, user: &User, name: &str) -> PlayRequest {
        PlayRequest::new(
            user.clone(),
            self.community.clone(),
            "lobby",
            TrackSelector::Url(format!("https://example.com/{}", name)),
        )
        .allow_cache(false)
    }

    fn closes(&self) -> usize {
        self.codec.closes.load(Ordering::SeqCst)
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

type FadeLog = mpsc::UnboundedReceiver<(Track, Option<Track>)>;

fn fade_recorder() -> (FadeOutCallback, FadeLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: FadeOutCallback = Arc::new(move |ending, next| {
        let _ = tx.send((ending, next));
    });
    (callback, rx)
}

#[tokio::test]
async fn test_queued_play_on_idle_channel_starts() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let mut events = playback.events().subscribe();

    let play = playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    assert!(!play.was_queued());
    assert_eq!(play.channel(), "ch-lobby");
    assert_eq!(play.track().name, "a.wav");
    assert_eq!(f.channel.playing().len(), 1);

    f.channel.playing()[0].fade_in();
    match events.recv().await.unwrap() {
        MusicEvent::TrackStarted { track, conversation, .. } => {
            assert_eq!(track.id, play.track().id);
            assert_eq!(conversation, "lobby");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_busy_channel_queues_and_fade_out_starts_next() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let (callback, mut fades) = fade_recorder();

    let first = playback
        .play(f.request(&alice(), "a.wav").on_fade_out(callback))
        .await
        .unwrap();
    let second = playback.play(f.request(&bob(), "b.wav")).await.unwrap();
    let third = playback.play(f.request(&alice(), "c.wav")).await.unwrap();
    assert!(second.was_queued());
    assert!(third.was_queued());
    // Les flux des lectures en attente sont refermés
    assert_eq!(f.closes(), 2);

    let queued: Vec<_> = playback
        .queued("lobby")
        .unwrap()
        .into_iter()
        .map(|p| p.track.name)
        .collect();
    assert_eq!(queued, vec!["b.wav", "c.wav"]);

    f.channel.playing()[0].fade_out();
    let (ending, next) = tokio::time::timeout(Duration::from_secs(2), fades.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ending.id, first.track().id);
    assert_eq!(next.map(|t| t.id), Some(second.track().id));

    assert_eq!(playback.queued("lobby").unwrap().len(), 1);
    assert_eq!(f.channel.playing().len(), 2);

    // Un second fade-out du même player est sans effet
    f.channel.mock_players()[0].fade_out();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fades.try_recv().is_err());
}

#[tokio::test]
async fn test_fade_out_skips_unplayable_entries() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let mut events = playback.events().subscribe();
    let (callback, mut fades) = fade_recorder();

    playback
        .play(f.request(&alice(), "a.wav").on_fade_out(callback))
        .await
        .unwrap();
    let doomed = playback.play(f.request(&bob(), "b.wav")).await.unwrap();
    let next = playback.play(f.request(&bob(), "c.wav")).await.unwrap();
    f.library.set_deleted(doomed.track().id, true).unwrap();

    f.channel.playing()[0].fade_out();
    let (_, started) = tokio::time::timeout(Duration::from_secs(2), fades.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(started.map(|t| t.id), Some(next.track().id));

    let mut noticed = false;
    while let Ok(event) = events.try_recv() {
        if let MusicEvent::ConversationNotice { conversation, message } = event {
            assert_eq!(conversation, "lobby");
            assert!(message.contains("b.wav"));
            noticed = true;
        }
    }
    assert!(noticed);
}

#[tokio::test]
async fn test_fade_out_with_empty_queue_reports_no_next() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let (callback, mut fades) = fade_recorder();

    let play = playback
        .play(f.request(&alice(), "a.wav").on_fade_out(callback))
        .await
        .unwrap();
    f.channel.playing()[0].fade_out();
    let (ending, next) = tokio::time::timeout(Duration::from_secs(2), fades.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ending.id, play.track().id);
    assert!(next.is_none());
}

#[tokio::test]
async fn test_exclusive_stops_only_authorized_plays() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    playback
        .play(f.request(&bob(), "b.wav").behavior(Behavior::Passive))
        .await
        .unwrap();
    playback
        .play(f.request(&alice(), "c.wav").behavior(Behavior::Exclusive))
        .await
        .unwrap();

    let players = f.channel.mock_players();
    assert!(players[0].is_finished());
    assert!(!players[1].is_finished());
    assert!(!players[2].is_finished());

    let names: Vec<_> = playback
        .active_tracks("lobby")
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["b.wav", "c.wav"]);
}

#[tokio::test]
async fn test_exclusive_with_override_clears_everything() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.builder().authorizer(Arc::new(AllowAll)).build().unwrap();

    playback.play(f.request(&bob(), "a.wav")).await.unwrap();
    playback.play(f.request(&bob(), "b.wav")).await.unwrap();
    playback
        .play(f.request(&alice(), "c.wav").behavior(Behavior::Exclusive))
        .await
        .unwrap();

    assert!(playback.queued("lobby").unwrap().is_empty());
    assert_eq!(f.channel.playing().len(), 1);
    assert_eq!(playback.active_tracks("lobby").unwrap()[0].name, "c.wav");
}

#[tokio::test]
async fn test_exclusive_keeps_queue_when_configured() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f
        .builder()
        .options(PlaybackOptions {
            exclusive_clears_queue: false,
        })
        .build()
        .unwrap();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    playback.play(f.request(&alice(), "b.wav")).await.unwrap();
    playback
        .play(f.request(&alice(), "c.wav").behavior(Behavior::Exclusive))
        .await
        .unwrap();

    assert_eq!(playback.queued("lobby").unwrap().len(), 1);
}

#[tokio::test]
async fn test_skip_requires_authority() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    let err = playback.skip(&bob(), "lobby").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert!(playback.skip(&alice(), "lobby").await.unwrap());
    assert!(f.channel.mock_players()[0].is_finished());
    wait_until(|| playback.active_tracks("lobby").unwrap().is_empty()).await;
    assert!(!playback.skip(&alice(), "lobby").await.unwrap());
}

#[tokio::test]
async fn test_stop_channel_counts_removed_plays() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    playback.play(f.request(&alice(), "b.wav")).await.unwrap();
    playback.play(f.request(&bob(), "c.wav")).await.unwrap();

    assert_eq!(playback.stop_channel(&alice(), "lobby").await.unwrap(), 2);
    // L'entrée de bob prend le canal laissé muet
    assert!(playback.queued("lobby").unwrap().is_empty());
    assert_eq!(active_names(&playback), vec!["c.wav"]);
}

fn active_names(playback: &Playback) -> Vec<String> {
    playback
        .active_tracks("lobby")
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect()
}

fn queued_names(playback: &Playback) -> Vec<String> {
    playback
        .queued("lobby")
        .unwrap()
        .into_iter()
        .map(|p| p.track.name)
        .collect()
}

#[tokio::test]
async fn test_stop_channel_hands_channel_to_queue_head() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let (callback, mut fades) = fade_recorder();

    playback
        .play(f.request(&alice(), "a.wav").on_fade_out(callback))
        .await
        .unwrap();
    let waiting = playback.play(f.request(&bob(), "c.wav")).await.unwrap();
    assert!(waiting.was_queued());

    assert_eq!(playback.stop_channel(&alice(), "lobby").await.unwrap(), 1);
    assert!(f.channel.mock_players()[0].is_finished());
    assert_eq!(active_names(&playback), vec!["c.wav"]);
    assert!(playback.queued("lobby").unwrap().is_empty());

    // Une nouvelle demande d'alice attend derrière la lecture de bob
    let later = playback.play(f.request(&alice(), "d.wav")).await.unwrap();
    assert!(later.was_queued());
    assert_eq!(active_names(&playback), vec!["c.wav"]);
    assert_eq!(queued_names(&playback), vec!["d.wav"]);

    // La lecture reprise hérite du callback de la lecture tuée
    f.channel.playing()[0].fade_out();
    let (ending, next) = tokio::time::timeout(Duration::from_secs(2), fades.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ending.name, "c.wav");
    assert_eq!(next.map(|t| t.name), Some("d.wav".to_string()));
}

#[tokio::test]
async fn test_queued_request_waits_behind_stranded_entries() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    playback.play(f.request(&bob(), "c.wav")).await.unwrap();

    // Le player s'arrête sans fade-out : la file reste en attente
    f.channel.playing()[0].finish(0.05);
    assert!(f.channel.is_idle());
    assert_eq!(queued_names(&playback), vec!["c.wav"]);

    let later = playback.play(f.request(&alice(), "d.wav")).await.unwrap();
    assert!(later.was_queued());
    wait_until(|| active_names(&playback) == vec!["c.wav"]).await;
    assert_eq!(queued_names(&playback), vec!["d.wav"]);
}

#[tokio::test]
async fn test_full_queue_fails_fast_and_closes_stream() {
    let f = fixture(SOURCE_FORMAT, 1).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    playback.play(f.request(&alice(), "b.wav")).await.unwrap();
    let closes = f.closes();

    let err = playback.play(f.request(&alice(), "c.wav")).await.unwrap_err();
    assert!(matches!(err, PlaybackError::QueueFull { capacity: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(f.closes(), closes + 1);
}

#[tokio::test]
async fn test_player_failure_closes_provider() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    f.channel.fail_next_player();
    let err = playback.play(f.request(&alice(), "a.wav")).await.unwrap_err();
    assert!(matches!(err, PlaybackError::Player(_)));
    assert_eq!(f.codec.opened.load(Ordering::SeqCst), 1);
    assert_eq!(f.closes(), 1);
    assert!(playback.active_tracks("lobby").unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_resampler_closes_provider() {
    let f = fixture(AudioFormat::new(44_100, 2), 4).await;
    f.codec.mismatched_resampler.store(true, Ordering::SeqCst);
    let playback = f.playback();

    let err = playback.play(f.request(&alice(), "a.wav")).await.unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::Codec(CodecError::InvalidFormat(_))
    ));
    assert_eq!(f.codec.opened.load(Ordering::SeqCst), 1);
    assert_eq!(f.closes(), 1);
    assert!(f.channel.mock_players().is_empty());
}

#[tokio::test]
async fn test_unknown_conversation_has_no_channel() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    let request = PlayRequest::new(
        alice(),
        f.community.clone(),
        "elsewhere",
        TrackSelector::Url("https://example.com/a.wav".to_string()),
    );
    let err = playback.play(request).await.unwrap_err();
    assert!(matches!(err, PlaybackError::NoChannel(ref c) if c == "elsewhere"));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_remote_play_needs_download_permission() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    let err = playback
        .play(f.request(&alice(), "a.wav").allow_download(false))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::DownloadNotAllowed(_)));
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(f.codec.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_deleted_track_is_not_played() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let url = "https://example.com/gone.wav";
    let track = f.library.create_track(f.community.id, url, "gone", None).unwrap();
    f.library.set_deleted(track.id, true).unwrap();

    let err = playback.play(f.request(&alice(), "gone.wav")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_provider_is_resampled_to_channel_format() {
    let channel_format = AudioFormat::new(44_100, 1);
    let f = fixture(channel_format, 4).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    let player = f.channel.playing()[0].clone();
    assert_eq!(player.format(), channel_format);
    assert!(matches!(player.pull(256).unwrap(), Some(n) if n > 0));
}

#[tokio::test]
async fn test_finished_play_is_recorded() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    let play = playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    let track_id = play.track().id;
    // Au-delà de la durée de la piste : borné
    f.channel.playing()[0].finish(60.0);

    wait_until(|| f.library.track(track_id).unwrap().unwrap().plays == 1).await;
    let plays = f.library.plays(track_id).unwrap();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].user_id, "alice");
    let elapsed = (plays[0].ended - plays[0].started).num_milliseconds();
    assert_eq!(elapsed, 100);
}

#[tokio::test]
async fn test_anonymous_play_is_not_recorded() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();
    let mut events = playback.events().subscribe();

    let play = playback
        .play(f.request(&User::anonymous(), "a.wav"))
        .await
        .unwrap();
    f.channel.playing()[0].finish(0.05);

    match events.recv().await.unwrap() {
        MusicEvent::TrackFinished { seconds, .. } => assert_eq!(seconds, 0.05),
        other => panic!("unexpected event {:?}", other),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(f.library.plays(play.track().id).unwrap().is_empty());
    assert_eq!(f.library.track(play.track().id).unwrap().unwrap().plays, 0);
}

#[tokio::test]
async fn test_remote_play_is_cached_alongside() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let coordinator = Arc::new(CacheCoordinator::new(
        f.library.clone(),
        Arc::new(SymphoniaCodec::new()),
        WorkerPool::fixed(1),
        256,
        EncodeFormat::new(WAV_CONTAINER, SOURCE_FORMAT),
    ));
    let events = EventBus::default();
    let _forwarder = events.forward_cache_events(&coordinator);
    let mut downloads = events.subscribe();
    let playback = f
        .builder()
        .cache(coordinator.clone())
        .events(events)
        .build()
        .unwrap();

    let play = playback
        .play(f.request(&alice(), "a.wav").allow_cache(true))
        .await
        .unwrap();

    let downloaded = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(MusicEvent::TrackDownloaded { track_id, .. }) = downloads.recv().await {
                return track_id;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(downloaded, play.track().id);

    let local = f
        .registry
        .find(&f.community, "https://example.com/a.wav")
        .await
        .unwrap();
    assert!(local.is_local());
}

#[tokio::test]
async fn test_kill_all_empties_channels() {
    let f = fixture(SOURCE_FORMAT, 4).await;
    let playback = f.playback();

    playback.play(f.request(&alice(), "a.wav")).await.unwrap();
    playback.play(f.request(&bob(), "b.wav")).await.unwrap();

    assert_eq!(playback.kill_all(), 1);
    assert!(playback.queued("lobby").unwrap().is_empty());
    assert!(f.channel.playing().is_empty());
}

#[test]
fn test_build_outside_runtime_fails() {
    let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(RepositoryManager::new(library.clone(), dir.path()));
    let registry = SourceRegistry::new(library, manager);
    let channels = Arc::new(MockChannelProvider::new());

    let err = Playback::builder(registry, Arc::new(SymphoniaCodec::new()), channels)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, PlaybackError::Runtime(_)));
}

#[test]
fn test_closed_error_keeps_primary_kind() {
    let err = PlaybackError::Closed {
        primary: Box::new(PlaybackError::DownloadNotAllowed("u".to_string())),
        close_error: CodecError::Closed,
    };
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[allow(dead_code)]
fn assert_send_sync() {
    fn check<T: Send + Sync>() {}
    check::<Playback>();
}
