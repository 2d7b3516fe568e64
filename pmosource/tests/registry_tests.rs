use async_trait::async_trait;
use pmocache::RepositoryManager;
use pmolibrary::{Community, Library, SqliteLibrary};
use pmosource::{
    Candidate, ErrorKind, Origin, SourceError, SourceRegistry, StreamOpener, TrackSource,
};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tempfile::TempDir;

struct BytesOpener(Vec<u8>);

impl StreamOpener for BytesOpener {
    fn open(&self) -> pmosource::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.0.clone())))
    }
}

struct StaticSource {
    id: &'static str,
    priority: i32,
    origin: Origin,
    fail: bool,
}

#[async_trait]
impl TrackSource for StaticSource {
    fn id(&self) -> &str {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn find(&self, _community: &Community, url: &str) -> pmosource::Result<Option<Candidate>> {
        if self.fail {
            return Err(SourceError::Process("boom".to_string()));
        }
        Ok(Some(Candidate {
            origin: self.origin,
            name: format!("{} from {}", url, self.id),
            length: Some(60.0),
            opener: Arc::new(BytesOpener(self.id.as_bytes().to_vec())),
        }))
    }
}

fn source(id: &'static str, priority: i32, origin: Origin) -> Arc<dyn TrackSource> {
    Arc::new(StaticSource {
        id,
        priority,
        origin,
        fail: false,
    })
}

struct Fixture {
    _dir: TempDir,
    library: Arc<SqliteLibrary>,
    registry: SourceRegistry,
    community: Community,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
    let repo = library
        .create_repository("local", "file", Some(dir.path().to_str().unwrap()), None)
        .unwrap();
    let community = library.create_community("lobby", repo.id).unwrap();
    let manager = Arc::new(RepositoryManager::new(library.clone(), dir.path()));
    let registry = SourceRegistry::new(library.clone(), manager);
    Fixture {
        _dir: dir,
        library,
        registry,
        community,
    }
}

const URL: &str = "https://example.com/a.ogg";

#[tokio::test]
async fn test_find_without_sources_is_not_found_with_url() {
    let f = fixture();
    let err = f.registry.find(&f.community, URL).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains(URL));
}

#[tokio::test]
async fn test_failing_source_is_treated_as_absent() {
    let f = fixture();
    f.registry
        .register(Arc::new(StaticSource {
            id: "broken",
            priority: 100,
            origin: Origin::Remote,
            fail: true,
        }))
        .await;
    f.registry.register(source("ok", 1, Origin::Remote)).await;

    let result = f.registry.find(&f.community, URL).await.unwrap();
    assert_eq!(result.source_id(), "ok");
}

#[tokio::test]
async fn test_remote_ranking_prefers_priority_then_local() {
    let f = fixture();
    f.registry.register(source("low", 1, Origin::Remote)).await;
    f.registry.register(source("remote", 5, Origin::Remote)).await;
    f.registry.register(source("mirror", 5, Origin::Local)).await;

    let result = f.registry.find_remote(&f.community, URL).await.unwrap().unwrap();
    assert_eq!(result.source_id(), "mirror");
    assert_eq!(result.priority(), 5);
}

#[tokio::test]
async fn test_remote_result_creates_track_lazily() {
    let f = fixture();
    f.registry.register(source("remote", 1, Origin::Remote)).await;

    let result = f.registry.find(&f.community, URL).await.unwrap();
    assert!(!result.is_local());
    assert!(f.library.find_track(f.community.id, URL).unwrap().is_none());

    let track = result.track().unwrap().clone();
    assert_eq!(track.length, Some(60.0));
    assert_eq!(
        f.library.find_track(f.community.id, URL).unwrap(),
        Some(track.clone())
    );
    // Second accès : même ligne
    assert_eq!(result.track().unwrap().id, track.id);

    let mut bytes = Vec::new();
    result.open().unwrap().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, b"remote");
}

#[tokio::test]
async fn test_local_result_when_resource_exists() {
    let f = fixture();
    f.registry.register(source("remote", 1, Origin::Remote)).await;
    let track = f
        .library
        .create_track(f.community.id, URL, "A", Some(10.0))
        .unwrap();

    let repository = f.registry.repositories().for_community(&f.community).unwrap();
    let resource = repository.resource_for_url(URL);
    resource.open_write().unwrap().write_all(b"cached").unwrap();
    f.library
        .create_track_file(track.id, repository.config().id, resource.uuid())
        .unwrap();

    let result = f.registry.find(&f.community, URL).await.unwrap();
    assert!(result.is_local());
    assert_eq!(result.track().unwrap().id, track.id);

    let mut bytes = Vec::new();
    result.open().unwrap().read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, b"cached");
}

#[tokio::test]
async fn test_missing_resource_falls_through_to_remote() {
    let f = fixture();
    f.registry.register(source("remote", 1, Origin::Remote)).await;
    let track = f.library.create_track(f.community.id, URL, "A", None).unwrap();
    let repository = f.registry.repositories().for_community(&f.community).unwrap();
    f.library
        .create_track_file(track.id, repository.config().id, pmocache::resource_uuid(URL))
        .unwrap();

    assert!(f.registry.find_local(&f.community, URL).unwrap().is_none());
    let result = f.registry.find(&f.community, URL).await.unwrap();
    assert_eq!(result.source_id(), "remote");
    assert_eq!(result.track().unwrap().id, track.id);
}

#[tokio::test]
async fn test_deleted_track_is_not_resolved() {
    let f = fixture();
    f.registry.register(source("remote", 1, Origin::Remote)).await;
    let track = f.library.create_track(f.community.id, URL, "A", None).unwrap();
    f.library.set_deleted(track.id, true).unwrap();

    let err = f.registry.find(&f.community, URL).await.unwrap_err();
    assert!(matches!(err, SourceError::Deleted(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
