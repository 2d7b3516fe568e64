mod logs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pmoaudiocache::AudioCacheConfigExt;
use pmocache::{RepositoryConfigExt, Resource};
use pmocodec::SymphoniaCodec;
use pmoconfig::{Config, get_config};
use pmolibrary::{Community, DownloadFormat, Library, LibraryConfigExt, SqliteLibrary};
use pmosource::{Origin, SourceConfigExt, SourceRegistry};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{Level, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pmomusic", about = "Music playback and track cache", version)]
struct Cli {
    /// Log au niveau DEBUG quel que soit `host.logger.min_level`
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crée une communauté et son dépôt
    Init {
        community: String,
        /// Type de dépôt (`file` ou `null`)
        #[arg(long, default_value = "file")]
        kind: String,
    },
    /// Résout une URL vers une piste jouable
    Resolve { community: String, url: String },
    /// Résout une URL puis la met en cache dans le dépôt de la communauté
    Cache { community: String, url: String },
}

struct Services {
    config: Arc<Config>,
    library: Arc<SqliteLibrary>,
    registry: SourceRegistry,
}

impl Services {
    async fn open() -> Result<Self> {
        let config = get_config();
        let library = Arc::new(config.open_library()?);
        let repositories = Arc::new(config.create_repository_manager(library.clone())?);
        let registry = SourceRegistry::new(library.clone(), repositories);

        match config.create_http_source() {
            Ok(source) => registry.register(Arc::new(source)).await,
            Err(e) => warn!(error = %e, "HTTP source disabled"),
        }
        registry
            .register(Arc::new(config.create_download_source()))
            .await;

        Ok(Self {
            config,
            library,
            registry,
        })
    }

    fn community(&self, name: &str) -> Result<Community> {
        self.library
            .community_by_name(name)?
            .with_context(|| format!("Unknown community {}", name))
    }
}

async fn init(community: &str, kind: &str) -> Result<()> {
    let services = Services::open().await?;
    if let Some(existing) = services.library.community_by_name(community)? {
        info!(community = %existing.name, "Community already exists");
        return Ok(());
    }

    let encode = services.config.get_default_format();
    let format = DownloadFormat {
        container: encode.container,
        codec: encode.codec,
        bitrate: encode.bitrate,
        sample_format: encode.sample_format,
        sample_rate: Some(encode.audio.sample_rate),
        channels: Some(encode.audio.channels),
    };
    let repository = services
        .library
        .create_repository(community, kind, None, Some(&format))?;
    let created = services.library.create_community(community, repository.id)?;
    println!(
        "{}",
        serde_json::json!({
            "community": created.id,
            "repository": repository.id,
            "kind": repository.kind,
        })
    );
    Ok(())
}

async fn resolve(community: &str, url: &str) -> Result<()> {
    let services = Services::open().await?;
    let community = services.community(community)?;
    let result = services.registry.find(&community, url).await?;
    let track = result.track()?;
    println!(
        "{}",
        serde_json::json!({
            "source": result.source_id(),
            "local": result.is_local(),
            "priority": result.priority(),
            "uuid": result.uuid().to_string(),
            "track": track,
        })
    );
    Ok(())
}

async fn cache(community: &str, url: &str) -> Result<()> {
    let services = Services::open().await?;
    let community = services.community(community)?;
    let result = Arc::new(services.registry.find(&community, url).await?);
    if result.origin() == Origin::Local {
        println!("{}", result.uuid());
        info!(url, "Track already cached");
        return Ok(());
    }

    let codec = Arc::new(SymphoniaCodec::new());
    let coordinator = services
        .config
        .create_cache_coordinator(services.library.clone(), codec)?;

    let handle = coordinator.cache_async(result.clone())?;
    tokio::select! {
        outcome = handle.wait() => {
            let resource = outcome?;
            info!(url, uuid = %resource.uuid(), "Track cached");
            println!("{}", resource.uuid());
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(url, "Interrupted before the track was cached");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_state = logs::init_logging();
    if cli.verbose {
        log_state.set_max_level(Level::DEBUG);
    }

    let outcome = match &cli.command {
        Command::Init { community, kind } => init(community, kind).await,
        Command::Resolve { community, url } => resolve(community, url).await,
        Command::Cache { community, url } => cache(community, url).await,
    };

    if outcome.is_err() && !get_config().get_log_enable_console().unwrap_or(true) {
        // Console coupée : on restitue au moins les avertissements
        for entry in log_state.dump_at_least(Level::WARN) {
            let secs = entry
                .timestamp
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            eprintln!("[{}] {} {}: {}", secs, entry.level, entry.target, entry.message);
        }
    }
    outcome
}
