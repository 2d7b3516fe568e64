//! Frontière avec le mixeur audio
//!
//! Le mixeur, ses canaux et ses players sont fournis par l'hôte. Le cœur de
//! lecture ne fait que leur confier des providers et réagir aux callbacks de
//! cycle de vie.

use futures::future::BoxFuture;
use pmocodec::{AudioFormat, FrameProvider};
use pmolibrary::User;
use std::sync::Arc;

/// Échec de création d'un player
///
/// Le provider est rendu à l'appelant quand le canal ne l'a pas consommé,
/// pour qu'il puisse le fermer.
pub struct PlayerError {
    pub reason: String,
    pub provider: Option<Box<dyn FrameProvider>>,
}

impl PlayerError {
    pub fn new(reason: impl Into<String>, provider: Option<Box<dyn FrameProvider>>) -> Self {
        Self {
            reason: reason.into(),
            provider,
        }
    }
}

impl std::fmt::Debug for PlayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerError")
            .field("reason", &self.reason)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

/// Callbacks déclenchés par le player (jamais interrogés)
pub trait PlayerListener: Send + Sync {
    /// Le son devient audible
    fn on_fade_in(&self);

    /// La piste entame sa sortie : c'est le moment de choisir la suivante
    fn on_fade_out(&self);

    /// Lecture terminée après `seconds_played` secondes
    fn on_finished(&self, seconds_played: f64);
}

/// Lecture en cours sur un canal
pub trait Player: Send + Sync {
    fn id(&self) -> u64;

    /// Arrêt progressif (déclenche le fade-out)
    fn stop(&self);

    /// Arrêt immédiat
    fn kill(&self);

    /// Futur résolu quand le player a terminé, quelle qu'en soit la raison
    fn completion(&self) -> BoxFuture<'static, ()>;
}

/// Sortie audio partagée d'une conversation
pub trait Channel: Send + Sync {
    fn id(&self) -> &str;

    /// Format du mixeur
    fn format(&self) -> AudioFormat;

    /// Taille du buffer du mixeur, en frames
    fn buffer_size(&self) -> usize;

    /// Capacité de la file d'attente du canal
    fn max_queue_size(&self) -> usize;

    fn is_idle(&self) -> bool;

    fn players(&self) -> Vec<Arc<dyn Player>>;

    /// Crée un player, l'ajoute au canal et le démarre
    fn create_player(
        &self,
        provider: Box<dyn FrameProvider>,
        listener: Arc<dyn PlayerListener>,
    ) -> std::result::Result<Arc<dyn Player>, PlayerError>;
}

/// Accès aux canaux par conversation
pub trait ChannelProvider: Send + Sync {
    fn channel(&self, conversation: &str) -> Option<Arc<dyn Channel>>;
}

/// Permission d'agir sur les lectures des autres utilisateurs
pub trait Authorizer: Send + Sync {
    fn can_override(&self, user: &User, channel: &str) -> bool;
}

/// Chacun ne contrôle que ses propres lectures
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerOnly;

impl Authorizer for OwnerOnly {
    fn can_override(&self, _user: &User, _channel: &str) -> bool {
        false
    }
}

/// Tout le monde peut tout arrêter
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can_override(&self, _user: &User, _channel: &str) -> bool {
        true
    }
}
