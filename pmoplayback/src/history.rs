//! Historique des lectures

use chrono::{Duration, Utc};
use pmolibrary::{Library, PlayRecord, Track, User};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Ramène la durée jouée dans `[0, length]` (borne haute seulement si connue)
pub fn clamp_played(seconds: f64, length: Option<f64>) -> f64 {
    let seconds = if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    };
    match length {
        Some(length) if length.is_finite() && length > 0.0 => seconds.min(length),
        _ => seconds,
    }
}

/// Construit l'entrée d'historique d'une lecture qui vient de se terminer
pub fn play_record(user: &User, track: &Track, seconds_played: f64) -> PlayRecord {
    let played = clamp_played(seconds_played, track.known_length());
    let ended = Utc::now();
    let started = ended - Duration::milliseconds((played * 1000.0).round() as i64);
    PlayRecord {
        track_id: track.id,
        user_id: user.id.clone(),
        started,
        ended,
    }
}

/// Enregistre la lecture en arrière-plan ; les utilisateurs anonymes sont ignorés
pub(crate) fn record_async(
    runtime: &Handle,
    library: Arc<dyn Library>,
    user: &User,
    track: &Track,
    seconds_played: f64,
) {
    if user.is_anonymous() {
        return;
    }
    let record = play_record(user, track, seconds_played);
    runtime.spawn_blocking(move || {
        if let Err(e) = library.record_play(&record) {
            tracing::warn!(track_id = record.track_id, error = %e, "Failed to record play history");
            return;
        }
        if let Err(e) = library.increment_plays(record.track_id) {
            tracing::warn!(track_id = record.track_id, error = %e, "Failed to update play counter");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_played() {
        assert_eq!(clamp_played(-5.0, Some(180.0)), 0.0);
        assert_eq!(clamp_played(200.0, Some(180.0)), 180.0);
        assert_eq!(clamp_played(42.0, Some(180.0)), 42.0);
        assert_eq!(clamp_played(200.0, None), 200.0);
        assert_eq!(clamp_played(f64::NAN, Some(180.0)), 0.0);
        // Une durée nulle n'est pas une durée connue
        assert_eq!(clamp_played(12.0, Some(0.0)), 12.0);
    }
}
