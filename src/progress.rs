//! Playback progress tracking and periodic sync to `video_views`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{tables, Backend};
use crate::error::Result;
use crate::models::VideoView;

/// Conflict target keeping one row per (video, user)
pub const VIDEO_VIEW_CONFLICT: &str = "video_id,user_id";

/// Watched share above which a video counts as completed
const COMPLETION_RATIO: f64 = 0.9;

/// Elapsed playback seconds reported by the player
#[derive(Debug, Default)]
pub struct PlaybackTracker {
    elapsed_bits: AtomicU64,
}

impl PlaybackTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Player progress callback; negative and non-finite values are ignored.
    pub fn on_progress(&self, played_seconds: f64) {
        if played_seconds.is_finite() && played_seconds >= 0.0 {
            self.elapsed_bits
                .store(played_seconds.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn elapsed(&self) -> f64 {
        f64::from_bits(self.elapsed_bits.load(Ordering::Relaxed))
    }
}

pub fn is_completed(elapsed: f64, duration_seconds: Option<i32>) -> bool {
    match duration_seconds {
        Some(duration) if duration > 0 => elapsed > COMPLETION_RATIO * f64::from(duration),
        _ => false,
    }
}

/// Row to upsert, or `None` while nothing has been watched
pub fn progress_row(
    video_id: Uuid,
    user_id: Uuid,
    elapsed: f64,
    duration_seconds: Option<i32>,
) -> Option<VideoView> {
    if elapsed <= 0.0 {
        return None;
    }
    Some(VideoView {
        video_id,
        user_id,
        progress_seconds: elapsed.floor() as i64,
        completed: is_completed(elapsed, duration_seconds),
        updated_at: Some(Utc::now()),
    })
}

/// Upsert the current progress once. `Ok(false)` when there was nothing to send.
pub async fn sync_once(
    backend: &Backend,
    video_id: Uuid,
    duration_seconds: Option<i32>,
    elapsed: f64,
) -> Result<bool> {
    let Some(user_id) = backend.current_user_id() else {
        debug!(%video_id, "No session; progress not synced");
        return Ok(false);
    };
    let Some(row) = progress_row(video_id, user_id, elapsed, duration_seconds) else {
        return Ok(false);
    };

    backend
        .from(tables::VIDEO_VIEWS)?
        .upsert(&row, VIDEO_VIEW_CONFLICT)
        .await?;
    debug!(%video_id, progress = row.progress_seconds, completed = row.completed, "Progress synced");
    Ok(true)
}

/// Periodic progress sync for one open video; stops when dropped.
pub struct ProgressSync {
    handle: JoinHandle<()>,
}

impl ProgressSync {
    /// Sync every `progress_sync_interval` from the backend config.
    pub fn start(
        backend: Backend,
        video_id: Uuid,
        duration_seconds: Option<i32>,
        tracker: Arc<PlaybackTracker>,
    ) -> Self {
        let period = backend.config().progress_sync_interval;
        Self::start_with_interval(backend, video_id, duration_seconds, tracker, period)
    }

    pub fn start_with_interval(
        backend: Backend,
        video_id: Uuid,
        duration_seconds: Option<i32>,
        tracker: Arc<PlaybackTracker>,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let elapsed = tracker.elapsed();
                if let Err(e) = sync_once(&backend, video_id, duration_seconds, elapsed).await {
                    warn!(%video_id, error = %e, "Progress sync failed");
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ProgressSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_threshold() {
        assert!(!is_completed(35.0, Some(300)));
        assert!(!is_completed(270.0, Some(300)));
        assert!(is_completed(270.5, Some(300)));
        assert!(!is_completed(500.0, Some(0)));
        assert!(!is_completed(500.0, None));
    }

    #[test]
    fn row_floors_elapsed() {
        let video = Uuid::new_v4();
        let user = Uuid::new_v4();
        let row = progress_row(video, user, 35.8, Some(300)).unwrap();
        assert_eq!(row.progress_seconds, 35);
        assert!(!row.completed);
        assert!(progress_row(video, user, 0.0, Some(300)).is_none());
    }

    #[test]
    fn tracker_ignores_bad_values() {
        let tracker = PlaybackTracker::new();
        tracker.on_progress(12.5);
        tracker.on_progress(-1.0);
        tracker.on_progress(f64::NAN);
        assert_eq!(tracker.elapsed(), 12.5);
    }
}
