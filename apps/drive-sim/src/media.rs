use std::time::Duration;

use drive_core::{AudioSource, EndedTx, MediaBackend, MediaError, MediaHandle};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Stand-in audio output: every clip "plays" for a fixed length of wall time
/// and the transitions are logged.
pub struct LogMediaBackend {
    clip: Duration,
}

impl LogMediaBackend {
    pub fn new(clip: Duration) -> Self {
        Self { clip }
    }
}

#[async_trait::async_trait]
impl MediaBackend for LogMediaBackend {
    async fn open(
        &self,
        source: AudioSource,
        session: Uuid,
        ended: EndedTx,
    ) -> Result<Box<dyn MediaHandle>, MediaError> {
        let label = match &source {
            AudioSource::Blob(b) => format!("blob ({} bytes)", b.len()),
            AudioSource::Url(u) => u.clone(),
        };
        info!(%session, source = %label, "media opened");
        Ok(Box::new(LogHandle {
            session,
            clip: self.clip,
            remaining: self.clip,
            started: None,
            timer: None,
            ended,
        }))
    }
}

struct LogHandle {
    session: Uuid,
    clip: Duration,
    remaining: Duration,
    started: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    ended: EndedTx,
}

impl LogHandle {
    fn start_timer(&mut self) {
        let (tx, session, after) = (self.ended.clone(), self.session, self.remaining);
        self.started = Some(Instant::now());
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(session);
        }));
    }

    fn stop_timer(&mut self) {
        if let Some(t) = self.timer.take() {
            t.abort();
        }
        if let Some(at) = self.started.take() {
            self.remaining = self.remaining.saturating_sub(at.elapsed());
        }
    }
}

#[async_trait::async_trait]
impl MediaHandle for LogHandle {
    async fn play(&mut self) -> Result<(), MediaError> {
        info!(session = %self.session, secs = self.remaining.as_secs_f64(), "playing");
        self.start_timer();
        Ok(())
    }

    fn pause(&mut self) {
        self.stop_timer();
        info!(session = %self.session, "paused");
    }

    fn resume(&mut self) {
        if self.timer.is_none() {
            self.start_timer();
            info!(session = %self.session, "resumed");
        }
    }

    fn rewind(&mut self) {
        self.remaining = self.clip;
    }

    fn set_volume(&mut self, volume: f32) {
        info!(session = %self.session, volume, "volume");
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        self.stop_timer();
        info!(session = %self.session, "media released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(clip_secs: u64) -> (Box<dyn MediaHandle>, drive_core::EndedRx, Uuid) {
        let (tx, rx) = drive_core::ended_channel();
        let id = Uuid::new_v4();
        let h = LogMediaBackend::new(Duration::from_secs(clip_secs))
            .open(AudioSource::Url("https://cdn.example/a.mp3".into()), id, tx)
            .await
            .unwrap();
        (h, rx, id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_clip_signals_end() {
        let (mut h, mut rx, id) = open(20).await;
        h.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_the_clock() {
        let (mut h, mut rx, id) = open(20).await;
        h.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;
        h.pause();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        h.resume();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rx.try_recv().unwrap(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_silences() {
        let (mut h, mut rx, _) = open(5).await;
        h.play().await.unwrap();
        drop(h);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
