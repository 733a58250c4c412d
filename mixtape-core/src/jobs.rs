use std::sync::Arc;

use log::warn;
use tokio::sync::{mpsc, Mutex};

use crate::{DownloadRequest, Downloader, RoomStore, VoteKind};

/// Work the engine refuses to block a request on
#[derive(Debug)]
pub enum SideEffect {
    /// Append the song to the host's liked or disliked set
    RecordHostTaste {
        username: String,
        song_id: String,
        kind: VoteKind,
    },
    /// Hand the song to the retrieval service
    DispatchDownload(DownloadRequest),
}

/// A side effect that failed, surfaced on the observation channel
#[derive(Debug)]
pub struct SideEffectFailure {
    pub effect: String,
    pub reason: String,
}

pub type FailureReceiver = mpsc::UnboundedReceiver<SideEffectFailure>;

/// A bounded worker pool running [SideEffect]s detached from the requests
/// that queued them. Effects run at most once and are never retried; failures
/// go to the observation channel instead of the caller.
#[derive(Clone)]
pub struct SideEffects {
    sender: mpsc::Sender<SideEffect>,
}

impl SideEffects {
    const QUEUE_CAPACITY: usize = 64;
    const WORKER_COUNT: usize = 2;

    pub fn spawn<S>(store: Arc<S>, downloader: Arc<dyn Downloader>) -> (Self, FailureReceiver)
    where
        S: RoomStore,
    {
        let (sender, receiver) = mpsc::channel::<SideEffect>(Self::QUEUE_CAPACITY);
        let (failure_sender, failure_receiver) = mpsc::unbounded_channel();

        let receiver = Arc::new(Mutex::new(receiver));

        for _ in 0..Self::WORKER_COUNT {
            let store = store.clone();
            let downloader = downloader.clone();
            let receiver = receiver.clone();
            let failures = failure_sender.clone();

            tokio::spawn(async move {
                loop {
                    let effect = receiver.lock().await.recv().await;

                    let Some(effect) = effect else {
                        break;
                    };

                    let label = effect.describe();

                    if let Err(reason) = run_effect(&*store, &*downloader, effect).await {
                        let _ = failures.send(SideEffectFailure {
                            effect: label,
                            reason,
                        });
                    }
                }
            });
        }

        (Self { sender }, failure_receiver)
    }

    /// Queues the effect without waiting. When the pool is saturated the
    /// effect is dropped, which the at-most-once contract allows.
    pub fn queue(&self, effect: SideEffect) {
        if let Err(e) = self.sender.try_send(effect) {
            warn!("Side effect dropped: {:?}", e.into_inner());
        }
    }
}

impl SideEffect {
    fn describe(&self) -> String {
        match self {
            Self::RecordHostTaste {
                username, song_id, ..
            } => format!("host taste update for {username} on {song_id}"),
            Self::DispatchDownload(request) => {
                format!("download dispatch for {}", request.song_id)
            }
        }
    }
}

async fn run_effect<S>(
    store: &S,
    downloader: &dyn Downloader,
    effect: SideEffect,
) -> Result<(), String>
where
    S: RoomStore,
{
    match effect {
        SideEffect::RecordHostTaste {
            username,
            song_id,
            kind,
        } => store
            .record_song_taste(&username, &song_id, kind)
            .await
            .map_err(|e| e.to_string()),
        SideEffect::DispatchDownload(request) => downloader
            .retrieve(request)
            .await
            .map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::{DownloadError, MemoryStore, NewUser};

    struct FailingDownloader;

    #[async_trait]
    impl Downloader for FailingDownloader {
        async fn retrieve(&self, _request: DownloadRequest) -> Result<(), DownloadError> {
            Err(DownloadError::Unreachable("no route".to_string()))
        }
    }

    fn download_request() -> DownloadRequest {
        DownloadRequest {
            song_id: "song-1".to_string(),
            title: "strawberries".to_string(),
            artist: "unknown artist".to_string(),
            album: "unknown album".to_string(),
        }
    }

    #[tokio::test]
    async fn failures_reach_the_observation_channel() {
        let store = Arc::new(MemoryStore::new());
        let (effects, mut failures) = SideEffects::spawn(store, Arc::new(FailingDownloader));

        effects.queue(SideEffect::DispatchDownload(download_request()));

        let failure = timeout(Duration::from_secs(1), failures.recv())
            .await
            .expect("failure arrives in time")
            .expect("failure is observed");

        assert!(failure.reason.contains("no route"));
    }

    #[tokio::test]
    async fn host_taste_is_recorded() {
        let store = Arc::new(MemoryStore::new());

        store
            .create_user(NewUser {
                username: "alice".to_string(),
                password: "hash".to_string(),
            })
            .await
            .unwrap();
        store.create_user_info("alice").await.unwrap();

        let (effects, _failures) = SideEffects::spawn(store.clone(), Arc::new(FailingDownloader));

        effects.queue(SideEffect::RecordHostTaste {
            username: "alice".to_string(),
            song_id: "song-1".to_string(),
            kind: VoteKind::Likes,
        });

        timeout(Duration::from_secs(1), async {
            loop {
                let info = store.user_info_by_username("alice").await.unwrap();

                if info.liked_songs.iter().any(|s| s == "song-1") {
                    break;
                }

                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("taste is recorded in time");
    }
}
