use anyhow::{anyhow, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Renders one announcement to audio, blocking until playback completes.
pub trait Speaker {
    fn speak(&mut self, text: &str) -> Result<()>;
}

enum Signal {
    Announce(String),
    Shutdown,
}

/// FIFO handoff from the frame loop to a dedicated speech worker.
///
/// The producer never blocks; the worker renders each message fully before
/// dequeuing the next, so a burst of announcements queues instead of
/// interrupting. The `Shutdown` sentinel is the only designed termination
/// path: the worker observes it at its next dequeue and exits, and
/// [`AnnouncementChannel::shutdown`] joins it.
pub struct AnnouncementChannel {
    sender: Sender<Signal>,
    worker: Option<JoinHandle<()>>,
}

impl AnnouncementChannel {
    /// Spawn the speech worker. The speaker is constructed inside the worker
    /// thread (audio handles are not generally movable across threads), so a
    /// factory is taken instead of a value.
    pub fn start<S, F>(make_speaker: F) -> Result<Self>
    where
        S: Speaker + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let (sender, receiver) = unbounded();

        let worker = std::thread::Builder::new()
            .name("announcer".to_string())
            .spawn(move || {
                let speaker = match make_speaker() {
                    Ok(speaker) => Some(speaker),
                    Err(e) => {
                        error!("Speech output unavailable, announcements will be dropped: {}", e);
                        None
                    }
                };
                run_worker(receiver, speaker);
            })
            .map_err(|e| anyhow!("Failed to spawn announcer thread: {}", e))?;

        info!("Announcement channel started");
        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// Non-blocking enqueue. Delivery is best-effort: the worker may lag
    /// behind real time when synthesis is slow.
    pub fn announce(&self, message: String) {
        if self.sender.send(Signal::Announce(message)).is_err() {
            warn!("Announcement dropped: speech worker is gone");
        }
    }

    /// Send the sentinel and join the worker. Every message enqueued before
    /// this call is rendered first; the channel preserves submission order.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.sender.send(Signal::Shutdown);
        worker
            .join()
            .map_err(|_| anyhow!("Announcer thread panicked"))?;
        info!("Announcement channel shut down");
        Ok(())
    }
}

impl Drop for AnnouncementChannel {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.shutdown();
        }
    }
}

fn run_worker(receiver: Receiver<Signal>, mut speaker: Option<impl Speaker>) {
    // Adjacent-duplicate suppression on the consumer side as well, in case a
    // producer bug lets a repeat through.
    let mut last_rendered: Option<String> = None;

    loop {
        match receiver.recv() {
            Ok(Signal::Announce(message)) => {
                if last_rendered.as_deref() == Some(message.as_str()) {
                    debug!("Worker skipped adjacent duplicate announcement");
                    continue;
                }
                if let Some(speaker) = speaker.as_mut() {
                    if let Err(e) = speaker.speak(&message) {
                        error!("Speech rendering failed: {}", e);
                    }
                }
                // The dedup key advances even when synthesis fails; a broken
                // engine is not retried with the same text.
                last_rendered = Some(message);
            }
            Ok(Signal::Shutdown) => {
                debug!("Announcer received shutdown sentinel");
                break;
            }
            Err(_) => {
                // All senders dropped without a sentinel; treat as shutdown.
                warn!("Announcement channel disconnected");
                break;
            }
        }
    }
}

/// Speaker double that records instead of rendering. Used by the test suites;
/// also handy for running the pipeline on machines with no audio stack.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    transcript: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().clone()
    }
}

impl Speaker for RecordingSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.transcript.lock().push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_rendered_in_submission_order() {
        let speaker = RecordingSpeaker::new();
        let handle = speaker.clone();
        let mut channel = AnnouncementChannel::start(move || Ok(handle)).unwrap();

        channel.announce("first".to_string());
        channel.announce("second".to_string());
        channel.announce("third".to_string());
        channel.shutdown().unwrap();

        assert_eq!(speaker.transcript(), vec!["first", "second", "third"]);
    }

    #[test]
    fn adjacent_duplicates_are_suppressed_by_the_worker() {
        let speaker = RecordingSpeaker::new();
        let handle = speaker.clone();
        let mut channel = AnnouncementChannel::start(move || Ok(handle)).unwrap();

        channel.announce("watch out".to_string());
        channel.announce("watch out".to_string());
        channel.announce("all clear".to_string());
        channel.announce("watch out".to_string());
        channel.shutdown().unwrap();

        assert_eq!(
            speaker.transcript(),
            vec!["watch out", "all clear", "watch out"]
        );
    }

    #[test]
    fn sentinel_terminates_worker_and_join_completes() {
        let speaker = RecordingSpeaker::new();
        let handle = speaker.clone();
        let mut channel = AnnouncementChannel::start(move || Ok(handle)).unwrap();

        channel.announce("before shutdown".to_string());
        // Must not deadlock: the worker exits at its next dequeue
        channel.shutdown().unwrap();
        assert_eq!(speaker.transcript(), vec!["before shutdown"]);

        // A second shutdown is a no-op
        channel.shutdown().unwrap();
    }

    #[test]
    fn failed_speaker_construction_still_drains_and_joins() {
        let mut channel =
            AnnouncementChannel::start(|| -> Result<RecordingSpeaker> { Err(anyhow!("no audio")) })
                .unwrap();
        channel.announce("lost".to_string());
        channel.shutdown().unwrap();
    }
}
