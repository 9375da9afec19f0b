use std::{collections::BTreeMap, time::Duration};

use log::{debug, warn};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

use super::{AnimationPlan, ConnectionPulse, TimedStep};

/// How many frames may wait for a slow consumer.
const FRAME_BUFFER: usize = 64;

/// What a running playback hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Everything scheduled for the same instant.
    Frame {
        at_ms: u64,
        steps: Vec<TimedStep>,
        pulses: Vec<ConnectionPulse>,
    },
    /// The last transition of the plan ended.
    Finished,
}

struct Playback {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Plays [`AnimationPlan`]s on the tokio clock, one at a time.
#[derive(Default)]
pub struct AnimationPlayer {
    current: Option<Playback>,
}

impl AnimationPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts playing `plan`, first cancelling and awaiting whatever was playing.
    ///
    /// # Returns
    /// The receiving end of the new playback's frames. It closes without a
    /// `Finished` event if the playback gets superseded.
    pub async fn play(&mut self, plan: AnimationPlan) -> mpsc::Receiver<PlaybackEvent> {
        self.stop().await;

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(plan, token.clone(), tx));

        self.current = Some(Playback { token, handle });
        rx
    }

    /// Cancels the current playback, if any, and waits for it to wind down.
    pub async fn stop(&mut self) {
        let Some(playback) = self.current.take() else {
            return;
        };

        playback.token.cancel();
        if let Err(e) = playback.handle.await {
            warn!("animation playback ended abnormally: {e}");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }
}

impl Drop for AnimationPlayer {
    fn drop(&mut self) {
        if let Some(playback) = &self.current {
            playback.token.cancel();
        }
    }
}

type Frame = (Vec<TimedStep>, Vec<ConnectionPulse>);

/// Groups steps and pulses by the instant they're scheduled at.
fn frames(plan: &AnimationPlan) -> BTreeMap<u64, Frame> {
    let mut frames: BTreeMap<u64, Frame> = BTreeMap::new();

    for step in &plan.steps {
        frames.entry(step.at_ms).or_default().0.push(*step);
    }
    for pulse in &plan.pulses {
        frames.entry(pulse.at_ms).or_default().1.push(*pulse);
    }

    frames
}

async fn run(plan: AnimationPlan, token: CancellationToken, tx: mpsc::Sender<PlaybackEvent>) {
    let start = Instant::now();
    let frames = frames(&plan);
    debug!("playing {} frames over {} ms", frames.len(), plan.total_ms);

    for (at_ms, (steps, pulses)) in frames {
        let event = PlaybackEvent::Frame {
            at_ms,
            steps,
            pulses,
        };

        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!(at_ms = at_ms; "playback cancelled");
                return;
            }
            sent = async {
                sleep_until(start + Duration::from_millis(at_ms)).await;
                tx.send(event).await
            } => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }

    tokio::select! {
        biased;

        _ = token.cancelled() => {}
        _ = sleep_until(start + Duration::from_millis(plan.total_ms)) => {
            let _ = tx.send(PlaybackEvent::Finished).await;
        }
    }
}
