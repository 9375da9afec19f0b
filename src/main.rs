use std::{env, fs, path::Path};

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};
use tokio::{signal, sync::mpsc};

use neural_network_visualization::{
    animation::{AnimationPlayer, PlaybackEvent},
    config::load_config,
    dataset::load_csv,
    session::{Session, SessionCommand, SessionEvent, SessionOptions},
    training::LocalTrainer,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(csv_path) = args.next() else {
        bail!("usage: neural-network-visualization <dataset.csv> [config.json]");
    };

    let text = fs::read_to_string(&csv_path).with_context(|| format!("reading {csv_path}"))?;
    let name = Path::new(&csv_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_path.clone());
    let dataset = load_csv(&name, &text)?;

    let (mut session, mut events) =
        Session::new(SessionOptions::default(), Box::new(LocalTrainer::new()));
    let (tx, rx) = mpsc::channel(16);

    tx.send(SessionCommand::LoadDataset(dataset)).await?;
    if let Some(config_path) = args.next() {
        let config = load_config(&config_path).with_context(|| format!("loading {config_path}"))?;
        tx.send(SessionCommand::ReplaceConfig(config)).await?;
    }
    tx.send(SessionCommand::StartTraining).await?;

    let runner = tokio::spawn(async move { session.run(rx).await });
    let mut player = AnimationPlayer::new();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                warn!("interrupted, cancelling training");
                tx.send(SessionCommand::CancelTraining).await?;
                break;
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                if handle_event(event, &mut player).await {
                    break;
                }
            }
        }
    }

    player.stop().await;
    tx.send(SessionCommand::Shutdown).await?;
    runner.await?;
    Ok(())
}

/// Logs a session event, returns whether the run is over.
async fn handle_event(event: SessionEvent, player: &mut AnimationPlayer) -> bool {
    match event {
        SessionEvent::TopologyChanged(topology) => info!("topology: {:?}", topology.sizes()),
        SessionEvent::LayoutChanged(layout) => debug!(
            "layout: {} neurons, {} connections",
            layout.positions().count(),
            layout.connections.len()
        ),
        SessionEvent::ConfigChanged(config) => debug!("config: {config:?}"),
        SessionEvent::EpochCompleted { epoch, metrics, .. } => info!(
            "epoch {epoch}: loss={:.4} acc={:.3} val_loss={:?}",
            metrics.loss, metrics.accuracy, metrics.val_loss
        ),
        SessionEvent::Activations {
            epoch,
            snapshot,
            plan,
            ..
        } => {
            info!(
                "activations for sample {:?} (epoch {epoch:?}): output {:?}",
                snapshot.sample_index,
                snapshot.output().map(|o| o.to_vec())
            );
            let frames = player.play(plan).await;
            tokio::spawn(log_frames(frames));
        }
        SessionEvent::BackwardPlanned { plan, .. } => {
            debug!("backward plan of {} ms", plan.total_ms)
        }
        SessionEvent::TrainingFinished { epochs, .. } => {
            info!("training finished after {epochs} epochs");
            return true;
        }
        SessionEvent::TrainingCancelled { generation } => {
            warn!("training of generation {generation} cancelled")
        }
        SessionEvent::Failed {
            message,
            recoverable,
        } => {
            if !recoverable {
                error!("{message}");
                return true;
            }
            warn!("{message}");
        }
        SessionEvent::Status(message) => debug!("{message}"),
    }

    false
}

async fn log_frames(mut frames: mpsc::Receiver<PlaybackEvent>) {
    while let Some(event) = frames.recv().await {
        match event {
            PlaybackEvent::Frame {
                at_ms,
                steps,
                pulses,
            } => debug!(at_ms = at_ms; "{} neurons, {} connections", steps.len(), pulses.len()),
            PlaybackEvent::Finished => debug!("animation finished"),
        }
    }
}
