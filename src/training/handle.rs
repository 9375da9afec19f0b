use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{model::Sequential, Result, VisErr};

/// A running training task.
///
/// Awaiting the handle yields the trained predictor, `Cancelled` if
/// [`TrainingHandle::cancel`] got there first, or the task's error.
#[derive(Debug)]
pub struct TrainingHandle {
    token: CancellationToken,
    handle: JoinHandle<Result<Sequential>>,
}

impl TrainingHandle {
    pub fn new(token: CancellationToken, handle: JoinHandle<Result<Sequential>>) -> Self {
        Self { token, handle }
    }

    /// Asks the task to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to end.
    pub async fn join(self) -> Result<Sequential> {
        self.await
    }
}

impl Future for TrainingHandle {
    type Output = Result<Sequential>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let cancelled = self.token.is_cancelled();

        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(Ok(_)) if cancelled => Err(VisErr::Cancelled),
            Ok(res) => res,
            Err(e) if e.is_cancelled() => Err(VisErr::Cancelled),
            Err(e) => Err(VisErr::TrainingFailed(format!("training task panicked: {e}"))),
        })
    }
}
