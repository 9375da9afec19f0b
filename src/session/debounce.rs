use std::time::Duration;

use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

/// Width and height of the drawing area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800.,
            height: 600.,
        }
    }
}

/// Coalesces bursts of resize events into the last one.
///
/// [`ViewportDebouncer::settled`] is cancel safe, so it can sit in a `select!`
/// loop: a pending quiet window survives the future being dropped.
#[derive(Debug)]
pub struct ViewportDebouncer {
    tx: watch::Sender<Viewport>,
    rx: watch::Receiver<Viewport>,
    quiet: Duration,
    deadline: Option<Instant>,
}

impl ViewportDebouncer {
    /// Creates a new `ViewportDebouncer`.
    ///
    /// # Arguments
    /// * `initial` - The viewport before any resize.
    /// * `quiet` - How long no resize must arrive before the last one is yielded.
    pub fn new(initial: Viewport, quiet: Duration) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self {
            tx,
            rx,
            quiet,
            deadline: None,
        }
    }

    /// Records a resize, replacing any earlier one that hasn't settled yet.
    pub fn push(&self, viewport: Viewport) {
        self.tx.send_replace(viewport);
    }

    /// Returns a sender other tasks can push resizes through.
    pub fn sender(&self) -> watch::Sender<Viewport> {
        self.tx.clone()
    }

    /// Returns the latest pushed viewport, settled or not.
    pub fn latest(&self) -> Viewport {
        *self.tx.borrow()
    }

    /// Waits until a resize was pushed and none followed for the quiet window.
    ///
    /// # Returns
    /// The last pushed viewport.
    pub async fn settled(&mut self) -> Viewport {
        loop {
            match self.deadline {
                None => {
                    // The sender lives in `self`, this never errors.
                    let _ = self.rx.changed().await;
                    self.deadline = Some(Instant::now() + self.quiet);
                }
                Some(deadline) => {
                    tokio::select! {
                        _ = self.rx.changed() => {
                            self.deadline = Some(Instant::now() + self.quiet);
                        }
                        _ = sleep_until(deadline) => {
                            self.deadline = None;
                            return *self.rx.borrow_and_update();
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{advance, timeout};

    use super::*;

    fn viewport(width: f64) -> Viewport {
        Viewport {
            width,
            height: 100.,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_to_the_last_size() {
        let mut debouncer = ViewportDebouncer::new(Viewport::default(), Duration::from_millis(50));

        debouncer.push(viewport(100.));
        debouncer.push(viewport(200.));
        debouncer.push(viewport(300.));

        assert_eq!(debouncer.settled().await, viewport(300.));
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_resize_restarts_the_window() {
        let mut debouncer = ViewportDebouncer::new(Viewport::default(), Duration::from_millis(50));
        let tx = debouncer.sender();

        tokio::spawn(async move {
            for width in [100., 200., 300.] {
                tx.send_replace(viewport(width));
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
        });

        let start = Instant::now();
        assert_eq!(debouncer.settled().await, viewport(300.));
        assert!(start.elapsed() >= Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_window_survives_cancellation() {
        let mut debouncer = ViewportDebouncer::new(Viewport::default(), Duration::from_millis(50));
        debouncer.push(viewport(640.));

        assert!(timeout(Duration::from_millis(10), debouncer.settled()).await.is_err());
        advance(Duration::from_millis(60)).await;

        assert_eq!(debouncer.settled().await, viewport(640.));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_pushed_means_nothing_settles() {
        let mut debouncer = ViewportDebouncer::new(Viewport::default(), Duration::from_millis(50));
        assert!(timeout(Duration::from_secs(5), debouncer.settled()).await.is_err());
    }
}
