//! Consumer side of a streaming comparison.

use std::pin::Pin;
use std::task::{Context, Poll};

use arena_protocol::StreamFrame;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Ordered frames of one streaming call.
///
/// Each model contributes its deltas and exactly one `complete` event; a
/// single [`StreamFrame::Done`] ends the stream. Dropping the stream cancels
/// every model still running.
pub struct ComparisonStream {
  receiver: mpsc::Receiver<StreamFrame>,
  cancel: CancellationToken,
  units: Vec<CancellationToken>,
  _guard: DropGuard,
}

impl ComparisonStream {
  pub(crate) fn new(
    receiver: mpsc::Receiver<StreamFrame>,
    cancel: CancellationToken,
    units: Vec<CancellationToken>,
  ) -> Self {
    let guard = cancel.clone().drop_guard();
    Self {
      receiver,
      cancel,
      units,
      _guard: guard,
    }
  }

  /// Next frame, or `None` after the channel closed.
  pub async fn recv(&mut self) -> Option<StreamFrame> {
    self.receiver.recv().await
  }

  /// Cancels the whole call. Models still running finish as cancelled, and
  /// the stream still ends with their completes and `Done`, so keep draining.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// Cancels one model entry by request index. Returns false for an unknown
  /// index.
  pub fn cancel_model(&self, index: usize) -> bool {
    match self.units.get(index) {
      Some(token) => {
        token.cancel();
        true
      }
      None => false,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Drains every frame up to and including `Done`.
  pub async fn collect_frames(mut self) -> Vec<StreamFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = self.recv().await {
      let done = frame.is_done();
      frames.push(frame);
      if done {
        break;
      }
    }
    frames
  }
}

impl Stream for ComparisonStream {
  type Item = StreamFrame;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.get_mut().receiver.poll_recv(cx)
  }
}

impl std::fmt::Debug for ComparisonStream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ComparisonStream")
      .field("models", &self.units.len())
      .field("cancelled", &self.cancel.is_cancelled())
      .finish()
  }
}
