use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};

/// A cancellation scope shared by every task of a process.
///
/// Clones are cheap. The owning [`Handler`] cancels all clones at once and
/// can then wait until each of them has been dropped.
#[derive(Clone, Debug)]
pub struct Context {
	token: CancellationToken,
	_tracker: Arc<oneshot::Sender<()>>,
}

impl Context {
	#[must_use]
	pub fn new() -> (Self, Handler) {
		let token = CancellationToken::new();
		let (sender, recv) = oneshot::channel();

		(
			Self {
				token: token.clone(),
				_tracker: Arc::new(sender),
			},
			Handler {
				_guard: token.clone().drop_guard(),
				token,
				recv,
			},
		)
	}

	pub async fn done(&self) {
		self.token.cancelled().await;
	}

	#[must_use]
	pub fn is_done(&self) -> bool {
		self.token.is_cancelled()
	}
}

/// Dropping the handler cancels the context.
pub struct Handler {
	_guard: DropGuard,
	token: CancellationToken,
	recv: oneshot::Receiver<()>,
}

impl Handler {
	/// Resolves once every clone of the context has been dropped.
	pub async fn done(&mut self) {
		let _ = (&mut self.recv).await;
	}

	pub fn cancel_now(&self) {
		self.token.cancel();
	}

	/// Cancels the context and waits for all holders to let go of it.
	pub async fn cancel(mut self) {
		self.token.cancel();
		self.done().await;
	}
}
