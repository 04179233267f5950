use std::time::Duration;

use crate::context::Context;
use crate::prelude::FutureTimeout;

#[tokio::test]
async fn test_context_cancel() {
	let (ctx, handler) = Context::new();

	let handle = tokio::spawn(async move {
		ctx.done().await;
		assert!(ctx.is_done());
	});

	handler
		.cancel()
		.timeout(Duration::from_millis(300))
		.await
		.expect("task should be cancelled");
	handle
		.timeout(Duration::from_millis(300))
		.await
		.expect("task should be cancelled")
		.expect("panic in task");
}

#[tokio::test]
async fn test_context_is_done_after_drop() {
	let (ctx, handler) = Context::new();

	assert!(!ctx.is_done());
	drop(handler);

	ctx.done().timeout(Duration::from_millis(300)).await.expect("context should be done");
	assert!(ctx.is_done());
}

#[tokio::test]
async fn test_handler_waits_for_clones() {
	let (ctx, handler) = Context::new();
	let clone = ctx.clone();
	drop(ctx);

	let waiter = tokio::spawn(handler.cancel());

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(!waiter.is_finished());
	assert!(clone.is_done());

	drop(clone);
	waiter
		.timeout(Duration::from_millis(300))
		.await
		.expect("handler should finish")
		.expect("panic in task");
}
