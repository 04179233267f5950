use std::time::Duration;

use tokio::process::Command;
use tokio::signal::unix::SignalKind;

use crate::prelude::FutureTimeout;
use crate::signal::SignalHandler;

#[tokio::test]
async fn test_signal() {
	let mut handler = SignalHandler::new()
		.with_signal(SignalKind::interrupt())
		.expect("failed to register SIGINT")
		.with_signal(SignalKind::terminate())
		.expect("failed to register SIGTERM");

	let pid = std::process::id();

	Command::new("kill")
		.arg("-s")
		.arg("SIGINT")
		.arg(pid.to_string())
		.status()
		.await
		.expect("failed to send SIGINT");

	let kind = handler
		.recv()
		.timeout(Duration::from_secs(1))
		.await
		.expect("failed to receive signal");
	assert_eq!(kind, Some(SignalKind::interrupt()));

	Command::new("kill")
		.arg("-s")
		.arg("SIGTERM")
		.arg(pid.to_string())
		.status()
		.await
		.expect("failed to send SIGTERM");

	let kind = handler
		.recv()
		.timeout(Duration::from_secs(1))
		.await
		.expect("failed to receive signal");
	assert_eq!(kind, Some(SignalKind::terminate()));
}
