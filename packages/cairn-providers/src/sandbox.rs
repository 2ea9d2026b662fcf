//! Isolated hosts for an inference worker. The engine reaches a sandbox only through the request
//! and reply channels; nothing else is shared.

use std::{process::Stdio, sync::Arc, time::Duration};

use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
	process::{Child, Command},
	sync::mpsc,
	task::{JoinHandle, JoinSet},
	time,
};

use crate::{
	Error, InferenceBackend, Result,
	protocol::{WorkerReply, WorkerRequest},
};

pub struct SandboxChannels {
	pub requests: mpsc::UnboundedSender<WorkerRequest>,
	pub replies: mpsc::UnboundedReceiver<WorkerReply>,
	pub handle: SandboxHandle,
}

pub enum SandboxHandle {
	Task(JoinHandle<()>),
	Process { child: Child, io: Vec<JoinHandle<()>> },
}
impl SandboxHandle {
	/// Waits up to `grace` for the worker to exit on its own, then forces it down.
	pub async fn shutdown(self, grace: Duration) {
		match self {
			Self::Task(mut task) =>
				if time::timeout(grace, &mut task).await.is_err() {
					tracing::debug!("Inference task ignored unload. Aborting.");
					task.abort();
				},
			Self::Process { mut child, io } => {
				match time::timeout(grace, child.wait()).await {
					Ok(Ok(status)) => tracing::debug!(%status, "Inference process exited."),
					Ok(Err(err)) => tracing::warn!(error = %err, "Failed to wait for inference process."),
					Err(_) => {
						tracing::debug!("Inference process ignored unload. Killing.");

						if let Err(err) = child.kill().await {
							tracing::warn!(error = %err, "Failed to kill inference process.");
						}
					},
				}

				for task in io {
					task.abort();
				}
			},
		}
	}
}

/// Hosts `backend` on its own task. Embed requests run concurrently, so replies can arrive out of
/// order.
pub fn spawn_task(backend: Arc<dyn InferenceBackend>) -> SandboxChannels {
	let (request_tx, mut request_rx) = mpsc::unbounded_channel();
	let (reply_tx, reply_rx) = mpsc::unbounded_channel();
	let task = tokio::spawn(async move {
		let mut inflight = JoinSet::new();

		while let Some(request) = request_rx.recv().await {
			match request {
				WorkerRequest::Init => {
					let reply = match backend.load().await {
						Ok(()) => WorkerReply::Ready,
						Err(err) => WorkerReply::InitFailed { message: err.to_string() },
					};
					let _ = reply_tx.send(reply);
				},
				WorkerRequest::Embed { id, texts } => {
					let backend = backend.clone();
					let reply_tx = reply_tx.clone();

					inflight.spawn(async move {
						let reply = match backend.embed(&texts).await {
							Ok(vectors) => WorkerReply::Embedded { id, vectors },
							Err(err) => WorkerReply::Failed { id, message: err.to_string() },
						};
						let _ = reply_tx.send(reply);
					});
				},
				WorkerRequest::Unload => {
					inflight.abort_all();

					if let Err(err) = backend.unload().await {
						tracing::warn!(error = %err, "Failed to unload inference backend.");
					}

					break;
				},
			}

			while inflight.try_join_next().is_some() {}
		}
	});

	SandboxChannels { requests: request_tx, replies: reply_rx, handle: SandboxHandle::Task(task) }
}

/// Starts `program` as a child process speaking newline-delimited JSON on stdin and stdout.
pub fn spawn_process(program: &str, args: &[String]) -> Result<SandboxChannels> {
	let mut child = Command::new(program)
		.args(args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::inherit())
		.kill_on_drop(true)
		.spawn()?;
	let mut stdin = child.stdin.take().ok_or_else(|| Error::InvalidConfig {
		message: "Inference process stdin is unavailable.".to_string(),
	})?;
	let stdout = child.stdout.take().ok_or_else(|| Error::InvalidConfig {
		message: "Inference process stdout is unavailable.".to_string(),
	})?;
	let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WorkerRequest>();
	let (reply_tx, reply_rx) = mpsc::unbounded_channel();
	let writer = tokio::spawn(async move {
		while let Some(request) = request_rx.recv().await {
			let mut line = match serde_json::to_string(&request) {
				Ok(line) => line,
				Err(err) => {
					tracing::error!(error = %err, "Failed to encode worker request.");

					continue;
				},
			};

			line.push('\n');

			if let Err(err) = stdin.write_all(line.as_bytes()).await {
				tracing::warn!(error = %err, "Inference process stdin closed.");

				break;
			}
			if let Err(err) = stdin.flush().await {
				tracing::warn!(error = %err, "Failed to flush inference process stdin.");

				break;
			}
		}
	});
	let reader = tokio::spawn(async move {
		let mut lines = BufReader::new(stdout).lines();

		loop {
			match lines.next_line().await {
				Ok(Some(line)) => {
					if line.trim().is_empty() {
						continue;
					}

					match serde_json::from_str::<WorkerReply>(&line) {
						Ok(reply) =>
							if reply_tx.send(reply).is_err() {
								break;
							},
						Err(err) => {
							tracing::debug!(error = %err, "Ignoring unparseable worker output.");
						},
					}
				},
				Ok(None) => break,
				Err(err) => {
					tracing::warn!(error = %err, "Failed to read inference process stdout.");

					break;
				},
			}
		}
	});

	Ok(SandboxChannels {
		requests: request_tx,
		replies: reply_rx,
		handle: SandboxHandle::Process { child, io: vec![writer, reader] },
	})
}
