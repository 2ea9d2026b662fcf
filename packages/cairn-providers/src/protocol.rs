//! Messages exchanged with an inference worker. Over a process boundary each message is one JSON
//! object per line.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
	Init,
	Embed { id: u64, texts: Vec<String> },
	Unload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
	Ready,
	InitFailed { message: String },
	Embedded { id: u64, vectors: Vec<Vec<f32>> },
	Failed { id: u64, message: String },
}
