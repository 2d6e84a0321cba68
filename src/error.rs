use thiserror::Error;

/// Errors the core can return to the dispatcher's caller (the excluded
/// JSON-RPC front end). Anything below this — decode errors, a single
/// gateway's I/O failure — is handled locally per spec §7 and never
/// surfaces here.
#[derive(Error, Debug)]
pub enum CoreError {
	#[error("gateway I/O error")]
	GatewayIo(#[from] std::io::Error),

	#[error("no bulb matches target")]
	TargetNotFound,

	#[error("query timed out waiting for replies")]
	QueryTimeout,

	#[error("gateway timed out")]
	GatewayTimeout,

	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),

	#[error("invalid command: {0}")]
	InvalidCommand(String),
}
