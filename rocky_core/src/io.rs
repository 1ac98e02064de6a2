//! The shared I/O envelope: status values, result codes, the `IoResult`
//! wrapper, cooperative cancellation, and the URI reader contract.

use crate::Config;
use std::{
	fmt::{self, Display},
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::{Duration, SystemTime},
};

/// Classification of a failure. Only `AssertionFailure` marks a programming
/// error; everything else leaves the object retryable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	/// A required resource is not available (layer closed, remote missing).
	ResourceUnavailable,
	/// Inconsistent setup, such as a profile mismatch.
	ConfigurationError,
	/// An internal invariant was violated.
	AssertionFailure,
	/// The object cannot satisfy the operation.
	ServiceUnavailable,
	/// Anything else.
	GeneralError,
}

/// An error envelope: a kind plus a human-readable message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
	pub kind: ErrorKind,
	pub message: String,
}

impl Error {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Error {
		Error {
			kind,
			message: message.into(),
		}
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}: {}", self.kind, self.message)
	}
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
	fn from(e: anyhow::Error) -> Error {
		Error::new(ErrorKind::GeneralError, e.to_string())
	}
}

/// The sticky state of a long-lived object such as a layer. `Status::ok()`
/// and `is_open` are equivalent by invariant.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Status(Option<Error>);

impl Status {
	#[must_use]
	pub fn ok() -> Status {
		Status(None)
	}

	pub fn error(kind: ErrorKind, message: impl Into<String>) -> Status {
		Status(Some(Error::new(kind, message)))
	}

	#[must_use]
	pub fn is_ok(&self) -> bool {
		self.0.is_none()
	}

	#[must_use]
	pub fn failed(&self) -> bool {
		self.0.is_some()
	}

	#[must_use]
	pub fn error_ref(&self) -> Option<&Error> {
		self.0.as_ref()
	}
}

impl From<Error> for Status {
	fn from(e: Error) -> Status {
		Status(Some(e))
	}
}

/// Result code carried by every [`IoResult`]. Cancellation is an ordinary
/// code, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoCode {
	Ok,
	Canceled,
	NotFound,
	Expired,
	ServerError,
	Timeout,
	NoReader,
	ReaderError,
	Unknown,
	NotImplemented,
	NotModified,
}

impl IoCode {
	#[must_use]
	pub fn as_str(&self) -> &'static str {
		match self {
			IoCode::Ok => "OK",
			IoCode::Canceled => "Read canceled",
			IoCode::NotFound => "Target not found",
			IoCode::Expired => "Expired",
			IoCode::ServerError => "Server reported error",
			IoCode::Timeout => "Read timed out",
			IoCode::NoReader => "No suitable reader found",
			IoCode::ReaderError => "Reader error",
			IoCode::Unknown => "Unknown error",
			IoCode::NotImplemented => "Not implemented",
			IoCode::NotModified => "Not modified",
		}
	}
}

impl Display for IoCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The uniform return envelope of every read operation.
///
/// Carries the value or an [`Error`], the [`IoCode`], cache provenance, the
/// source's last-modified time, the elapsed duration, and free-form metadata.
#[derive(Clone, Debug)]
pub struct IoResult<T> {
	pub value: Option<T>,
	pub status: Status,
	pub code: IoCode,
	pub last_modified: Option<SystemTime>,
	pub duration: Duration,
	pub from_cache: bool,
	pub metadata: Config,
}

impl<T> IoResult<T> {
	pub fn ok(value: T) -> IoResult<T> {
		IoResult {
			value: Some(value),
			status: Status::ok(),
			code: IoCode::Ok,
			last_modified: None,
			duration: Duration::ZERO,
			from_cache: false,
			metadata: Config::default(),
		}
	}

	/// A value-less result with the given code. The status stays ok: codes are
	/// outcomes, not errors.
	pub fn code(code: IoCode) -> IoResult<T> {
		IoResult {
			value: None,
			status: Status::ok(),
			code,
			last_modified: None,
			duration: Duration::ZERO,
			from_cache: false,
			metadata: Config::default(),
		}
	}

	pub fn canceled() -> IoResult<T> {
		IoResult::code(IoCode::Canceled)
	}

	pub fn not_found() -> IoResult<T> {
		IoResult::code(IoCode::NotFound)
	}

	pub fn error(kind: ErrorKind, message: impl Into<String>) -> IoResult<T> {
		IoResult {
			value: None,
			status: Status::error(kind, message),
			code: IoCode::Unknown,
			last_modified: None,
			duration: Duration::ZERO,
			from_cache: false,
			metadata: Config::default(),
		}
	}

	#[must_use]
	pub fn is_ok(&self) -> bool {
		self.value.is_some()
	}

	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.code == IoCode::Canceled
	}

	#[must_use]
	pub fn value(&self) -> Option<&T> {
		self.value.as_ref()
	}

	#[must_use]
	pub fn into_value(self) -> Option<T> {
		self.value
	}

	pub fn with_last_modified(mut self, t: SystemTime) -> IoResult<T> {
		self.last_modified = Some(t);
		self
	}

	pub fn with_duration(mut self, d: Duration) -> IoResult<T> {
		self.duration = d;
		self
	}

	pub fn with_from_cache(mut self) -> IoResult<T> {
		self.from_cache = true;
		self
	}

	/// Carries everything but the value into an envelope of another type.
	pub fn propagate<U>(self) -> IoResult<U> {
		IoResult {
			value: None,
			status: self.status,
			code: self.code,
			last_modified: self.last_modified,
			duration: self.duration,
			from_cache: self.from_cache,
			metadata: self.metadata,
		}
	}
}

/// Cooperative cancellation flag. Cloning shares the flag; every long-running
/// step re-reads it.
#[derive(Clone, Debug, Default)]
pub struct IoControl {
	canceled: Arc<AtomicBool>,
}

impl IoControl {
	#[must_use]
	pub fn new() -> IoControl {
		IoControl::default()
	}

	pub fn cancel(&self) {
		self.canceled.store(true, Ordering::Relaxed);
	}

	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.canceled.load(Ordering::Relaxed)
	}
}

/// Raw bytes fetched from a URI plus their declared content type.
#[derive(Clone, Debug)]
pub struct Content {
	pub data: Vec<u8>,
	pub content_type: String,
}

/// The collaborator contract for URI access. Implementations live outside the
/// core (HTTP, file system, archives).
pub trait UriReader: Send + Sync {
	fn read_uri(&self, uri: &str, io: &IoControl) -> IoResult<Content>;
}
