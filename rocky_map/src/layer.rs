//! Common layer identity and lifecycle.
//!
//! The original design's deep layer hierarchy is flattened: every layer kind
//! embeds a [`LayerCore`] for identity, status, and revision, and talks to its
//! data source through the narrow [`ImageSource`] seam. Polymorphism is
//! limited to the open/close/read/write contract.

use parking_lot::RwLock;
use rocky_core::{ErrorKind, IoControl, IoResult, Profile, Signal, Status, TileKey};
use rocky_image::GeoImage;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Monotonic data-model revision.
pub type Revision = i32;

static NEXT_UID: AtomicU32 = AtomicU32::new(1);

/// Allocates a process-unique layer UID.
#[must_use]
pub fn next_uid() -> u32 {
	NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

/// The open/close/read seam implemented by data-source drivers.
///
/// `open` reports the source's authoritative tiling profile; `fetch_image`
/// reads one tile expressed in that profile.
pub trait ImageSource: Send + Sync {
	/// Opens the source, returning its authoritative profile on success.
	fn open(&mut self, io: &IoControl) -> Result<Profile, rocky_core::Error>;

	/// Releases any resources. Default: nothing to release.
	fn close(&mut self) {}

	/// Fetches one tile in the source's own profile.
	fn fetch_image(&self, key: &TileKey, io: &IoControl) -> IoResult<GeoImage>;

	/// Writes one tile back to the source. Sources are read-only by default.
	fn write_image(&self, _key: &TileKey, _image: &GeoImage, _io: &IoControl) -> Status {
		Status::error(ErrorKind::ServiceUnavailable, "source does not support writes")
	}
}

/// Identity, status, and revision state shared by every layer.
///
/// Invariants: `is_open() ⇔ status().is_ok()`, and the revision increases
/// monotonically across every mutation observable to consumers.
pub struct LayerCore {
	uid: u32,
	name: String,
	attribution: RwLock<String>,
	revision: AtomicI32,
	status: RwLock<Status>,
	opening: AtomicBool,
	closing: AtomicBool,
	/// Fired with the layer UID after a successful open, outside all locks.
	pub on_opened: Signal<u32>,
	/// Fired with the layer UID after a close, outside all locks.
	pub on_closed: Signal<u32>,
}

impl LayerCore {
	#[must_use]
	pub fn new(name: impl Into<String>) -> LayerCore {
		LayerCore {
			uid: next_uid(),
			name: name.into(),
			attribution: RwLock::new(String::new()),
			revision: AtomicI32::new(1),
			status: RwLock::new(Status::error(ErrorKind::ResourceUnavailable, "Layer closed")),
			opening: AtomicBool::new(false),
			closing: AtomicBool::new(false),
			on_opened: Signal::new(),
			on_closed: Signal::new(),
		}
	}

	#[must_use]
	pub fn uid(&self) -> u32 {
		self.uid
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn attribution(&self) -> String {
		self.attribution.read().clone()
	}

	pub fn set_attribution(&self, value: impl Into<String>) {
		*self.attribution.write() = value.into();
	}

	/// The revision last published with [`LayerCore::bump_revision`].
	#[must_use]
	pub fn revision(&self) -> Revision {
		self.revision.load(Ordering::SeqCst)
	}

	/// Publishes a mutation to readers. The only way revisions move.
	pub fn bump_revision(&self) -> Revision {
		self.revision.fetch_add(1, Ordering::SeqCst) + 1
	}

	/// The last-set status. Lock-light; treat as a hint from observer code.
	#[must_use]
	pub fn status(&self) -> Status {
		self.status.read().clone()
	}

	pub fn set_status(&self, status: Status) -> Status {
		*self.status.write() = status.clone();
		status
	}

	#[must_use]
	pub fn is_open(&self) -> bool {
		self.status.read().is_ok()
	}

	#[must_use]
	pub fn is_opening(&self) -> bool {
		self.opening.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn is_closing(&self) -> bool {
		self.closing.load(Ordering::SeqCst)
	}

	pub(crate) fn set_opening(&self, value: bool) {
		self.opening.store(value, Ordering::SeqCst);
	}

	pub(crate) fn set_closing(&self, value: bool) {
		self.closing.store(value, Ordering::SeqCst);
	}
}

impl std::fmt::Debug for LayerCore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LayerCore")
			.field("uid", &self.uid)
			.field("name", &self.name)
			.field("revision", &self.revision())
			.field("open", &self.is_open())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uids_are_unique() {
		let a = LayerCore::new("a");
		let b = LayerCore::new("b");
		assert_ne!(a.uid(), b.uid());
	}

	#[test]
	fn starts_closed_with_a_status() {
		let core = LayerCore::new("test");
		assert!(!core.is_open());
		assert_eq!(core.status().error_ref().unwrap().kind, ErrorKind::ResourceUnavailable);
	}

	#[test]
	fn revision_is_monotonic() {
		let core = LayerCore::new("test");
		let mut last = core.revision();
		for _ in 0..10 {
			let next = core.bump_revision();
			assert!(next > last);
			last = next;
		}
	}

	#[test]
	fn open_status_equivalence() {
		let core = LayerCore::new("test");
		core.set_status(Status::ok());
		assert!(core.is_open());
		core.set_status(Status::error(ErrorKind::ServiceUnavailable, "nope"));
		assert!(!core.is_open());
	}
}
