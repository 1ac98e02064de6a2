//! Cache usage policy values.

use crate::Config;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How a cache may participate in a read path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheUsage {
	/// Read from and write to the cache when one exists.
	#[default]
	ReadWrite,
	/// Treat the cache as the only source of data.
	CacheOnly,
	/// Read from the cache but never write new data to it.
	ReadOnly,
	/// Neither read from nor write to the cache.
	NoCache,
}

/// Advisory caching policy: a usage mode plus freshness bounds.
///
/// # Examples
///
/// ```
/// use rocky_core::{CachePolicy, CacheUsage};
/// use std::time::{Duration, SystemTime};
///
/// let policy = CachePolicy {
///     usage: CacheUsage::ReadWrite,
///     max_age: Some(Duration::from_secs(60)),
///     min_time: None,
/// };
/// assert!(policy.is_readable());
/// assert!(policy.is_expired(SystemTime::now() - Duration::from_secs(120)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CachePolicy {
	pub usage: CacheUsage,
	/// Oldest acceptable age of a cache record.
	pub max_age: Option<Duration>,
	/// Absolute floor on acceptable record timestamps.
	pub min_time: Option<SystemTime>,
}

impl CachePolicy {
	#[must_use]
	pub fn no_cache() -> CachePolicy {
		CachePolicy {
			usage: CacheUsage::NoCache,
			..CachePolicy::default()
		}
	}

	#[must_use]
	pub fn cache_only() -> CachePolicy {
		CachePolicy {
			usage: CacheUsage::CacheOnly,
			..CachePolicy::default()
		}
	}

	#[must_use]
	pub fn is_readable(&self) -> bool {
		matches!(self.usage, CacheUsage::ReadWrite | CacheUsage::CacheOnly | CacheUsage::ReadOnly)
	}

	#[must_use]
	pub fn is_writeable(&self) -> bool {
		self.usage == CacheUsage::ReadWrite
	}

	#[must_use]
	pub fn is_cache_only(&self) -> bool {
		self.usage == CacheUsage::CacheOnly
	}

	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.is_readable() || self.is_writeable()
	}

	/// The oldest timestamp this policy will accept from a cache record.
	#[must_use]
	pub fn min_accept_time(&self) -> SystemTime {
		let mut floor = self.min_time.unwrap_or(UNIX_EPOCH);
		if let Some(age) = self.max_age {
			let aged = SystemTime::now().checked_sub(age).unwrap_or(UNIX_EPOCH);
			if aged > floor {
				floor = aged;
			}
		}
		floor
	}

	/// Whether a record stamped `last_modified` is expired under this policy.
	#[must_use]
	pub fn is_expired(&self, last_modified: SystemTime) -> bool {
		last_modified < self.min_accept_time()
	}

	#[must_use]
	pub fn from_config(conf: &Config) -> CachePolicy {
		let usage = match conf.get::<String>("usage").as_deref() {
			Some("cache-only") => CacheUsage::CacheOnly,
			Some("read-only") => CacheUsage::ReadOnly,
			Some("no-cache") => CacheUsage::NoCache,
			_ => CacheUsage::ReadWrite,
		};
		CachePolicy {
			usage,
			max_age: conf.get::<u64>("max_age_s").map(Duration::from_secs),
			min_time: None,
		}
	}

	#[must_use]
	pub fn to_config(&self) -> Config {
		let mut conf = Config::new("cache_policy");
		conf.set(
			"usage",
			match self.usage {
				CacheUsage::ReadWrite => "read-write",
				CacheUsage::CacheOnly => "cache-only",
				CacheUsage::ReadOnly => "read-only",
				CacheUsage::NoCache => "no-cache",
			},
		);
		if let Some(age) = self.max_age {
			conf.set("max_age_s", age.as_secs());
		}
		conf
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_policy_reads_and_writes() {
		let p = CachePolicy::default();
		assert!(p.is_readable());
		assert!(p.is_writeable());
		assert!(!p.is_cache_only());
	}

	#[test]
	fn no_cache_disables_everything() {
		let p = CachePolicy::no_cache();
		assert!(!p.is_readable());
		assert!(!p.is_writeable());
		assert!(!p.is_enabled());
	}

	#[test]
	fn expiry_uses_the_later_of_min_time_and_max_age() {
		let now = SystemTime::now();
		let p = CachePolicy {
			usage: CacheUsage::ReadWrite,
			max_age: Some(Duration::from_secs(100)),
			min_time: Some(now - Duration::from_secs(10)),
		};
		// min_time is the later bound here
		assert!(p.is_expired(now - Duration::from_secs(50)));
		assert!(!p.is_expired(now - Duration::from_secs(5)));
	}

	#[test]
	fn unbounded_policy_never_expires() {
		let p = CachePolicy::default();
		assert!(!p.is_expired(UNIX_EPOCH));
	}

	#[test]
	fn config_round_trip() {
		let p = CachePolicy {
			usage: CacheUsage::ReadOnly,
			max_age: Some(Duration::from_secs(3600)),
			min_time: None,
		};
		let back = CachePolicy::from_config(&p.to_config());
		assert_eq!(back.usage, CacheUsage::ReadOnly);
		assert_eq!(back.max_age, Some(Duration::from_secs(3600)));
	}
}
