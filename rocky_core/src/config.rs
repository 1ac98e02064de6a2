//! A hierarchical key/value tree for serialized options, in the shape of an
//! in-memory JSON document: every node has a key, an optional scalar value,
//! and child nodes. Relative paths resolve against a per-subtree referrer.

use std::str::FromStr;

/// One node of a configuration tree.
///
/// # Examples
///
/// ```
/// use rocky_core::Config;
///
/// let mut conf = Config::new("layer");
/// conf.set("name", "osm");
/// conf.set("tile_size", 256);
///
/// assert_eq!(conf.get::<String>("name").as_deref(), Some("osm"));
/// assert_eq!(conf.value_of("tile_size", 512u32), 256);
/// assert_eq!(conf.value_of("missing", 512u32), 512);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
	key: String,
	value: Option<String>,
	children: Vec<Config>,
	referrer: Option<String>,
}

impl Config {
	pub fn new(key: impl Into<String>) -> Config {
		Config {
			key: key.into(),
			..Config::default()
		}
	}

	pub fn with_value(key: impl Into<String>, value: impl ToString) -> Config {
		Config {
			key: key.into(),
			value: Some(value.to_string()),
			..Config::default()
		}
	}

	#[must_use]
	pub fn key(&self) -> &str {
		&self.key
	}

	#[must_use]
	pub fn value_str(&self) -> Option<&str> {
		self.value.as_deref()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.value.is_none() && self.children.is_empty()
	}

	/// Sets (or replaces) a scalar child.
	pub fn set(&mut self, key: &str, value: impl ToString) {
		match self.children.iter_mut().find(|c| c.key == key) {
			Some(child) => child.value = Some(value.to_string()),
			None => self.children.push(Config::with_value(key, value)),
		}
	}

	/// Adds a child subtree, handing down this node's referrer when the child
	/// carries none.
	pub fn add_child(&mut self, mut child: Config) {
		if child.referrer.is_none() {
			child.referrer.clone_from(&self.referrer);
		}
		self.children.push(child);
	}

	#[must_use]
	pub fn child(&self, key: &str) -> Option<&Config> {
		self.children.iter().find(|c| c.key == key)
	}

	#[must_use]
	pub fn has_child(&self, key: &str) -> bool {
		self.child(key).is_some()
	}

	#[must_use]
	pub fn children(&self) -> &[Config] {
		&self.children
	}

	/// Reads a typed scalar child, or `None` when missing or unparseable.
	#[must_use]
	pub fn get<T: FromStr>(&self, key: &str) -> Option<T> {
		self.child(key)?.value_str()?.parse().ok()
	}

	/// Reads a typed scalar child with a fallback.
	#[must_use]
	pub fn value_of<T: FromStr>(&self, key: &str, fallback: T) -> T {
		self.get(key).unwrap_or(fallback)
	}

	pub fn set_referrer(&mut self, referrer: impl Into<String>) {
		self.referrer = Some(referrer.into());
	}

	#[must_use]
	pub fn referrer(&self) -> Option<&str> {
		self.referrer.as_deref()
	}

	/// Resolves a possibly relative path against this subtree's referrer.
	#[must_use]
	pub fn resolve_path(&self, path: &str) -> String {
		if path.contains("://") || path.starts_with('/') {
			return path.to_string();
		}
		match self.referrer.as_deref() {
			Some(base) => {
				let base = base.trim_end_matches('/');
				format!("{base}/{path}")
			}
			None => path.to_string(),
		}
	}
}
