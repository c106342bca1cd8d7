//! Directory entries as read from LDIF and returned by searches.
use ldap3::SearchEntry;

/// Attribute values of an entry, keyed by attribute name.
///
/// Names are compared case-sensitively and keep the order they were first
/// inserted in, as do the values of each attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, Vec<String>)>);

impl Attributes {
	/// Create an empty attribute map.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a value to an attribute, creating the attribute if needed.
	pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();
		match self.0.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, values)) => values.push(value),
			None => self.0.push((name, vec![value])),
		}
	}

	/// All values of an attribute.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&[String]> {
		self.0.iter().find(|(existing, _)| existing == name).map(|(_, values)| values.as_slice())
	}

	/// The first value of an attribute.
	#[must_use]
	pub fn first(&self, name: &str) -> Option<&str> {
		self.get(name)?.first().map(String::as_str)
	}

	/// Iterate over `(name, values)` pairs in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
		self.0.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
	}

	/// Number of distinct attributes.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether there are no attributes at all.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<N, V> FromIterator<(N, V)> for Attributes
where
	N: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		let mut attributes = Attributes::new();
		for (name, value) in iter {
			attributes.push(name, value);
		}
		attributes
	}
}

/// A directory entry: a DN and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	/// Distinguished name of the entry
	pub dn: String,
	/// Attribute values
	pub attributes: Attributes,
}

impl Entry {
	/// Create an entry with no attributes.
	#[must_use]
	pub fn new(dn: impl Into<String>) -> Self {
		Self { dn: dn.into(), attributes: Attributes::new() }
	}

	/// Builder-style [`Attributes::push`].
	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.push(name, value);
		self
	}

	/// Attributes in the shape `ldap3::Ldap::add` takes.
	pub(crate) fn to_add_request(&self) -> Vec<(String, std::collections::HashSet<String>)> {
		self.attributes
			.iter()
			.map(|(name, values)| (name.to_owned(), values.iter().cloned().collect()))
			.collect()
	}
}

impl From<SearchEntry> for Entry {
	/// Binary attributes are dropped; everything this crate reads is text.
	fn from(entry: SearchEntry) -> Self {
		let mut names: Vec<_> = entry.attrs.into_iter().collect();
		names.sort_by(|(a, _), (b, _)| a.cmp(b));
		let mut attributes = Attributes::new();
		for (name, values) in names {
			for value in values {
				attributes.push(name.clone(), value);
			}
		}
		Self { dn: entry.dn, attributes }
	}
}
