//! Distinguished name parsing and escaping.
//!
//! DNs built from configuration values (instance names, database names) go
//! through [`escape_rdn_value`] so that commas or equals signs in those values
//! cannot change the shape of the resulting DN.
use std::fmt;

use crate::error::Error;

/// The subtree the directory server watches for task entries.
const TASKS_DN: &str = "cn=tasks,cn=config";

/// Escape a string for use as the value of a relative distinguished name,
/// following RFC 4514 section 2.4.
#[must_use]
pub fn escape_rdn_value(value: &str) -> String {
	let last = value.chars().count().saturating_sub(1);
	let mut escaped = String::with_capacity(value.len());
	for (i, ch) in value.chars().enumerate() {
		let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
			|| (i == 0 && matches!(ch, ' ' | '#'))
			|| (i == last && ch == ' ');
		if needs_escape {
			escaped.push('\\');
		}
		escaped.push(ch);
	}
	escaped
}

/// A single `attribute=value` component of a DN. Multi-valued RDNs (joined
/// with `+`) are kept as one unsplit value.
#[derive(Debug, Clone)]
pub struct Rdn {
	/// Attribute type, e.g. `cn`
	pub attribute: String,
	/// Unescaped attribute value
	pub value: String,
}

impl PartialEq for Rdn {
	fn eq(&self, other: &Self) -> bool {
		self.attribute.eq_ignore_ascii_case(&other.attribute)
			&& self.value.to_lowercase() == other.value.to_lowercase()
	}
}

impl Eq for Rdn {}

/// A parsed distinguished name, leaf component first.
///
/// Equality ignores case and the whitespace around separators, so
/// `cn=Foo, cn=Config` equals `cn=foo,cn=config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dn {
	/// The components, most specific first
	rdns: Vec<Rdn>,
}

impl Dn {
	/// Parse a DN in its string form.
	pub fn parse(input: &str) -> Result<Self, Error> {
		let input = trim_unescaped(input);
		if input.is_empty() {
			return Ok(Self { rdns: Vec::new() });
		}

		let mut rdns = Vec::new();
		for component in split_unescaped(input, ',')? {
			let component = trim_unescaped(component);
			let (attribute, value) = component
				.split_once('=')
				.ok_or_else(|| Error::Invalid(format!("DN component without `=`: {component}")))?;
			let attribute = attribute.trim();
			if attribute.is_empty() {
				return Err(Error::Invalid(format!("DN component without attribute: {input}")));
			}
			let value = unescape(trim_unescaped(value))?;
			rdns.push(Rdn { attribute: attribute.to_owned(), value });
		}
		Ok(Self { rdns })
	}

	/// The components of the DN, most specific first.
	#[must_use]
	pub fn rdns(&self) -> &[Rdn] {
		&self.rdns
	}

	/// Whether this is the empty (root) DN.
	#[must_use]
	pub fn is_root(&self) -> bool {
		self.rdns.is_empty()
	}

	/// The DN of the entry this entry sits under, or `None` for the root DN.
	#[must_use]
	pub fn parent(&self) -> Option<Dn> {
		(!self.rdns.is_empty()).then(|| Dn { rdns: self.rdns[1..].to_vec() })
	}

	/// Whether this DN lies strictly below `ancestor`.
	#[must_use]
	pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
		self.rdns.len() > ancestor.rdns.len()
			&& self.rdns[self.rdns.len() - ancestor.rdns.len()..] == ancestor.rdns[..]
	}
}

impl fmt::Display for Dn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, rdn) in self.rdns.iter().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}
			write!(f, "{}={}", rdn.attribute, escape_rdn_value(&rdn.value))?;
		}
		Ok(())
	}
}

/// Whether `dn` names an entry below `cn=tasks,cn=config`, which the
/// directory server removes by itself once the task has run.
#[must_use]
pub fn is_task_dn(dn: &str) -> bool {
	match (Dn::parse(dn), Dn::parse(TASKS_DN)) {
		(Ok(dn), Ok(tasks)) => dn.is_descendant_of(&tasks),
		_ => false,
	}
}

/// Split on `delimiter` where it is not preceded by a backslash. Escapes are
/// left in place for [`unescape`].
fn split_unescaped(input: &str, delimiter: char) -> Result<Vec<&str>, Error> {
	let mut parts = Vec::new();
	let mut start = 0;
	let mut escaped = false;
	for (i, ch) in input.char_indices() {
		if escaped {
			escaped = false;
		} else if ch == '\\' {
			escaped = true;
		} else if ch == delimiter {
			parts.push(&input[start..i]);
			start = i + ch.len_utf8();
		}
	}
	if escaped {
		return Err(Error::Invalid(format!("DN ends in an escape character: {input}")));
	}
	parts.push(&input[start..]);
	if parts.iter().any(|part| part.trim().is_empty()) {
		return Err(Error::Invalid(format!("DN contains an empty component: {input}")));
	}
	Ok(parts)
}

/// Trim surrounding whitespace, keeping a trailing space that is escaped.
fn trim_unescaped(input: &str) -> &str {
	let input = input.trim_start();
	let mut end = input.len();
	while let Some(ch) = input[..end].chars().next_back() {
		if !ch.is_whitespace() {
			break;
		}
		let before = &input[..end - ch.len_utf8()];
		if before.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1 {
			break;
		}
		end -= ch.len_utf8();
	}
	&input[..end]
}

/// Resolve backslash escapes, both `\,` and the hex form `\2c`.
fn unescape(value: &str) -> Result<String, Error> {
	let mut bytes = Vec::with_capacity(value.len());
	let mut chars = value.chars();
	while let Some(ch) = chars.next() {
		if ch != '\\' {
			let mut buf = [0; 4];
			bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
			continue;
		}
		let next = chars
			.next()
			.ok_or_else(|| Error::Invalid(format!("Unterminated escape in DN value: {value}")))?;
		if next.is_ascii_hexdigit() {
			let low = chars
				.next()
				.and_then(|c| c.to_digit(16))
				.ok_or_else(|| Error::Invalid(format!("Bad hex escape in DN value: {value}")))?;
			let high = next.to_digit(16).unwrap_or_default();
			bytes.push(u8::try_from(high * 16 + low).unwrap_or_default());
		} else {
			let mut buf = [0; 4];
			bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
		}
	}
	String::from_utf8(bytes).map_err(|_| Error::Invalid(format!("DN value is not UTF-8: {value}")))
}
