//! Reading and writing LDIF (RFC 2849) content records.
//!
//! Only the subset the VLV templates need is understood: add records,
//! optionally with an explicit `changetype: add`, and base64 encoded values.
//! Deletion records can be written but not read back as entries.
use std::{fmt::Write as _, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{entry::Entry, error::Error};

/// Read and parse the LDIF file at `path`.
pub async fn parse_file(path: &Path) -> Result<Vec<Entry>, Error> {
	let text = tokio::fs::read_to_string(path).await?;
	parse(&text)
}

/// Parse an LDIF document into its entries, in document order.
pub fn parse(text: &str) -> Result<Vec<Entry>, Error> {
	let mut entries = Vec::new();
	let mut current: Option<Entry> = None;

	for (line_no, line) in unfold(text)? {
		if line.is_empty() {
			entries.extend(current.take());
			continue;
		}

		let (name, value) = parse_line(line_no, &line)?;
		let Some(entry) = current.as_mut() else {
			if name.eq_ignore_ascii_case("dn") {
				current = Some(Entry::new(value));
			} else if name.eq_ignore_ascii_case("version") && entries.is_empty() {
				if value != "1" {
					return Err(malformed(line_no, format!("unsupported LDIF version {value}")));
				}
			} else {
				return Err(malformed(line_no, "record does not start with `dn:`"));
			}
			continue;
		};

		if name.eq_ignore_ascii_case("dn") {
			return Err(malformed(line_no, "second `dn:` in record (missing blank line?)"));
		} else if name.eq_ignore_ascii_case("changetype") {
			if !value.eq_ignore_ascii_case("add") || !entry.attributes.is_empty() {
				return Err(malformed(line_no, format!("unsupported changetype `{value}`")));
			}
		} else {
			entry.attributes.push(name, value);
		}
	}
	entries.extend(current);
	Ok(entries)
}

/// Join folded lines, drop comments, and number the logical lines by the
/// physical line they started on.
fn unfold(text: &str) -> Result<Vec<(usize, String)>, Error> {
	let mut lines: Vec<(usize, String)> = Vec::new();
	let mut in_comment = false;
	for (i, raw) in text.lines().enumerate() {
		let line_no = i + 1;
		if let Some(continuation) = raw.strip_prefix(' ') {
			if in_comment {
				continue;
			}
			match lines.last_mut() {
				Some((_, previous)) if !previous.is_empty() => previous.push_str(continuation),
				_ => return Err(malformed(line_no, "continuation line without a line to continue")),
			}
			continue;
		}
		in_comment = raw.starts_with('#');
		if !in_comment {
			lines.push((line_no, raw.trim_end_matches('\r').to_owned()));
		}
	}
	Ok(lines)
}

/// Split an `attribute: value` or `attribute:: base64` line.
fn parse_line(line_no: usize, line: &str) -> Result<(String, String), Error> {
	let (name, rest) =
		line.split_once(':').ok_or_else(|| malformed(line_no, "line has no `:` separator"))?;
	if name.is_empty() || name.contains(char::is_whitespace) {
		return Err(malformed(line_no, format!("invalid attribute name `{name}`")));
	}

	let value = if let Some(encoded) = rest.strip_prefix(':') {
		let bytes = STANDARD
			.decode(encoded.trim())
			.map_err(|err| malformed(line_no, format!("invalid base64 value: {err}")))?;
		String::from_utf8(bytes).map_err(|_| malformed(line_no, "base64 value is not UTF-8"))?
	} else if rest.starts_with('<') {
		return Err(malformed(line_no, "URL values are not supported"));
	} else {
		rest.trim_start_matches(' ').to_owned()
	};
	Ok((name.to_owned(), value))
}

/// Shorthand for [`Error::MalformedLdif`].
fn malformed(line: usize, reason: impl Into<String>) -> Error {
	Error::MalformedLdif { line, reason: reason.into() }
}

/// Whether `value` can be written as-is (a SAFE-STRING in RFC 2849 terms).
fn is_safe(value: &str) -> bool {
	let Some(first) = value.chars().next() else {
		return true;
	};
	!matches!(first, ' ' | ':' | '<')
		&& !value.ends_with(' ')
		&& value.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

/// Write one `name: value` line, base64 encoding the value when needed.
fn write_line(out: &mut String, name: &str, value: &str) {
	// Writing to a String cannot fail.
	let _ = if is_safe(value) {
		writeln!(out, "{name}: {value}")
	} else {
		writeln!(out, "{name}:: {}", STANDARD.encode(value))
	};
}

/// Serialize entries as LDIF add records.
#[must_use]
pub fn write_entries(entries: &[Entry]) -> String {
	let mut out = String::new();
	for (i, entry) in entries.iter().enumerate() {
		if i > 0 {
			out.push('\n');
		}
		write_line(&mut out, "dn", &entry.dn);
		for (name, values) in entry.attributes.iter() {
			for value in values {
				write_line(&mut out, name, value);
			}
		}
	}
	out
}

/// Serialize `changetype: delete` records for the given DNs.
#[must_use]
pub fn write_deletes<S: AsRef<str>>(dns: &[S]) -> String {
	let mut out = String::new();
	for (i, dn) in dns.iter().enumerate() {
		if i > 0 {
			out.push('\n');
		}
		write_line(&mut out, "dn", dn.as_ref());
		out.push_str("changetype: delete\n");
	}
	out
}
