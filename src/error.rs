//! Error codes

use std::{path::PathBuf, time::Duration};

/// LDAP result code for a DN that does not exist.
pub(crate) const NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code for an add on a DN that is already present.
pub(crate) const ENTRY_ALREADY_EXISTS: u32 = 68;
/// LDAP result code for an attribute the schema does not know.
pub(crate) const UNDEFINED_ATTRIBUTE_TYPE: u32 = 17;
/// LDAP result code for a value not matching its attribute's syntax.
pub(crate) const INVALID_ATTRIBUTE_SYNTAX: u32 = 21;
/// LDAP result code for an entry breaking its object classes' rules.
pub(crate) const OBJECT_CLASS_VIOLATION: u32 = 65;
/// LDAP result code for a change to an entry's structural object class.
pub(crate) const OBJECT_CLASS_MODS_PROHIBITED: u32 = 69;

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The directory server could not be reached, or rejected the bind.
	#[error("Cannot connect to directory server: {0}")]
	Connection(String),
	/// An LDIF document could not be parsed.
	#[error("Malformed LDIF at line {line}: {reason}")]
	MalformedLdif {
		/// 1-based line number the problem was detected on
		line: usize,
		/// What was wrong with the line
		reason: String,
	},
	/// The entry to be added is already present in the directory.
	#[error("Entry already exists: {0}")]
	EntryAlreadyExists(String),
	/// The entry (or the parent of an entry being added) does not exist.
	#[error("No such object: {0}")]
	NoSuchObject(String),
	/// The server refused an entry because of its attributes.
	#[error("Invalid entry {dn}: {reason}")]
	InvalidEntry {
		/// DN of the refused entry
		dn: String,
		/// Diagnostic returned by the server
		reason: String,
	},
	/// A task entry was not removed by the server within the allowed time.
	#[error("Task {dn} did not complete within {waited:?}")]
	Timeout {
		/// DN of the task entry still present
		dn: String,
		/// How long the poller waited
		waited: Duration,
	},
	/// Completion polling was requested for an entry the server never
	/// removes by itself.
	#[error("Not a task entry: {0}")]
	NotATask(String),
	/// The LDIF template file does not exist.
	#[error("Template not found: {}", .0.display())]
	TemplateNotFound(PathBuf),
	/// Any other non-success LDAP result.
	#[error("Directory operation on {dn} failed with code {code}: {message}")]
	Directory {
		/// DN the operation targeted
		dn: String,
		/// LDAP result code
		code: u32,
		/// Diagnostic message returned by the server
		message: String,
	},
	/// The configuration or an argument was invalid.
	#[error("Invalid: {0}")]
	Invalid(String),
	/// Reading or writing a file failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}

impl Error {
	/// Translate a non-success LDAP result of an operation on `dn` into the
	/// matching error.
	pub(crate) fn from_result(dn: &str, result: &ldap3::LdapResult) -> Self {
		match result.rc {
			NO_SUCH_OBJECT => Error::NoSuchObject(dn.to_owned()),
			ENTRY_ALREADY_EXISTS => Error::EntryAlreadyExists(dn.to_owned()),
			UNDEFINED_ATTRIBUTE_TYPE
			| INVALID_ATTRIBUTE_SYNTAX
			| OBJECT_CLASS_VIOLATION
			| OBJECT_CLASS_MODS_PROHIBITED => {
				Error::InvalidEntry { dn: dn.to_owned(), reason: result.text.clone() }
			}
			code => Error::Directory { dn: dn.to_owned(), code, message: result.text.clone() },
		}
	}
}

#[cfg(test)]
mod tests {
	use ldap3::LdapResult;

	use super::{
		Error, INVALID_ATTRIBUTE_SYNTAX, OBJECT_CLASS_MODS_PROHIBITED, UNDEFINED_ATTRIBUTE_TYPE,
	};

	fn result(rc: u32) -> LdapResult {
		LdapResult {
			rc,
			matched: String::new(),
			text: "diagnostic".to_owned(),
			refs: Vec::new(),
			ctrls: Vec::new(),
		}
	}

	#[test]
	fn result_codes() {
		assert!(matches!(
			Error::from_result("cn=a", &result(32)),
			Error::NoSuchObject(dn) if dn == "cn=a"
		));
		assert!(matches!(Error::from_result("cn=a", &result(68)), Error::EntryAlreadyExists(_)));
		assert!(matches!(
			Error::from_result("cn=a", &result(65)),
			Error::InvalidEntry { reason, .. } if reason == "diagnostic"
		));
		let invalid =
			[UNDEFINED_ATTRIBUTE_TYPE, INVALID_ATTRIBUTE_SYNTAX, OBJECT_CLASS_MODS_PROHIBITED];
		for rc in invalid {
			assert!(matches!(Error::from_result("cn=a", &result(rc)), Error::InvalidEntry { .. }));
		}
		assert!(matches!(
			Error::from_result("cn=a", &result(53)),
			Error::Directory { code: 53, .. }
		));
	}
}
