//! Fill deployment specific values into the static LDIF templates.
use std::{collections::HashMap, io::ErrorKind, path::Path};

use tracing::debug;

use crate::{dn::escape_rdn_value, error::Error};

/// Token replaced with the instance identifier, e.g. `pki-tomcat`.
pub const INSTANCE_TOKEN: &str = "{instanceId}";
/// Token replaced with the backend database name, e.g. `kraroot`.
pub const DATABASE_TOKEN: &str = "{database}";
/// Token replaced with the root suffix of the subsystem's data.
pub const ROOT_SUFFIX_TOKEN: &str = "{rootSuffix}";
/// Token replaced with the current Unix time, for unique task names.
pub const TIMESTAMP_TOKEN: &str = "{timestamp}";

/// Read the template at `template`, substitute every occurrence of the keys of
/// `substitutions` and write the result to `output`.
pub async fn customize(
	template: &Path,
	output: &Path,
	substitutions: &HashMap<String, String>,
) -> Result<(), Error> {
	let text = tokio::fs::read_to_string(template).await.map_err(|err| {
		if err.kind() == ErrorKind::NotFound {
			Error::TemplateNotFound(template.to_owned())
		} else {
			Error::Io(err)
		}
	})?;
	debug!("Customizing {} into {}", template.display(), output.display());
	tokio::fs::write(output, substitute(&text, substitutions)).await?;
	Ok(())
}

/// Apply `substitutions` to an LDIF document.
///
/// Text is scanned once from left to right and at each position the longest
/// matching key wins, so a replacement is never substituted again and a key
/// that is a prefix of another key cannot shadow it. Values placed on `dn:`
/// lines are escaped as RDN values.
#[must_use]
pub fn substitute(text: &str, substitutions: &HashMap<String, String>) -> String {
	let mut keys: Vec<&str> =
		substitutions.keys().map(String::as_str).filter(|key| !key.is_empty()).collect();
	keys.sort_by_key(|key| std::cmp::Reverse(key.len()));

	let mut out = String::with_capacity(text.len());
	for line in text.split_inclusive('\n') {
		let is_dn = line.get(..3).is_some_and(|start| start.eq_ignore_ascii_case("dn:"));
		let mut rest = line;
		while !rest.is_empty() {
			match keys.iter().find(|key| rest.starts_with(**key)) {
				Some(key) => {
					let value = &substitutions[*key];
					if is_dn {
						out.push_str(&escape_rdn_value(value));
					} else {
						out.push_str(value);
					}
					rest = &rest[key.len()..];
				}
				None => {
					let mut chars = rest.chars();
					if let Some(ch) = chars.next() {
						out.push(ch);
					}
					rest = chars.as_str();
				}
			}
		}
	}
	out
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::collections::HashMap;

	use super::{customize, substitute};
	use crate::{error::Error, ldif};

	fn substitutions(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
	}

	#[test]
	fn replaces_literal_tokens() {
		let template = "\
dn: cn=allKeys-INSTANCE,cn=DB,cn=ldbm database,cn=plugins,cn=config
objectClass: vlvSearch

dn: cn=allKeysIndex,cn=allKeys-INSTANCE,cn=DB,cn=ldbm database,cn=plugins,cn=config
objectClass: vlvIndex
";
		let text =
			substitute(template, &substitutions(&[("INSTANCE", "pki-tomcat"), ("DB", "userRoot")]));
		let dns: Vec<_> = ldif::parse(&text).unwrap().into_iter().map(|entry| entry.dn).collect();
		assert_eq!(
			dns,
			[
				"cn=allKeys-pki-tomcat,cn=userRoot,cn=ldbm database,cn=plugins,cn=config",
				"cn=allKeysIndex,cn=allKeys-pki-tomcat,cn=userRoot,cn=ldbm database,cn=plugins,cn=config",
			]
		);
	}

	#[test]
	fn longest_key_wins_and_replacements_are_final() {
		let subs = substitutions(&[("DB", "x"), ("DBNAME", "userRoot"), ("x", "never")]);
		assert_eq!(substitute("a: DBNAME DB\n", &subs), "a: userRoot x\n");
	}

	#[test]
	fn escapes_values_on_dn_lines_only() {
		let subs = substitutions(&[("{instanceId}", "a,b")]);
		assert_eq!(
			substitute("dn: cn={instanceId},cn=config\ncn: {instanceId}\n", &subs),
			"dn: cn=a\\,b,cn=config\ncn: a,b\n"
		);
	}

	#[tokio::test]
	async fn missing_template() {
		let dir = tempfile::tempdir().unwrap();
		let result = customize(
			&dir.path().join("missing.ldif"),
			&dir.path().join("out.ldif"),
			&HashMap::new(),
		)
		.await;
		assert!(matches!(result, Err(Error::TemplateNotFound(_))));
		assert!(!dir.path().join("out.ldif").exists());
	}

	#[tokio::test]
	async fn unwritable_output() {
		let dir = tempfile::tempdir().unwrap();
		let template = dir.path().join("vlv.ldif");
		tokio::fs::write(&template, "dn: cn=a\n").await.unwrap();
		let result =
			customize(&template, &dir.path().join("no/such/dir/out.ldif"), &HashMap::new()).await;
		assert!(matches!(result, Err(Error::Io(_))));
	}
}
