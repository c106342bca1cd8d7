#![allow(dead_code)]

use std::{
	collections::{HashMap, HashSet},
	error::Error,
};

use async_trait::async_trait;
use kra_vlv::{
	dn::{is_task_dn, Dn},
	Connection, Directory, DirectoryConfig, Entry, SearchScope,
};
use url::Url;

pub const DATABASE_DN: &str = "cn=kraroot,cn=ldbm database,cn=plugins,cn=config";
pub const TASKS_DN: &str = "cn=index,cn=tasks,cn=config";

/// An in-memory directory behaving like 389 Directory Server in the ways the
/// VLV workflows care about: parents must exist, deleting non-leaf entries is
/// refused, and task entries disappear after they have been looked at a
/// number of times.
#[derive(Debug)]
pub struct FakeDirectory {
	/// Entries that exist without having been added
	suffixes: Vec<Dn>,
	/// Added entries, in order
	entries: Vec<(Dn, Entry)>,
	/// Base searches a task entry survives; `None` keeps tasks forever
	task_lifetime: Option<usize>,
	/// Base searches seen so far, per task
	task_checks: HashMap<String, usize>,
	/// DNs of every successful add, in order
	pub added: Vec<String>,
	/// Number of base searches for task entries
	pub task_searches: usize,
}

impl FakeDirectory {
	pub fn new(suffixes: &[&str]) -> Self {
		Self {
			suffixes: suffixes.iter().map(|dn| Dn::parse(dn).unwrap()).collect(),
			entries: Vec::new(),
			task_lifetime: Some(0),
			task_checks: HashMap::new(),
			added: Vec::new(),
			task_searches: 0,
		}
	}

	/// A directory with a KRA database and a task container.
	pub fn kra() -> Self {
		Self::new(&[DATABASE_DN, TASKS_DN])
	}

	/// Task entries stay for `checks` base searches and are gone on the next.
	#[must_use]
	pub fn with_task_lifetime(mut self, checks: Option<usize>) -> Self {
		self.task_lifetime = checks;
		self
	}

	pub fn contains(&self, dn: &str) -> bool {
		let dn = Dn::parse(dn).unwrap();
		self.exists(&dn)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	fn exists(&self, dn: &Dn) -> bool {
		self.suffixes.contains(dn) || self.entries.iter().any(|(existing, _)| existing == dn)
	}

	fn matches(entry: &Entry, filter: &str) -> bool {
		let classes: HashSet<String> = filter
			.split(['(', ')', '|', '&'])
			.filter_map(|term| term.strip_prefix("objectClass="))
			.map(str::to_lowercase)
			.collect();
		classes.contains("*")
			|| entry.attributes.get("objectClass").is_some_and(|values| {
				values.iter().any(|value| classes.contains(&value.to_lowercase()))
			})
	}
}

#[async_trait]
impl Directory for FakeDirectory {
	async fn add(&mut self, entry: &Entry) -> Result<(), kra_vlv::Error> {
		let dn = Dn::parse(&entry.dn)?;
		if self.exists(&dn) {
			return Err(kra_vlv::Error::EntryAlreadyExists(entry.dn.clone()));
		}
		match dn.parent() {
			Some(parent) if self.exists(&parent) => {}
			_ => return Err(kra_vlv::Error::NoSuchObject(entry.dn.clone())),
		}
		if entry.attributes.get("objectClass").is_none() {
			return Err(kra_vlv::Error::InvalidEntry {
				dn: entry.dn.clone(),
				reason: "missing objectClass".to_owned(),
			});
		}
		self.entries.push((dn, entry.clone()));
		self.added.push(entry.dn.clone());
		Ok(())
	}

	async fn search(
		&mut self,
		base: &str,
		scope: SearchScope,
		filter: &str,
	) -> Result<Vec<Entry>, kra_vlv::Error> {
		let base_dn = Dn::parse(base)?;
		if !self.exists(&base_dn) {
			return Err(kra_vlv::Error::NoSuchObject(base.to_owned()));
		}

		if scope == SearchScope::Base && is_task_dn(base) {
			self.task_searches += 1;
			let checks = self.task_checks.entry(base_dn.to_string()).or_default();
			if self.task_lifetime.is_some_and(|lifetime| *checks >= lifetime) {
				self.entries.retain(|(dn, _)| *dn != base_dn);
				return Err(kra_vlv::Error::NoSuchObject(base.to_owned()));
			}
			*checks += 1;
		}

		Ok(self
			.entries
			.iter()
			.filter(|(dn, _)| match scope {
				SearchScope::Base => *dn == base_dn,
				SearchScope::OneLevel => dn.parent().as_ref() == Some(&base_dn),
				SearchScope::Subtree => *dn == base_dn || dn.is_descendant_of(&base_dn),
			})
			.map(|(_, entry)| entry)
			.filter(|entry| Self::matches(entry, filter))
			.cloned()
			.collect())
	}

	async fn delete(&mut self, dn: &str) -> Result<(), kra_vlv::Error> {
		let target = Dn::parse(dn)?;
		if !self.entries.iter().any(|(existing, _)| *existing == target) {
			return Err(kra_vlv::Error::NoSuchObject(dn.to_owned()));
		}
		if self.entries.iter().any(|(existing, _)| existing.is_descendant_of(&target)) {
			return Err(kra_vlv::Error::Directory {
				dn: dn.to_owned(),
				code: 66,
				message: "Entry has children".to_owned(),
			});
		}
		self.entries.retain(|(existing, _)| *existing != target);
		Ok(())
	}
}

/// Configuration pointing at the templates shipped in this repository.
pub fn config(url: &str) -> DirectoryConfig {
	let mut config = DirectoryConfig::new(Url::parse(url).unwrap());
	let templates = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
	config.templates.indexes = templates.join("vlv.ldif");
	config.templates.tasks = templates.join("vlvtasks.ldif");
	config
}

/// Configuration for the directory server started by the docker test setup.
pub fn docker_config() -> DirectoryConfig {
	let mut config = config("ldap://localhost:3389");
	config.default_bind_password = Some("Secret.123".to_owned());
	config.database = "userRoot".to_owned();
	config.root_suffix = "dc=example,dc=com".to_owned();
	config
}

pub async fn ldap_connect() -> Result<Connection, Box<dyn Error>> {
	Ok(Connection::open(&docker_config(), None, None).await?)
}
