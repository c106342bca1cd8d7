//! Managing the VLV (virtual list view) indexes of a KRA database.
//!
//! A VLV index is a pair of entries below the database's configuration entry:
//! a `vlvSearch` entry describing the search, and a `vlvIndex` child holding
//! the sort order. Both are defined by a packaged LDIF template. Rebuilding
//! an index is done by adding task entries from a second template.
use std::path::Path;

use tracing::{debug, info};

use crate::{
	apply::{apply, apply_one, AddOutcome, ConflictPolicy},
	config::DirectoryConfig,
	directory::{Directory, SearchScope},
	dn::{escape_rdn_value, is_task_dn},
	entry::Entry,
	error::Error,
	ldif, poll, template,
};

/// Names of the VLV indexes a KRA defines.
pub const KRA_VLV_INDEXES: &[&str] = &[
	"allKeys",
	"kraAll",
	"kraArchival",
	"kraRecovery",
	"kraCanceled",
	"kraCanceledEnrollment",
	"kraCanceledRecovery",
	"kraRejected",
	"kraRejectedEnrollment",
	"kraRejectedRecovery",
	"kraComplete",
	"kraCompletedEnrollment",
	"kraCompletedRecovery",
];

/// Matches both halves of a VLV index.
const VLV_FILTER: &str = "(|(objectClass=vlvSearch)(objectClass=vlvIndex))";

/// What happened to a single DN during [`delete_indexes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
	/// The entry existed and was deleted.
	Deleted(String),
	/// There was no such entry.
	AlreadyAbsent(String),
}

impl DeleteOutcome {
	/// Whether an entry was actually removed.
	#[must_use]
	pub fn is_deleted(&self) -> bool {
		matches!(self, DeleteOutcome::Deleted(_))
	}
}

/// The DNs making up the given indexes, each `vlvIndex` entry directly
/// before its parent `vlvSearch` entry, so they can be deleted in order.
#[must_use]
pub fn index_dns<S: AsRef<str>>(names: &[S], instance: &str, database: &str) -> Vec<String> {
	let database_dn =
		format!("cn={},cn=ldbm database,cn=plugins,cn=config", escape_rdn_value(database));
	names
		.iter()
		.flat_map(|name| {
			let search = format!("{}-{instance}", name.as_ref());
			let search_dn = format!("cn={},{database_dn}", escape_rdn_value(&search));
			let index = format!("{search}Index");
			let index_dn = format!("cn={},{search_dn}", escape_rdn_value(&index));
			[index_dn, search_dn]
		})
		.collect()
}

/// Whether `cn` names one of the two entries of an index of `instance`,
/// `<name>-<instance>` or `<name>-<instance>Index`.
fn belongs_to(cn: &str, instance: &str) -> bool {
	let suffix = format!("-{}", instance.to_lowercase());
	let cn = cn.to_lowercase();
	let belongs = [Some(cn.as_str()), cn.strip_suffix("index")]
		.into_iter()
		.flatten()
		.any(|name| name.len() > suffix.len() && name.ends_with(&suffix));
	belongs
}

/// List the VLV entries of the configured instance.
pub async fn find_indexes(
	directory: &mut dyn Directory,
	config: &DirectoryConfig,
) -> Result<Vec<Entry>, Error> {
	let entries = directory.search(&config.database_dn(), SearchScope::Subtree, VLV_FILTER).await?;
	Ok(entries
		.into_iter()
		.filter(|entry| {
			entry
				.attributes
				.get("cn")
				.is_some_and(|cns| cns.iter().any(|cn| belongs_to(cn, &config.default_instance)))
		})
		.collect())
}

/// Customize `template` for this deployment and parse the result. The
/// intermediate file is removed again however this returns.
async fn customized_entries(
	config: &DirectoryConfig,
	template: &Path,
) -> Result<Vec<Entry>, Error> {
	let mut builder = tempfile::Builder::new();
	builder.prefix("kra-vlv-").suffix(".ldif");
	let file = match &config.scratch_dir {
		Some(dir) => builder.tempfile_in(dir)?,
		None => builder.tempfile()?,
	};
	template::customize(template, file.path(), &config.substitutions()).await?;
	let entries = ldif::parse_file(file.path()).await?;
	debug!("{} entries in {}", entries.len(), template.display());
	Ok(entries)
}

/// Add the VLV index entries defined in `template`.
pub async fn add_indexes(
	directory: &mut dyn Directory,
	config: &DirectoryConfig,
	template: &Path,
	on_conflict: ConflictPolicy,
) -> Result<Vec<AddOutcome>, Error> {
	let entries = customized_entries(config, template).await?;
	apply(directory, &entries, on_conflict).await
}

/// Add the reindex tasks defined in `template` one at a time, waiting for
/// each to finish before starting the next.
///
/// Every entry in the template must be a task entry; this is checked before
/// anything is added. A task that already exists under
/// [`ConflictPolicy::Skip`] is still waited for.
pub async fn reindex(
	directory: &mut dyn Directory,
	config: &DirectoryConfig,
	template: &Path,
	on_conflict: ConflictPolicy,
) -> Result<Vec<AddOutcome>, Error> {
	let entries = customized_entries(config, template).await?;
	if let Some(entry) = entries.iter().find(|entry| !is_task_dn(&entry.dn)) {
		return Err(Error::NotATask(entry.dn.clone()));
	}

	let mut outcomes = Vec::with_capacity(entries.len());
	for entry in &entries {
		outcomes.push(apply_one(directory, entry, on_conflict).await?);
		poll::wait_with(directory, &entry.dn, &config.poll).await?;
	}
	info!("Reindexed using {} tasks", outcomes.len());
	Ok(outcomes)
}

/// Delete the named indexes of `instance` from `database`.
///
/// Missing entries are reported as [`DeleteOutcome::AlreadyAbsent`] rather
/// than failing; any other error aborts.
pub async fn delete_indexes<S: AsRef<str> + Sync>(
	directory: &mut dyn Directory,
	names: &[S],
	instance: &str,
	database: &str,
) -> Result<Vec<DeleteOutcome>, Error> {
	let mut outcomes = Vec::new();
	for dn in index_dns(names, instance, database) {
		match directory.delete(&dn).await {
			Ok(()) => {
				info!("Deleted {dn}");
				outcomes.push(DeleteOutcome::Deleted(dn));
			}
			Err(Error::NoSuchObject(_)) => {
				info!("{dn} does not exist");
				outcomes.push(DeleteOutcome::AlreadyAbsent(dn));
			}
			Err(err) => return Err(err),
		}
	}
	Ok(outcomes)
}

/// Write the customized `template` to `output` without touching the
/// directory. Returns the number of entries written.
pub async fn generate_add_ldif(
	config: &DirectoryConfig,
	template: &Path,
	output: &Path,
) -> Result<usize, Error> {
	template::customize(template, output, &config.substitutions()).await?;
	Ok(ldif::parse_file(output).await?.len())
}

/// Write deletion records for the named indexes to `output` without
/// touching the directory. Returns the number of records written.
pub async fn generate_delete_ldif<S: AsRef<str>>(
	names: &[S],
	instance: &str,
	database: &str,
	output: &Path,
) -> Result<usize, Error> {
	let dns = index_dns(names, instance, database);
	tokio::fs::write(output, ldif::write_deletes(&dns)).await?;
	Ok(dns.len())
}
