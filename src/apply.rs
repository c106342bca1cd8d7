//! Replay parsed LDIF entries against a directory.
use tracing::{info, warn};

use crate::{directory::Directory, entry::Entry, error::Error};

/// What to do when an entry to be added already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
	/// Abort with [`Error::EntryAlreadyExists`].
	#[default]
	Fail,
	/// Log the conflict and carry on with the next entry.
	Skip,
}

/// What happened to a single entry during [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
	/// The entry was added.
	Added(String),
	/// The entry already existed and was left alone.
	Skipped(String),
}

/// Add `entries` one by one, in order.
///
/// Order matters: an entry may be the parent of a later one. Nothing is rolled
/// back on failure, so entries added before the failing one stay in the
/// directory.
pub async fn apply(
	directory: &mut dyn Directory,
	entries: &[Entry],
	on_conflict: ConflictPolicy,
) -> Result<Vec<AddOutcome>, Error> {
	let mut outcomes = Vec::with_capacity(entries.len());
	for entry in entries {
		outcomes.push(apply_one(directory, entry, on_conflict).await?);
	}
	Ok(outcomes)
}

/// Add a single entry, honouring `on_conflict`.
pub(crate) async fn apply_one(
	directory: &mut dyn Directory,
	entry: &Entry,
	on_conflict: ConflictPolicy,
) -> Result<AddOutcome, Error> {
	match directory.add(entry).await {
		Ok(()) => {
			info!("Added {}", entry.dn);
			Ok(AddOutcome::Added(entry.dn.clone()))
		}
		Err(Error::EntryAlreadyExists(dn)) if on_conflict == ConflictPolicy::Skip => {
			warn!("Skipping {dn}: entry already exists");
			Ok(AddOutcome::Skipped(dn))
		}
		Err(err) => Err(err),
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use mockall::{predicate, Sequence};

	use super::{apply, AddOutcome, ConflictPolicy};
	use crate::{directory::MockDirectory, entry::Entry, error::Error};

	fn entries() -> Vec<Entry> {
		vec![
			Entry::new("cn=a,cn=config").with("cn", "a"),
			Entry::new("cn=b,cn=config").with("cn", "b"),
			Entry::new("cn=c,cn=config").with("cn", "c"),
		]
	}

	#[tokio::test]
	async fn skip_continues_after_conflict() {
		let mut directory = MockDirectory::new();
		let mut seq = Sequence::new();
		directory
			.expect_add()
			.withf(|entry| entry.dn == "cn=a,cn=config")
			.times(1)
			.in_sequence(&mut seq)
			.returning(|entry| Err(Error::EntryAlreadyExists(entry.dn.clone())));
		for dn in ["cn=b,cn=config", "cn=c,cn=config"] {
			directory
				.expect_add()
				.withf(move |entry| entry.dn == dn)
				.times(1)
				.in_sequence(&mut seq)
				.returning(|_| Ok(()));
		}

		let outcomes = apply(&mut directory, &entries(), ConflictPolicy::Skip).await.unwrap();
		assert_eq!(
			outcomes,
			[
				AddOutcome::Skipped("cn=a,cn=config".to_owned()),
				AddOutcome::Added("cn=b,cn=config".to_owned()),
				AddOutcome::Added("cn=c,cn=config".to_owned()),
			]
		);
	}

	#[tokio::test]
	async fn fail_stops_at_conflict() {
		let mut directory = MockDirectory::new();
		directory
			.expect_add()
			.with(predicate::function(|entry: &Entry| entry.dn == "cn=a,cn=config"))
			.times(1)
			.returning(|entry| Err(Error::EntryAlreadyExists(entry.dn.clone())));

		let result = apply(&mut directory, &entries(), ConflictPolicy::Fail).await;
		assert!(matches!(result, Err(Error::EntryAlreadyExists(dn)) if dn == "cn=a,cn=config"));
	}

	#[tokio::test]
	async fn other_errors_propagate_under_skip() {
		let mut directory = MockDirectory::new();
		let mut seq = Sequence::new();
		directory.expect_add().times(1).in_sequence(&mut seq).returning(|_| Ok(()));
		directory
			.expect_add()
			.times(1)
			.in_sequence(&mut seq)
			.returning(|entry| Err(Error::NoSuchObject(entry.dn.clone())));

		let result = apply(&mut directory, &entries(), ConflictPolicy::Skip).await;
		assert!(matches!(result, Err(Error::NoSuchObject(dn)) if dn == "cn=b,cn=config"));
	}
}
