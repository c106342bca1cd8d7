//! Client for adding, searching and deleting directory entries.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use ldap3::{LdapConnAsync, Scope, SearchEntry, SearchResult};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{config::DirectoryConfig, entry::Entry, error::Error};

/// How far below the base DN a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
	/// The base entry only.
	Base,
	/// Direct children of the base entry.
	OneLevel,
	/// The base entry and everything below it.
	Subtree,
}

impl From<SearchScope> for Scope {
	fn from(scope: SearchScope) -> Self {
		match scope {
			SearchScope::Base => Scope::Base,
			SearchScope::OneLevel => Scope::OneLevel,
			SearchScope::Subtree => Scope::Subtree,
		}
	}
}

/// The directory operations the VLV workflows are built from.
///
/// [`Connection`] implements this against a real server; the trait exists so
/// the workflows can run against other implementations in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send {
	/// Add `entry`.
	///
	/// Fails with [`Error::EntryAlreadyExists`] if the DN is taken,
	/// [`Error::NoSuchObject`] if its parent is missing and
	/// [`Error::InvalidEntry`] if the server refuses its attributes.
	async fn add(&mut self, entry: &Entry) -> Result<(), Error>;

	/// Search below `base`.
	///
	/// No matches is an empty result, but a `base` that does not exist fails
	/// with [`Error::NoSuchObject`].
	async fn search(
		&mut self,
		base: &str,
		scope: SearchScope,
		filter: &str,
	) -> Result<Vec<Entry>, Error>;

	/// Delete the entry `dn`, failing with [`Error::NoSuchObject`] if it does
	/// not exist.
	async fn delete(&mut self, dn: &str) -> Result<(), Error>;
}

/// A bound session to an LDAP server.
///
/// Opened with [`Connection::open`] and released with [`Connection::close`],
/// which consumes it. A connection that is dropped without being closed stops
/// its background driver but does not unbind.
pub struct Connection {
	/// Handle used to issue operations
	ldap: ldap3::Ldap,
	/// Task driving the underlying socket
	driver: JoinHandle<()>,
	/// Upper bound for a single operation
	operation_timeout: Duration,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection").field("operation_timeout", &self.operation_timeout).finish()
	}
}

impl Connection {
	/// Connect to the server in `config` and bind.
	///
	/// `bind_dn` and `bind_password` fall back to the configured defaults.
	pub async fn open(
		config: &DirectoryConfig,
		bind_dn: Option<&str>,
		bind_password: Option<&str>,
	) -> Result<Self, Error> {
		let bind_dn = bind_dn.unwrap_or(&config.default_bind_dn);
		let bind_password = bind_password
			.or(config.default_bind_password.as_deref())
			.ok_or_else(|| Error::Connection(format!("No password to bind as {bind_dn}")))?;

		let settings = config.connection.to_settings().await?;
		let (conn, ldap) = LdapConnAsync::from_url_with_settings(settings, &config.url)
			.await
			.map_err(|err| Error::Connection(format!("{}: {err}", config.url)))?;
		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});
		let mut connection =
			Self { ldap, driver, operation_timeout: config.connection.operation_timeout };

		debug!("Binding to {} as {bind_dn}", config.url);
		let timeout = connection.operation_timeout;
		let bind =
			timed(timeout, bind_dn, connection.ldap.simple_bind(bind_dn, bind_password)).await;
		match bind {
			Ok(result) if result.rc == 0 => Ok(connection),
			Ok(result) => {
				connection.abandon().await;
				Err(Error::Connection(format!("Bind as {bind_dn} rejected: {}", result.text)))
			}
			Err(err) => {
				connection.abandon().await;
				Err(Error::Connection(format!("Bind as {bind_dn} failed: {err}")))
			}
		}
	}

	/// Unbind and wait for the connection to shut down.
	pub async fn close(mut self) -> Result<(), Error> {
		debug!("Closing directory connection");
		let unbind = self.ldap.unbind().await;
		drop(self.ldap);
		if let Err(err) = self.driver.await {
			warn!("Failed to join background task: {err}");
		}
		Ok(unbind?)
	}

	/// Close the connection, then return `result`. An error in `result` wins
	/// over one from closing.
	pub async fn close_with<T>(self, result: Result<T, Error>) -> Result<T, Error> {
		let closed = self.close().await;
		let value = result?;
		closed?;
		Ok(value)
	}

	/// Tear the connection down after a failed bind.
	async fn abandon(self) {
		if let Err(err) = self.close().await {
			debug!("Ignoring error while closing unbound connection: {err}");
		}
	}
}

/// Run a directory operation on `dn` with a deadline.
async fn timed<T>(
	timeout: Duration,
	dn: &str,
	operation: impl Future<Output = ldap3::result::Result<T>>,
) -> Result<T, Error> {
	tokio::time::timeout(timeout, operation)
		.await
		.map_err(|_| Error::Connection(format!("Operation on {dn} timed out after {timeout:?}")))?
		.map_err(Error::from)
}

#[async_trait]
impl Directory for Connection {
	async fn add(&mut self, entry: &Entry) -> Result<(), Error> {
		debug!("Adding {}", entry.dn);
		let request = entry.to_add_request();
		let result =
			timed(self.operation_timeout, &entry.dn, self.ldap.add(&entry.dn, request)).await?;
		if result.rc != 0 {
			return Err(Error::from_result(&entry.dn, &result));
		}
		Ok(())
	}

	async fn search(
		&mut self,
		base: &str,
		scope: SearchScope,
		filter: &str,
	) -> Result<Vec<Entry>, Error> {
		debug!("Searching {base} ({scope:?}) for {filter}");
		let SearchResult(entries, result) = timed(
			self.operation_timeout,
			base,
			self.ldap.search(base, scope.into(), filter, vec!["*"]),
		)
		.await?;
		if result.rc != 0 {
			return Err(Error::from_result(base, &result));
		}
		Ok(entries.into_iter().map(|entry| Entry::from(SearchEntry::construct(entry))).collect())
	}

	async fn delete(&mut self, dn: &str) -> Result<(), Error> {
		debug!("Deleting {dn}");
		let result = timed(self.operation_timeout, dn, self.ldap.delete(dn)).await?;
		if result.rc != 0 {
			return Err(Error::from_result(dn, &result));
		}
		Ok(())
	}
}
