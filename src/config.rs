//! Config for the directory client and the VLV operations.
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use ldap3::LdapConnSettings;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{dn::escape_rdn_value, error::Error, template};

/// Identity used when no bind DN is given explicitly.
pub const DEFAULT_BIND_DN: &str = "cn=Directory Manager";
/// Instance used when none is given explicitly.
pub const DEFAULT_INSTANCE: &str = "pki-tomcat";
/// Backend database holding the KRA data in a default deployment.
pub const DEFAULT_DATABASE: &str = "kraroot";
/// Where the packaged VLV index template lives.
pub const DEFAULT_INDEX_TEMPLATE: &str = "/usr/share/pki/kra/conf/vlv.ldif";
/// Where the packaged VLV reindex task template lives.
pub const DEFAULT_TASK_TEMPLATE: &str = "/usr/share/pki/kra/conf/vlvtasks.ldif";

/// Directory configuration.
///
/// Everything that used to be an implicit default (the bind identity, the
/// instance, the database) is carried here and passed to each operation.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DirectoryConfig {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
	/// Bind DN used when an operation is not given one
	#[serde(default = "default_bind_dn")]
	pub default_bind_dn: String,
	/// Password for [`Self::default_bind_dn`]
	#[serde(default)]
	pub default_bind_password: Option<String>,
	/// Instance the VLV indexes belong to
	#[serde(default = "default_instance")]
	pub default_instance: String,
	/// Name of the backend database holding the subsystem's entries
	pub database: String,
	/// Root suffix of the subsystem's entries, e.g. `o=pki-tomcat-KRA`
	pub root_suffix: String,
	/// LDIF templates
	#[serde(default)]
	pub templates: TemplateConfig,
	/// Completion polling
	#[serde(default)]
	pub poll: PollConfig,
	/// Where intermediate LDIF files are written, the system's temporary
	/// directory if unset
	#[serde(default)]
	pub scratch_dir: Option<PathBuf>,
}

/// Serde default for [`DirectoryConfig::default_bind_dn`]
fn default_bind_dn() -> String {
	DEFAULT_BIND_DN.to_owned()
}

/// Serde default for [`DirectoryConfig::default_instance`]
fn default_instance() -> String {
	DEFAULT_INSTANCE.to_owned()
}

impl DirectoryConfig {
	/// A configuration for `url` with every other setting at its default.
	#[must_use]
	pub fn new(url: Url) -> Self {
		Self {
			url,
			connection: ConnectionConfig::default(),
			default_bind_dn: default_bind_dn(),
			default_bind_password: None,
			default_instance: default_instance(),
			database: DEFAULT_DATABASE.to_owned(),
			root_suffix: format!("o={DEFAULT_INSTANCE}-KRA"),
			templates: TemplateConfig::default(),
			poll: PollConfig::default(),
			scratch_dir: None,
		}
	}

	/// DN of the backend database's configuration entry, under which the VLV
	/// entries live.
	#[must_use]
	pub fn database_dn(&self) -> String {
		format!("cn={},cn=ldbm database,cn=plugins,cn=config", escape_rdn_value(&self.database))
	}

	/// Template token values for this deployment.
	#[must_use]
	pub fn substitutions(&self) -> HashMap<String, String> {
		let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
		HashMap::from([
			(template::INSTANCE_TOKEN.to_owned(), self.default_instance.clone()),
			(template::DATABASE_TOKEN.to_owned(), self.database.clone()),
			(template::ROOT_SUFFIX_TOKEN.to_owned(), self.root_suffix.clone()),
			(template::TIMESTAMP_TOKEN.to_owned(), timestamp.to_string()),
		])
	}
}

/// Paths of the LDIF templates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateConfig {
	/// Definitions of the VLV search and index entries
	pub indexes: PathBuf,
	/// Reindex task entries, one per index
	pub tasks: PathBuf,
}

impl Default for TemplateConfig {
	fn default() -> Self {
		Self { indexes: DEFAULT_INDEX_TEMPLATE.into(), tasks: DEFAULT_TASK_TEMPLATE.into() }
	}
}

/// How to wait for task entries to be removed by the server.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PollConfig {
	/// Time between two existence checks
	pub interval: Duration,
	/// Give up with [`Error::Timeout`] after this long. `None` waits forever.
	pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
	fn default() -> Self {
		Self { interval: Duration::from_secs(1), max_wait: Some(Duration::from_secs(300)) }
	}
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// LDAP operation timeout.
	pub operation_timeout: Duration,

	/// TLS config
	#[serde(default)]
	pub tls: TLSConfig,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self { timeout: 10, operation_timeout: Duration::from_secs(30), tls: TLSConfig::default() }
	}
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate to use for the connection
	pub client_certificate_path: Option<PathBuf>,
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let pem = tokio::fs::read(path).await?;
			let mut roots = rustls::RootCertStore::empty();
			let certs = rustls_pemfile::certs(&mut pem.as_slice())
				.map_err(|_| Error::Invalid("Could not read root certificate".to_owned()))?;
			let (added, _) = roots.add_parsable_certificates(&certs[..]);
			if added == 0 {
				return Err(Error::Invalid("Could not read root certificate".to_owned()));
			}

			let builder =
				rustls::ClientConfig::builder().with_safe_defaults().with_root_certificates(roots);
			let unreadable = || Error::Invalid("Could not read client certificates".to_owned());
			let config = match (&self.tls.client_key_path, &self.tls.client_certificate_path) {
				(Some(key_path), Some(cert_path)) => {
					let cert_pem = tokio::fs::read(cert_path).await?;
					let key_pem = tokio::fs::read(key_path).await?;
					let chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
						.map_err(|_| unreadable())?
						.into_iter()
						.map(rustls::Certificate)
						.collect();
					let key = rustls_pemfile::pkcs8_private_keys(&mut key_pem.as_slice())
						.map_err(|_| unreadable())?
						.into_iter()
						.next()
						.map(rustls::PrivateKey)
						.ok_or_else(|| {
							Error::Invalid("No PKCS8 key in client key file".to_owned())
						})?;
					builder.with_client_auth_cert(chain, key).map_err(|err| {
						Error::Invalid(format!("Could not use client certificates: {err}"))
					})?
				}
				(None, None) => builder.with_no_client_auth(),
				_ => Err(Error::Invalid(
					"Both a client certificate and key file in PKCS8 format must be specified"
						.to_owned(),
				))?,
			};
			settings = settings.set_config(Arc::new(config));
		}
		Ok(settings)
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::expect_used)]

	use std::{io::ErrorKind, path::PathBuf};

	use url::Url;

	use super::{DirectoryConfig, TLSConfig};
	use crate::{error, template, ConnectionConfig};

	#[test]
	fn defaults() {
		let config = DirectoryConfig::new(Url::parse("ldap://localhost:389").unwrap());
		assert_eq!(config.default_bind_dn, "cn=Directory Manager");
		assert_eq!(config.default_instance, "pki-tomcat");
		assert_eq!(config.database_dn(), "cn=kraroot,cn=ldbm database,cn=plugins,cn=config");
		assert_eq!(config.poll.interval, std::time::Duration::from_secs(1));

		let subs = config.substitutions();
		assert_eq!(subs[template::INSTANCE_TOKEN], "pki-tomcat");
		assert_eq!(subs[template::ROOT_SUFFIX_TOKEN], "o=pki-tomcat-KRA");
		assert!(subs[template::TIMESTAMP_TOKEN].parse::<i64>().is_ok());
	}

	#[test]
	fn database_dn_is_escaped() {
		let mut config = DirectoryConfig::new(Url::parse("ldap://localhost").unwrap());
		config.database = "odd,name".to_owned();
		assert_eq!(config.database_dn(), "cn=odd\\,name,cn=ldbm database,cn=plugins,cn=config");
	}

	#[tokio::test]
	async fn tls_config_errors() {
		let dir = tempfile::tempdir().unwrap();
		let not_a_cert = dir.path().join("not-a-cert.pem");
		tokio::fs::write(&not_a_cert, "hello").await.unwrap();

		// no certificate in file
		assert!(matches!(
			ConnectionConfig {
				tls: TLSConfig {
					root_certificates_path: Some(not_a_cert),
					..TLSConfig::default()
				},
				..ConnectionConfig::default()
			}
			.to_settings()
			.await
			.err()
			.unwrap(),
			error::Error::Invalid(_)
		));

		// invalid path test
		assert!(matches!(
			ConnectionConfig {
				tls: TLSConfig {
					root_certificates_path: Some(PathBuf::from("invalid_path")),
					..TLSConfig::default()
				},
				..ConnectionConfig::default()
			}
			.to_settings()
			.await
			.err()
			.unwrap(),
			error::Error::Io(io_err) if io_err.kind() == ErrorKind::NotFound
		));

		// no TLS customisation needed
		ConnectionConfig::default().to_settings().await.expect("plain settings");
	}
}
