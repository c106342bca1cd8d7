//! Manage the VLV indexes of a KRA's directory database.
//!
//! A KRA keeps its keys and requests in an LDAP directory (389 Directory
//! Server). Browsing them page by page relies on VLV (virtual list view)
//! indexes, which are themselves entries in the server's configuration tree.
//! This library adds, lists, removes and rebuilds those entries from LDIF
//! templates:
//!
//! 1. the template is customized for the deployment (instance, database, root
//!    suffix) by [`template::customize`],
//! 2. the result is parsed by [`ldif::parse`],
//! 3. the entries are added in file order by [`apply::apply`],
//! 4. for reindex tasks, [`poll::wait_for_completion`] waits until the server
//!    has removed each task entry, which it does once the task has run.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use url::Url;
//! use kra_vlv::{vlv, ConflictPolicy, Connection, DirectoryConfig};
//!
//! let mut config = DirectoryConfig::new(Url::parse("ldap://localhost:389")?);
//! config.default_bind_password = Some("Secret.123".to_owned());
//!
//! let mut connection = Connection::open(&config, None, None).await?;
//! let template = config.templates.tasks.clone();
//! let result = vlv::reindex(&mut connection, &config, &template, ConflictPolicy::Fail).await;
//! let outcomes = connection.close_with(result).await?;
//! println!("Ran {} reindex tasks", outcomes.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Only add records are read from LDIF; modify and modrdn records are
//!   rejected.
//! * Applying LDIF is not transactional. When an add fails, the entries added
//!   before it stay in the directory.

pub mod apply;
pub mod config;
pub mod directory;
pub mod dn;
pub mod entry;
pub mod error;
pub mod ldif;
pub mod poll;
pub mod template;
pub mod vlv;

pub use ldap3;

pub use crate::{
	apply::{AddOutcome, ConflictPolicy},
	config::{ConnectionConfig, DirectoryConfig, PollConfig, TLSConfig, TemplateConfig},
	directory::{Connection, Directory, SearchScope},
	entry::{Attributes, Entry},
	error::Error,
	vlv::DeleteOutcome,
};
