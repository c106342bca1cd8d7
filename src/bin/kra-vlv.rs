//! `kra-vlv` command line tool.
//!
//! Lists, adds, deletes and rebuilds the VLV indexes of a KRA instance.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::{
	io::{self, Write},
	path::PathBuf,
	process::ExitCode,
	time::Duration,
};

use clap::{Args, Parser, Subcommand};
use kra_vlv::{
	config::{
		DEFAULT_BIND_DN, DEFAULT_DATABASE, DEFAULT_INDEX_TEMPLATE, DEFAULT_INSTANCE,
		DEFAULT_TASK_TEMPLATE,
	},
	ldif, vlv, AddOutcome, ConflictPolicy, Connection, DirectoryConfig, Error,
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use url::Url;

/// Manage the VLV indexes of a KRA directory database.
#[derive(Parser, Debug)]
#[command(name = "kra-vlv", version, about, long_about = None)]
struct Cli {
	/// Directory server URL.
	#[arg(short = 'H', long, env = "KRA_VLV_URL", default_value = "ldap://localhost:389")]
	url: Url,

	/// Instance the indexes belong to.
	#[arg(short, long, env = "KRA_VLV_INSTANCE", default_value = DEFAULT_INSTANCE)]
	instance: String,

	/// DN to bind as.
	#[arg(short = 'D', long, env = "KRA_VLV_BIND_DN", default_value = DEFAULT_BIND_DN)]
	bind_dn: String,

	/// Password to bind with.
	#[arg(
		short = 'w',
		long,
		env = "KRA_VLV_BIND_PASSWORD",
		hide_env_values = true,
		conflicts_with = "bind_password_file"
	)]
	bind_password: Option<String>,

	/// File holding the password to bind with.
	#[arg(long)]
	bind_password_file: Option<PathBuf>,

	/// Backend database holding the KRA entries.
	#[arg(long, default_value = DEFAULT_DATABASE)]
	database: String,

	/// Root suffix of the KRA entries [default: o=<instance>-KRA].
	#[arg(long)]
	root_suffix: Option<String>,

	/// Use StartTLS on a plain LDAP connection.
	#[arg(long)]
	starttls: bool,

	/// PEM file with the CA certificates to trust.
	#[arg(long)]
	ca_cert: Option<PathBuf>,

	/// Log every directory operation.
	#[arg(short, long)]
	verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
enum Command {
	/// List the VLV entries of the instance.
	Find,
	/// Add the VLV indexes.
	Add(AddArgs),
	/// Delete the VLV indexes.
	Del(DelArgs),
	/// Rebuild the VLV indexes and wait for the server to finish.
	Reindex(ReindexArgs),
}

/// Arguments for `add`.
#[derive(Args, Debug)]
struct AddArgs {
	/// LDIF template defining the indexes.
	#[arg(long, default_value = DEFAULT_INDEX_TEMPLATE)]
	template: PathBuf,

	/// Only write the LDIF to this file, do not change the directory.
	#[arg(long, value_name = "PATH")]
	generate_ldif: Option<PathBuf>,

	/// Leave entries that already exist alone instead of failing.
	#[arg(long)]
	skip_existing: bool,
}

/// Arguments for `del`.
#[derive(Args, Debug)]
struct DelArgs {
	/// Indexes to delete (comma-separated) [default: all KRA indexes].
	#[arg(long = "index", value_delimiter = ',')]
	indexes: Vec<String>,

	/// Only write the LDIF to this file, do not change the directory.
	#[arg(long, value_name = "PATH")]
	generate_ldif: Option<PathBuf>,
}

/// Arguments for `reindex`.
#[derive(Args, Debug)]
struct ReindexArgs {
	/// LDIF template defining the reindex tasks.
	#[arg(long, default_value = DEFAULT_TASK_TEMPLATE)]
	template: PathBuf,

	/// Only write the LDIF to this file, do not change the directory.
	#[arg(long, value_name = "PATH")]
	generate_ldif: Option<PathBuf>,

	/// Wait for tasks that already exist instead of failing.
	#[arg(long)]
	skip_existing: bool,

	/// Seconds to wait for each task before giving up, 0 waits forever.
	#[arg(long, default_value_t = 300)]
	max_wait: u64,

	/// Seconds between two checks of a task.
	#[arg(long, default_value_t = 1.0)]
	poll_interval: f64,
}

fn main() -> ExitCode {
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(err) => {
			let status = usage(&err, &mut io::stdout()).unwrap_or(1);
			return ExitCode::from(status);
		}
	};

	let default_level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
	let filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => {
			eprintln!("Failed to create async runtime: {e}");
			return ExitCode::FAILURE;
		}
	};

	match runtime.block_on(run(cli)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("Error: {e}");
			ExitCode::FAILURE
		}
	}
}

/// Print a command line error with the usage, or the requested help or
/// version text, to `out`. Returns the status to exit with.
fn usage(err: &clap::Error, out: &mut impl Write) -> io::Result<u8> {
	write!(out, "{}", err.render())?;
	out.flush()?;
	Ok(u8::try_from(err.exit_code()).unwrap_or(2))
}

/// Build the directory configuration from the global options.
async fn directory_config(cli: &Cli) -> Result<DirectoryConfig, Error> {
	let mut config = DirectoryConfig::new(cli.url.clone());
	config.default_bind_dn = cli.bind_dn.clone();
	config.default_bind_password = match &cli.bind_password_file {
		Some(path) => {
			let password = tokio::fs::read_to_string(path).await?;
			Some(password.trim_end_matches(['\r', '\n']).to_owned())
		}
		None => cli.bind_password.clone(),
	};
	config.default_instance = cli.instance.clone();
	config.database = cli.database.clone();
	config.root_suffix =
		cli.root_suffix.clone().unwrap_or_else(|| format!("o={}-KRA", cli.instance));
	config.connection.tls.starttls = cli.starttls;
	config.connection.tls.root_certificates_path = cli.ca_cert.clone();
	Ok(config)
}

/// The conflict policy selected by `--skip-existing`.
fn conflict_policy(skip_existing: bool) -> ConflictPolicy {
	if skip_existing {
		ConflictPolicy::Skip
	} else {
		ConflictPolicy::Fail
	}
}

/// Print what happened to each added entry.
fn report_added(outcomes: &[AddOutcome]) {
	let skipped = outcomes.iter().filter(|o| matches!(o, AddOutcome::Skipped(_))).count();
	println!("{} entries added, {skipped} already present", outcomes.len() - skipped);
}

/// Execute the parsed command line.
async fn run(cli: Cli) -> Result<(), Error> {
	let mut config = directory_config(&cli).await?;

	match &cli.command {
		Command::Find => {
			let mut connection = Connection::open(&config, None, None).await?;
			let result = vlv::find_indexes(&mut connection, &config).await;
			let entries = connection.close_with(result).await?;
			print!("{}", ldif::write_entries(&entries));
			println!("{} VLV entries found", entries.len());
		}
		Command::Add(args) => {
			if let Some(output) = &args.generate_ldif {
				let count = vlv::generate_add_ldif(&config, &args.template, output).await?;
				println!("{count} VLV entries written to {}", output.display());
				return Ok(());
			}
			let policy = conflict_policy(args.skip_existing);
			let mut connection = Connection::open(&config, None, None).await?;
			let result = vlv::add_indexes(&mut connection, &config, &args.template, policy).await;
			report_added(&connection.close_with(result).await?);
		}
		Command::Del(args) => {
			let names: Vec<&str> = if args.indexes.is_empty() {
				vlv::KRA_VLV_INDEXES.to_vec()
			} else {
				args.indexes.iter().map(String::as_str).collect()
			};
			if let Some(output) = &args.generate_ldif {
				let count = vlv::generate_delete_ldif(
					&names,
					&config.default_instance,
					&config.database,
					output,
				)
				.await?;
				println!("{count} deletions written to {}", output.display());
				return Ok(());
			}
			let mut connection = Connection::open(&config, None, None).await?;
			let result = vlv::delete_indexes(
				&mut connection,
				&names,
				&config.default_instance,
				&config.database,
			)
			.await;
			let outcomes = connection.close_with(result).await?;
			let deleted = outcomes.iter().filter(|outcome| outcome.is_deleted()).count();
			println!("{deleted} entries deleted, {} already absent", outcomes.len() - deleted);
		}
		Command::Reindex(args) => {
			if let Some(output) = &args.generate_ldif {
				let count = vlv::generate_add_ldif(&config, &args.template, output).await?;
				println!("{count} reindex tasks written to {}", output.display());
				return Ok(());
			}
			config.poll.interval = Duration::try_from_secs_f64(args.poll_interval)
				.ok()
				.filter(|interval| !interval.is_zero())
				.ok_or_else(|| {
					Error::Invalid(format!("Bad poll interval {}", args.poll_interval))
				})?;
			config.poll.max_wait =
				(args.max_wait > 0).then(|| Duration::from_secs(args.max_wait));
			let policy = conflict_policy(args.skip_existing);
			let mut connection = Connection::open(&config, None, None).await?;
			let result = vlv::reindex(&mut connection, &config, &args.template, policy).await;
			let outcomes = connection.close_with(result).await?;
			println!("{} reindex tasks completed", outcomes.len());
		}
	}
	Ok(())
}
