//! Waiting for the directory server to finish a task.
//!
//! Adding an entry under `cn=tasks,cn=config` makes the server start work in
//! the background, and the server removes the entry again once that work is
//! done. The entry existing is the only state there is: a task is pending
//! while its entry can be found and complete once it cannot.
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
	config::PollConfig,
	directory::{Directory, SearchScope},
	dn::is_task_dn,
	error::Error,
};

/// State of a task as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	/// The task entry still exists.
	Pending,
	/// The task entry is gone.
	Done,
}

/// Look up the task entry once.
pub async fn check(directory: &mut dyn Directory, task_dn: &str) -> Result<TaskState, Error> {
	match directory.search(task_dn, SearchScope::Base, "(objectClass=*)").await {
		Ok(entries) if entries.is_empty() => Ok(TaskState::Done),
		Ok(_) => Ok(TaskState::Pending),
		Err(Error::NoSuchObject(_)) => Ok(TaskState::Done),
		Err(err) => Err(err),
	}
}

/// Wait until the server has removed the task entry `task_dn`.
///
/// The first check happens one `interval` after the call. With a `max_wait`
/// the wait ends in [`Error::Timeout`] once that much time has passed without
/// the entry disappearing; a `max_wait` too large to represent as a point in
/// time waits forever. Only DNs below `cn=tasks,cn=config` are accepted, any
/// other entry would never go away. `interval` must not be zero.
pub async fn wait_for_completion(
	directory: &mut dyn Directory,
	task_dn: &str,
	interval: Duration,
	max_wait: Option<Duration>,
) -> Result<(), Error> {
	if !is_task_dn(task_dn) {
		return Err(Error::NotATask(task_dn.to_owned()));
	}
	if interval.is_zero() {
		return Err(Error::Invalid("Poll interval must not be zero".to_owned()));
	}

	let started = Instant::now();
	let deadline = max_wait.and_then(|max_wait| started.checked_add(max_wait));
	let mut ticks = 0_u64;
	loop {
		match deadline {
			Some(deadline)
				if Instant::now().checked_add(interval).map_or(true, |next| next > deadline) =>
			{
				tokio::time::sleep_until(deadline).await;
				// One last look at the deadline itself.
				if check(directory, task_dn).await? == TaskState::Done {
					break;
				}
				return Err(Error::Timeout { dn: task_dn.to_owned(), waited: started.elapsed() });
			}
			_ => tokio::time::sleep(interval).await,
		}

		ticks += 1;
		if check(directory, task_dn).await? == TaskState::Done {
			break;
		}
		debug!("Task {task_dn} still pending after {ticks} checks");
	}
	info!("Task {task_dn} completed after {:?}", started.elapsed());
	Ok(())
}

/// [`wait_for_completion`] with the interval and deadline from `config`.
pub async fn wait_with(
	directory: &mut dyn Directory,
	task_dn: &str,
	config: &PollConfig,
) -> Result<(), Error> {
	wait_for_completion(directory, task_dn, config.interval, config.max_wait).await
}
