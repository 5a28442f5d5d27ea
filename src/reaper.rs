//! Child-process reap policy (spec §4.11 "Quit & lifecycle"). On client
//! shutdown, wait for the child with a bounded timeout, then escalate to a
//! graceful terminate, then a hard kill — logging a warning at each
//! escalation step, matching the original's `wait`/`terminate`/`kill`
//! sequence.

use std::process::Child;
use std::time::{Duration, Instant};

/// The reap timeout escalation (spec §9 Open Question 2: "magic numbers;
/// treat as configurable").
#[derive(Debug, Clone, Copy)]
pub struct ReapPolicy {
	pub wait: Duration,
	pub terminate_grace: Duration,
	pub kill_grace: Duration,
}

impl Default for ReapPolicy {
	fn default() -> Self {
		Self { wait: Duration::from_secs(5), terminate_grace: Duration::from_secs(1), kill_grace: Duration::from_secs(1) }
	}
}

/// Poll `child` for up to `policy.wait`, escalating to a graceful signal
/// and finally a hard kill if it doesn't exit on its own (spec §4.11).
/// Returns once the child has actually exited, or once a hard kill has
/// been issued and given its grace period (a child that survives a kill
/// signal is a kernel-level anomaly this policy does not chase further).
pub fn reap(child: &mut Child, policy: &ReapPolicy) {
	if poll_until_exited(child, policy.wait) {
		return;
	}

	tracing::warn!(pid = child.id(), "child did not exit within the reap wait window, sending terminate");
	terminate(child);
	if poll_until_exited(child, policy.terminate_grace) {
		return;
	}

	tracing::warn!(pid = child.id(), "child survived terminate, sending kill");
	if let Err(e) = child.kill() {
		tracing::warn!(pid = child.id(), error = %e, "failed to send kill to child");
	}
	poll_until_exited(child, policy.kill_grace);
}

fn poll_until_exited(child: &mut Child, timeout: Duration) -> bool {
	let deadline = Instant::now() + timeout;
	loop {
		match child.try_wait() {
			Ok(Some(_status)) => return true,
			Ok(None) => {}
			Err(e) => {
				tracing::warn!(pid = child.id(), error = %e, "failed to poll child status");
				return false;
			}
		}
		if Instant::now() >= deadline {
			return false;
		}
		std::thread::sleep(Duration::from_millis(50).min(timeout));
	}
}

/// A graceful request to exit: `SIGTERM` on unix, a hard kill on windows
/// (which has no equivalent soft-termination signal for an arbitrary
/// child process — the original's `terminate()`/`kill()` distinction
/// collapses to one step there).
#[cfg(unix)]
fn terminate(child: &Child) {
	let pid = child.id() as libc::pid_t;
	if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
		tracing::warn!(pid = child.id(), error = %std::io::Error::last_os_error(), "failed to send SIGTERM to child");
	}
}

#[cfg(windows)]
fn terminate(child: &mut Child) {
	if let Err(e) = child.kill() {
		tracing::warn!(pid = child.id(), error = %e, "failed to terminate child");
	}
}
