use std::io;
use std::mem;

use libc::{
	MCL_CURRENT,
	MCL_FUTURE,
	SCHED_FIFO,
	c_int,
	mlockall,
	munlockall,
	sched_get_priority_max,
	sched_getparam,
	sched_getscheduler,
	sched_param,
	sched_setscheduler,
};

/// Closest thing to "interrupts off" in user space: run the calling thread
/// with the highest FIFO priority and keep its memory resident. Restores the
/// previous scheduling policy when dropped.
///
/// Needs CAP_SYS_NICE and CAP_IPC_LOCK; without them the guard only logs a
/// warning and the transfer runs with normal scheduling.
pub struct RealtimeGuard {
	previous: Option<(c_int, sched_param)>,
	locked: bool,
}

impl RealtimeGuard {
	pub fn enter() -> Self {
		let previous = unsafe {
			let policy = sched_getscheduler(0);
			let mut param: sched_param = mem::zeroed();
			if -1 == policy || 0 != sched_getparam(0, &mut param) {
				warn!("couldn't query scheduling policy: {}", io::Error::last_os_error());
				None
			} else {
				let mut realtime: sched_param = mem::zeroed();
				realtime.sched_priority = sched_get_priority_max(SCHED_FIFO);
				if 0 != sched_setscheduler(0, SCHED_FIFO, &realtime) {
					warn!("couldn't switch to realtime scheduling: {}", io::Error::last_os_error());
					None
				} else {
					Some((policy, param))
				}
			}
		};

		let locked = 0 == unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
		if !locked {
			warn!("couldn't lock memory: {}", io::Error::last_os_error());
		}

		RealtimeGuard {
			previous,
			locked,
		}
	}
}

impl Drop for RealtimeGuard {
	fn drop(&mut self) {
		if let Some((policy, param)) = self.previous.take() {
			if 0 != unsafe { sched_setscheduler(0, policy, &param) } {
				error!("couldn't restore scheduling policy: {}", io::Error::last_os_error());
			}
		}
		if self.locked {
			unsafe { munlockall() };
		}
	}
}
