use super::{Condition, ThreadShared, Trap};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Longest single sleep while blocked, so cancellation gets noticed even without a wakeup
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Intrinsic lock attached to an object, with a wait set
///
/// Threads are identified by their machine thread id. The lock is reentrant: the owner can enter
/// it any number of times and must exit it the same number of times.
#[derive(Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,

    /// Signalled whenever the lock becomes free
    released: Condvar,

    /// Signalled on notify and on interrupt
    wakeup: Condvar,
}

#[derive(Default)]
struct MonitorState {
    owner: Option<u32>,
    count: u32,
    waiters: Vec<Waiter>,
    next_ticket: u64,
}

struct Waiter {
    ticket: u64,
    notified: bool,
}

/// Outcome of [`Monitor::wait`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Notified,
    Interrupted,
    TimedOut,
}

fn not_owner(action: &str) -> Trap {
    Trap::condition(
        Condition::IllegalMonitorState,
        format!("cannot {} a monitor that is not held", action),
    )
}

impl Monitor {
    pub fn new() -> Monitor {
        Monitor::default()
    }

    /// Acquire the lock, blocking while another thread holds it
    ///
    /// Fails only if the thread is told to terminate while blocked.
    pub fn enter(&self, thread: &ThreadShared) -> Result<(), Trap> {
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(thread.id);
                    state.count = 1;
                    return Ok(());
                }
                Some(owner) if owner == thread.id => {
                    state.count += 1;
                    return Ok(());
                }
                Some(_) => {
                    if thread.should_terminate() {
                        return Err(Trap::Exit);
                    }
                    self.released.wait_for(&mut state, POLL_SLICE);
                }
            }
        }
    }

    /// Release one level of the lock
    ///
    /// An unchecked exit releases even when the caller is not the owner (used when the machine
    /// forcibly tears threads down).
    pub fn exit(&self, thread: u32, checked: bool) -> Result<(), Trap> {
        let mut state = self.state.lock();
        if state.owner != Some(thread) && (checked || state.owner.is_none()) {
            return Err(not_owner("exit"));
        }
        state.count = state.count.saturating_sub(1);
        if state.count == 0 {
            state.owner = None;
            self.released.notify_one();
        }
        Ok(())
    }

    /// Release the lock fully, wait for a notification, then reacquire it at the same depth
    ///
    /// A zero timeout waits forever.
    pub fn wait(&self, thread: &ThreadShared, millis: i64, nanos: i32) -> Result<WaitStatus, Trap> {
        let mut state = self.state.lock();
        if state.owner != Some(thread.id) {
            return Err(not_owner("wait on"));
        }
        if thread.take_interrupt() {
            return Ok(WaitStatus::Interrupted);
        }

        let timeout =
            Duration::from_millis(millis.max(0) as u64) + Duration::from_nanos(nanos.max(0) as u64);
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push(Waiter {
            ticket,
            notified: false,
        });
        let saved_count = state.count;
        state.owner = None;
        state.count = 0;
        self.released.notify_one();

        let status = loop {
            let notified = state
                .waiters
                .iter()
                .any(|waiter| waiter.ticket == ticket && waiter.notified);
            if notified {
                break WaitStatus::Notified;
            }
            if thread.take_interrupt() {
                break WaitStatus::Interrupted;
            }
            if thread.should_terminate() {
                break WaitStatus::Interrupted;
            }
            let slice = match deadline {
                None => POLL_SLICE,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break WaitStatus::TimedOut;
                    }
                    POLL_SLICE.min(deadline - now)
                }
            };
            self.wakeup.wait_for(&mut state, slice);
        };
        state.waiters.retain(|waiter| waiter.ticket != ticket);

        while state.owner.is_some() {
            self.released.wait_for(&mut state, POLL_SLICE);
        }
        state.owner = Some(thread.id);
        state.count = saved_count;

        if thread.should_terminate() {
            return Err(Trap::Exit);
        }
        Ok(status)
    }

    /// Wake one (or all) waiting threads
    pub fn notify(&self, thread: u32, all: bool) -> Result<(), Trap> {
        let mut state = self.state.lock();
        if state.owner != Some(thread) {
            return Err(not_owner("notify"));
        }
        for waiter in state.waiters.iter_mut().filter(|waiter| !waiter.notified) {
            waiter.notified = true;
            if !all {
                break;
            }
        }
        self.wakeup.notify_all();
        Ok(())
    }

    /// Nudge waiting threads so they recheck their interrupt flags
    pub fn wake_waiters(&self) {
        let _state = self.state.lock();
        self.wakeup.notify_all();
    }

    pub fn is_held_by(&self, thread: u32) -> bool {
        self.state.lock().owner == Some(thread)
    }

    /// Number of threads currently in the wait set
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reentrant_enter_exit() {
        let monitor = Monitor::new();
        let me = ThreadShared::new(1, "main");
        monitor.enter(&me).unwrap();
        monitor.enter(&me).unwrap();
        monitor.exit(1, true).unwrap();
        assert!(monitor.is_held_by(1), "still held once");
        monitor.exit(1, true).unwrap();
        assert!(!monitor.is_held_by(1));
        assert!(
            matches!(
                monitor.exit(1, true),
                Err(Trap::Condition(Condition::IllegalMonitorState, _))
            ),
            "exit when not held"
        );
    }

    #[test]
    fn wait_times_out() {
        let monitor = Monitor::new();
        let me = ThreadShared::new(1, "main");
        monitor.enter(&me).unwrap();
        let status = monitor.wait(&me, 20, 0).unwrap();
        assert_eq!(status, WaitStatus::TimedOut);
        assert!(monitor.is_held_by(1), "lock reacquired after wait");
    }

    #[test]
    fn wait_requires_ownership() {
        let monitor = Monitor::new();
        let me = ThreadShared::new(1, "main");
        assert!(monitor.wait(&me, 1, 0).is_err());
        assert!(monitor.notify(1, false).is_err());
    }

    #[test]
    fn notify_wakes_waiter() {
        let monitor = Arc::new(Monitor::new());
        let waiter = Arc::new(ThreadShared::new(2, "waiter"));

        let handle = {
            let monitor = monitor.clone();
            let waiter = waiter.clone();
            thread::spawn(move || {
                monitor.enter(&waiter).unwrap();
                let status = monitor.wait(&waiter, 0, 0).unwrap();
                monitor.exit(waiter.id, true).unwrap();
                status
            })
        };

        let me = ThreadShared::new(1, "main");
        loop {
            monitor.enter(&me).unwrap();
            if monitor.waiting() == 1 {
                monitor.notify(1, false).unwrap();
                monitor.exit(1, true).unwrap();
                break;
            }
            monitor.exit(1, true).unwrap();
            thread::yield_now();
        }
        assert_eq!(handle.join().unwrap(), WaitStatus::Notified);
    }

    #[test]
    fn interrupt_ends_wait() {
        let monitor = Arc::new(Monitor::new());
        let waiter = Arc::new(ThreadShared::new(2, "waiter"));

        let handle = {
            let monitor = monitor.clone();
            let waiter = waiter.clone();
            thread::spawn(move || {
                monitor.enter(&waiter).unwrap();
                let status = monitor.wait(&waiter, 0, 0).unwrap();
                monitor.exit(waiter.id, true).unwrap();
                status
            })
        };

        while monitor.waiting() == 0 {
            thread::yield_now();
        }
        waiter.interrupt();
        monitor.wake_waiters();
        assert_eq!(handle.join().unwrap(), WaitStatus::Interrupted);
    }
}
