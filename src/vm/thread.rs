use super::syscall::SYSTEM_CALL_COUNT;
use super::{Activation, Class, Frame, Machine, Method, ObjectRef, Trap, Value};
use log::{debug, error};
use parking_lot::Mutex;
use std::backtrace::Backtrace;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Externally visible state of a guest thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    Running = 0,
    Waiting = 1,
    Terminated = 2,
}

/// Part of a thread that other threads (and the host) may touch
///
/// Everything here is either atomic or behind its own lock, since interrupts and exit requests
/// arrive asynchronously.
#[derive(Debug)]
pub struct ThreadShared {
    pub id: u32,
    pub name: String,
    interrupted: AtomicBool,
    terminate: AtomicBool,
    signaled_exit: AtomicBool,
    priority: AtomicU8,
    status: AtomicU8,

    /// Error code of the last invocation of each system call
    errors: Mutex<[i32; SYSTEM_CALL_COUNT]>,

    /// Object whose monitor the thread is waiting on, so interrupts can wake it
    waiting_on: Mutex<Option<ObjectRef>>,
}

impl ThreadShared {
    pub const NORMAL_PRIORITY: u8 = 5;

    pub fn new(id: u32, name: impl Into<String>) -> ThreadShared {
        ThreadShared {
            id,
            name: name.into(),
            interrupted: AtomicBool::new(false),
            terminate: AtomicBool::new(false),
            signaled_exit: AtomicBool::new(false),
            priority: AtomicU8::new(Self::NORMAL_PRIORITY),
            status: AtomicU8::new(ThreadStatus::Running as u8),
            errors: Mutex::new([0; SYSTEM_CALL_COUNT]),
            waiting_on: Mutex::new(None),
        }
    }

    /// Flag the thread as interrupted
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Read and clear the interrupt flag
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    /// Ask the thread to stop at its next step
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Record that this thread is the one that asked the machine to exit
    pub fn signal_exit(&self) {
        self.signaled_exit.store(true, Ordering::SeqCst);
    }

    pub fn signaled_exit(&self) -> bool {
        self.signaled_exit.load(Ordering::SeqCst)
    }

    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }

    pub(crate) fn set_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn status(&self) -> ThreadStatus {
        match self.status.load(Ordering::SeqCst) {
            0 => ThreadStatus::Running,
            1 => ThreadStatus::Waiting,
            _ => ThreadStatus::Terminated,
        }
    }

    pub(crate) fn set_status(&self, status: ThreadStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Error recorded for a system call (out of range indices share slot 0)
    pub fn error(&self, call: usize) -> i32 {
        let errors = self.errors.lock();
        errors.get(call).copied().unwrap_or(errors[0])
    }

    /// Replace the error recorded for a system call, returning the previous one
    pub fn set_error(&self, call: usize, code: i32) -> i32 {
        let mut errors = self.errors.lock();
        let index = if call < SYSTEM_CALL_COUNT { call } else { 0 };
        std::mem::replace(&mut errors[index], code)
    }

    pub(crate) fn set_waiting_on(&self, object: Option<ObjectRef>) {
        *self.waiting_on.lock() = object;
    }

    pub fn waiting_on(&self) -> Option<ObjectRef> {
        self.waiting_on.lock().clone()
    }
}

/// Guest thread, driven by exactly one host thread
///
/// The frame stack is owned here and never shared; other threads only ever see the
/// [`ThreadShared`] half.
pub struct Thread {
    pub machine: Arc<Machine>,
    pub shared: Arc<ThreadShared>,
    pub frames: Vec<Frame>,

    /// Frames popped while the current exception was propagating, innermost first
    pub(crate) unwind_trace: Vec<String>,

    /// Guest frames at the point a fatal error was first seen
    pub(crate) fatal_trace: Option<Vec<String>>,

    /// Exception that escaped every frame
    pub(crate) uncaught: Option<ObjectRef>,

    /// Set while the uncaught exception hook runs, so it cannot recurse
    pub(crate) in_uncaught_hook: bool,

    /// A fatal error has already been dumped for this thread
    pub(crate) fatal_reported: bool,
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.shared.set_status(ThreadStatus::Terminated);
        self.machine.forget_thread(self.shared.id);
    }
}

impl Thread {
    pub fn new(machine: Arc<Machine>, shared: Arc<ThreadShared>) -> Thread {
        Thread {
            machine,
            shared,
            frames: vec![],
            unwind_trace: vec![],
            fatal_trace: None,
            uncaught: None,
            in_uncaught_hook: false,
            fatal_reported: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.shared.id
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&mut self) -> Result<&mut Frame, Trap> {
        self.frames
            .last_mut()
            .ok_or_else(|| Trap::fatal("no frame to execute in"))
    }

    /// Class of the innermost non-blank frame (the context for access checks)
    pub fn current_class(&self) -> Option<Arc<Class>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.activation.as_ref())
            .map(|activation| activation.class.clone())
    }

    /// Innermost non-blank activation
    pub fn current_activation(&self) -> Option<&Activation> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.activation.as_ref())
    }

    /// Push a frame for a method with a body
    pub fn enter_frame(
        &mut self,
        class: Arc<Class>,
        method: Arc<Method>,
        arguments: Vec<Value>,
    ) -> Result<(), Trap> {
        debug!("Entering {} at depth {}", method, self.frames.len());
        let frame = Frame::new(class, method, arguments)?;
        self.frames.push(frame);
        Ok(())
    }

    /// Push a frame that only receives a result
    pub fn enter_blank_frame(&mut self) {
        self.frames.push(Frame::blank());
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Drop every frame without running handlers
    pub fn exit_all_frames(&mut self) {
        debug!(
            "Thread {} unwinding {} frames on exit",
            self.shared.id,
            self.frames.len()
        );
        self.frames.clear();
    }

    /// Exception that escaped the thread, if any
    pub fn uncaught_exception(&self) -> Option<&ObjectRef> {
        self.uncaught.as_ref()
    }

    /// Guest frames, innermost first
    pub fn stack_trace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .filter(|frame| !frame.is_blank())
            .map(Frame::describe)
            .collect()
    }

    /// Write the host and guest traces to the machine's error sink
    pub fn print_stack_trace(&self, headline: &str, guest_frames: &[String]) {
        let host = Backtrace::force_capture();
        let mut out = self.machine.settings.stderr.lock();
        if let Err(err) = write_traces(&mut *out, headline, &host, guest_frames) {
            error!("Could not write stack trace: {}", err);
        }
    }
}

fn write_traces(
    out: &mut dyn Write,
    headline: &str,
    host: &Backtrace,
    guest_frames: &[String],
) -> std::io::Result<()> {
    writeln!(out, "{}", headline)?;
    writeln!(out, "*** EXTERNAL STACK TRACE ***")?;
    writeln!(out, "{}", host)?;
    writeln!(out, "*** INTERNAL STACK TRACE ***")?;
    for frame in guest_frames {
        writeln!(out, "\tat {}", frame)?;
    }
    out.flush()
}
