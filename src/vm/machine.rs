use super::{
    ClassLibrary, ClassLoader, CoreLibrary, Error, Field, NativeRegistry, Object, ObjectRef,
    Settings, Thread, ThreadShared, ThreadStatus, Trap, Value,
};
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use crate::util::RefId;
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// State guarded by the machine lock
///
/// The lock is reentrant because class initialization holds it while running guest code, and
/// that code may intern strings or initialize further classes on the same thread.
#[derive(Default)]
pub(crate) struct Globals {
    pub statics: HashMap<RefId<Field>, Value>,
    pub interned: HashMap<String, ObjectRef>,
    pub class_objects: HashMap<BinaryName, ObjectRef>,
    pub class_names: HashMap<RefId<Object>, BinaryName>,
}

/// Bidirectional table handing out small positive ids, starting at 1
struct IdTable<T> {
    ids: HashMap<T, i32>,
    entries: Vec<T>,
}

impl<T: Hash + Eq + Clone> IdTable<T> {
    fn new() -> IdTable<T> {
        IdTable {
            ids: HashMap::new(),
            entries: vec![],
        }
    }

    fn id_of(&mut self, entry: &T) -> i32 {
        if let Some(id) = self.ids.get(entry) {
            return *id;
        }
        self.entries.push(entry.clone());
        let id = self.entries.len() as i32;
        self.ids.insert(entry.clone(), id);
        id
    }

    fn get(&self, id: i32) -> Option<&T> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }
}

/// One guest virtual machine
pub struct Machine {
    pub settings: Settings,
    pub loader: ClassLoader,
    pub natives: NativeRegistry,

    globals: ReentrantMutex<RefCell<Globals>>,

    /// Objects handed out as integer pointers (these stay reachable for the machine's lifetime)
    pointers: Mutex<IdTable<RefId<Object>>>,

    /// Strings handed out by id to the introspection system calls
    strings: Mutex<IdTable<String>>,

    threads: Mutex<HashMap<u32, Arc<ThreadShared>>>,
    next_thread_id: AtomicU32,
    exit_status: Mutex<Option<i32>>,
    started: Instant,
    allocated: AtomicU64,
}

impl Machine {
    /// Machine over some libraries, with the built-in classes and natives available
    pub fn new(libraries: Vec<Arc<dyn ClassLibrary>>, settings: Settings) -> Arc<Machine> {
        Machine::with_natives(libraries, settings, NativeRegistry::with_builtins())
    }

    /// Machine with a custom native table (which should still include the built-in bindings)
    pub fn with_natives(
        libraries: Vec<Arc<dyn ClassLibrary>>,
        settings: Settings,
        natives: NativeRegistry,
    ) -> Arc<Machine> {
        let mut class_path: Vec<Arc<dyn ClassLibrary>> = vec![Arc::new(CoreLibrary::new())];
        class_path.extend(libraries);
        debug!(
            "New machine over {} libraries with {} native bindings (depth {})",
            class_path.len(),
            natives.len(),
            settings.guest_depth
        );
        Arc::new(Machine {
            settings,
            loader: ClassLoader::new(class_path),
            natives,
            globals: ReentrantMutex::new(RefCell::new(Globals::default())),
            pointers: Mutex::new(IdTable::new()),
            strings: Mutex::new(IdTable::new()),
            threads: Mutex::new(HashMap::new()),
            next_thread_id: AtomicU32::new(1),
            exit_status: Mutex::new(None),
            started: Instant::now(),
            allocated: AtomicU64::new(0),
        })
    }

    pub(crate) fn global_lock(&self) -> ReentrantMutexGuard<'_, RefCell<Globals>> {
        self.globals.lock()
    }

    /// Current value of a static field (its default if never written)
    pub fn get_static(&self, field: &Arc<Field>) -> Value {
        let globals = self.global_lock();
        let value = globals
            .borrow()
            .statics
            .get(&RefId(field.clone()))
            .cloned();
        value.unwrap_or_else(|| Value::default_for(&field.descriptor))
    }

    pub fn set_static(&self, field: &Arc<Field>, value: Value) {
        let globals = self.global_lock();
        globals
            .borrow_mut()
            .statics
            .insert(RefId(field.clone()), value);
    }

    /// Stable integer for an object, 0 for `null`
    pub fn object_to_pointer(&self, object: Option<&ObjectRef>) -> i32 {
        match object {
            None => 0,
            Some(object) => self.pointers.lock().id_of(&RefId(object.clone())),
        }
    }

    /// Object previously handed out as a pointer
    pub fn pointer_to_object(&self, pointer: i32) -> Option<ObjectRef> {
        self.pointers
            .lock()
            .get(pointer)
            .map(|object| object.0.clone())
    }

    /// Stable positive id for a host string
    pub fn string_id(&self, text: &str) -> i32 {
        self.strings.lock().id_of(&text.to_string())
    }

    pub fn string_by_id(&self, id: i32) -> Option<String> {
        self.strings.lock().get(id).cloned()
    }

    pub(crate) fn record_allocation(&self, bytes: u64) {
        self.allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Estimated bytes allocated so far
    pub fn memory_used(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Time since the machine was created
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Register a new guest thread (with no frames yet)
    ///
    /// A thread created after the machine started exiting is told to terminate right away.
    pub fn new_thread(self: &Arc<Self>, name: &str) -> Thread {
        let id = self.next_thread_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::new(ThreadShared::new(id, name));
        if self.exit_status().is_some() {
            shared.request_terminate();
        }
        self.threads.lock().insert(id, shared.clone());
        debug!("Registered thread {} ({})", id, name);
        Thread::new(self.clone(), shared)
    }

    /// Run an entry point on the calling host thread
    pub fn run_main(
        self: &Arc<Self>,
        entry: &EntryPoint,
        arguments: &[String],
    ) -> Result<(), Error> {
        let mut thread = self.new_thread("main");
        let result = thread.run_entry(entry, arguments);
        self.finish_thread(&thread.shared, &result);
        result
    }

    /// Run an entry point on a new host thread
    pub fn start_thread(
        self: &Arc<Self>,
        entry: EntryPoint,
        arguments: Vec<String>,
    ) -> Result<ThreadHandle, Error> {
        let name = format!("{}.{}", entry.class.to_source_name(), entry.method);
        let mut thread = self.new_thread(&name);
        let shared = thread.shared.clone();
        let machine = self.clone();
        let spawned = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = thread.run_entry(&entry, &arguments);
                machine.finish_thread(&thread.shared, &result);
                result
            });
        match spawned {
            Ok(join) => Ok(ThreadHandle { shared, join }),
            Err(err) => {
                shared.set_status(ThreadStatus::Terminated);
                Err(Error::Fatal(format!("could not start host thread: {}", err)))
            }
        }
    }

    fn finish_thread(&self, shared: &ThreadShared, result: &Result<(), Error>) {
        shared.set_status(ThreadStatus::Terminated);
        match result {
            Ok(()) => info!("Thread {} ({}) finished", shared.id, shared.name),
            Err(err) => info!("Thread {} ({}) stopped: {}", shared.id, shared.name, err),
        }
    }

    fn thread(&self, id: u32) -> Result<Arc<ThreadShared>, Error> {
        self.threads
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("no thread with id {}", id)))
    }

    /// Interrupt a thread, waking it if it is blocked in `wait`
    pub fn interrupt(&self, id: u32) -> Result<(), Error> {
        let shared = self.thread(id)?;
        shared.interrupt();
        if let Some(object) = shared.waiting_on() {
            object.monitor().wake_waiters();
        }
        Ok(())
    }

    /// Change a thread's priority (advisory only; must be within 1..=10)
    pub fn set_priority(&self, id: u32, priority: i32) -> Result<(), Error> {
        let shared = self.thread(id)?;
        match u8::try_from(priority) {
            Ok(priority @ 1..=10) => {
                shared.set_priority(priority);
                Ok(())
            }
            _ => Err(Error::InvalidArgument(format!(
                "thread priority {} is out of range",
                priority
            ))),
        }
    }

    /// Status of a thread; ids that were handed out but are no longer registered have terminated
    pub fn thread_status(&self, id: u32) -> Option<ThreadStatus> {
        if let Some(shared) = self.threads.lock().get(&id) {
            return Some(shared.status());
        }
        let issued = id > 0 && id < self.next_thread_id.load(Ordering::SeqCst);
        issued.then_some(ThreadStatus::Terminated)
    }

    /// Number of threads whose `Thread` is still alive
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Remove a thread from the registry once its `Thread` is dropped
    pub(crate) fn forget_thread(&self, id: u32) {
        if self.threads.lock().remove(&id).is_some() {
            trace!("Forgot thread {}", id);
        }
    }

    /// Ask every thread to stop, recording the exit status if this is the first request
    pub fn exit(&self, code: i32) {
        {
            let mut status = self.exit_status.lock();
            let previous = *status;
            match previous {
                None => {
                    info!("Machine exiting with status {}", code);
                    *status = Some(code);
                }
                Some(first) if first != code => {
                    warn!("Ignoring exit status {}, already exiting with {}", code, first)
                }
                Some(_) => (),
            }
        }
        let threads: Vec<Arc<ThreadShared>> = self.threads.lock().values().cloned().collect();
        for shared in threads {
            shared.request_terminate();
            if let Some(object) = shared.waiting_on() {
                object.monitor().wake_waiters();
            }
        }
    }

    pub fn exit_status(&self) -> Option<i32> {
        *self.exit_status.lock()
    }
}

/// Static method a thread starts in
#[derive(Clone, Debug)]
pub struct EntryPoint {
    pub class: BinaryName,
    pub method: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl EntryPoint {
    pub fn new(class: BinaryName, method: UnqualifiedName, descriptor: MethodDescriptor) -> Self {
        EntryPoint {
            class,
            method,
            descriptor,
        }
    }

    /// `main([Ljava/lang/String;)V`
    pub fn main(class: BinaryName) -> EntryPoint {
        EntryPoint {
            class,
            method: UnqualifiedName::MAIN,
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::array(FieldType::object(BinaryName::STRING))],
                return_type: None,
            },
        }
    }
}

/// Guest thread running on its own host thread
pub struct ThreadHandle {
    pub shared: Arc<ThreadShared>,
    join: JoinHandle<Result<(), Error>>,
}

impl ThreadHandle {
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// Wait for the thread to finish
    pub fn join(self) -> Result<(), Error> {
        self.join
            .join()
            .map_err(|_| Error::Fatal(format!("host thread for {} panicked", self.shared.name)))?
    }
}

impl Thread {
    /// Run an entry point to completion on this thread
    ///
    /// Exceptions that escape end in the uncaught handler; the result reports how the thread
    /// ended. Exit with status 0 counts as a normal finish.
    pub fn run_entry(&mut self, entry: &EntryPoint, arguments: &[String]) -> Result<(), Error> {
        let outcome = match self.enter_entry(entry, arguments) {
            Ok(()) => self.run(0),
            Err(trap) => Err(trap),
        };
        let outcome = match outcome {
            Err(Trap::Throw(exception)) => self.uncaught(exception),
            Err(Trap::Condition(condition, message)) => {
                match self.materialize(condition, &message) {
                    Ok(exception) | Err(Trap::Throw(exception)) => self.uncaught(exception),
                    Err(other) => Err(other),
                }
            }
            other => other,
        };

        match outcome {
            Ok(()) => match &self.uncaught {
                Some(exception) => Err(Error::Uncaught(exception.class().name.clone())),
                None => Ok(()),
            },
            Err(Trap::Fatal(message)) => {
                self.report_fatal(&message);
                Err(Error::Fatal(message))
            }
            Err(Trap::Exit) => {
                self.exit_all_frames();
                match self.machine.exit_status() {
                    Some(0) | None => Ok(()),
                    Some(code) => Err(Error::Exit(code)),
                }
            }
            Err(other) => {
                let message = format!("could not raise {:?}", other);
                self.report_fatal(&message);
                Err(Error::Fatal(message))
            }
        }
    }

    fn enter_entry(&mut self, entry: &EntryPoint, arguments: &[String]) -> Result<(), Trap> {
        let class = self.load_class(&entry.class)?;
        self.initialize_class(&class)?;
        let method = class
            .declared_method(&entry.method, &entry.descriptor)
            .filter(|method| method.is_static())
            .cloned()
            .ok_or_else(|| {
                Trap::condition(
                    super::Condition::NoSuchMethod,
                    format!(
                        "no static {}{} on {}",
                        entry.method.as_str(),
                        entry.descriptor.render(),
                        entry.class
                    ),
                )
            })?;
        let values = if method.descriptor.parameters.is_empty() {
            vec![]
        } else {
            let strings: Vec<Option<String>> = arguments.iter().cloned().map(Some).collect();
            vec![Value::object(self.new_string_array(&strings)?)]
        };
        info!("Thread {} entering {}", self.shared.name, method);
        self.enter_method(class, method, values)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn machine() -> Arc<Machine> {
        Machine::new(vec![], Settings::new())
    }

    #[test]
    fn pointers_are_stable() {
        let machine = machine();
        let mut thread = machine.new_thread("pointers");
        let first = thread.new_string("a").unwrap();
        let second = thread.new_string("a").unwrap();

        assert_eq!(machine.object_to_pointer(None), 0, "null is pointer 0");
        let a = machine.object_to_pointer(Some(&first));
        let b = machine.object_to_pointer(Some(&second));
        assert_ne!(a, b, "equal strings are distinct objects");
        assert_eq!(machine.object_to_pointer(Some(&first)), a, "same object, same pointer");
        assert!(Arc::ptr_eq(&machine.pointer_to_object(b).unwrap(), &second));
        assert!(machine.pointer_to_object(0).is_none());
        assert!(machine.pointer_to_object(-5).is_none());
        assert!(machine.pointer_to_object(99).is_none());
    }

    #[test]
    fn string_ids() {
        let machine = machine();
        let id = machine.string_id("demo/Main");
        assert!(id > 0);
        assert_eq!(machine.string_id("demo/Main"), id);
        assert_eq!(machine.string_by_id(id).as_deref(), Some("demo/Main"));
        assert_eq!(machine.string_by_id(0), None);
    }

    #[test]
    fn first_exit_status_wins() {
        let machine = machine();
        let thread = machine.new_thread("worker");
        assert_eq!(machine.exit_status(), None);
        machine.exit(3);
        machine.exit(7);
        assert_eq!(machine.exit_status(), Some(3), "later requests don't override");
        assert!(thread.shared.should_terminate(), "running threads are told to stop");
        let late = machine.new_thread("late");
        assert!(late.shared.should_terminate(), "threads created while exiting stop at once");
    }

    #[test]
    fn thread_control() {
        let machine = machine();
        let thread = machine.new_thread("worker");
        let id = thread.id();
        assert_eq!(machine.thread_status(id), Some(ThreadStatus::Running));
        assert!(machine.set_priority(id, 10).is_ok());
        assert_eq!(thread.shared.priority(), 10);
        assert!(matches!(
            machine.set_priority(id, 11),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            machine.set_priority(id, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(machine.interrupt(id).is_ok());
        assert!(thread.shared.take_interrupt(), "interrupt sets the flag");
        assert!(matches!(machine.interrupt(id + 100), Err(Error::InvalidArgument(_))));
        assert_eq!(machine.thread_status(id + 100), None);
    }

    #[test]
    fn dropped_threads_leave_the_registry() {
        let machine = machine();
        let kept = machine.new_thread("kept");
        let gone = machine.new_thread("gone");
        let id = gone.id();
        assert_eq!(machine.thread_count(), 2);

        drop(gone);
        assert_eq!(machine.thread_count(), 1);
        assert_eq!(machine.thread_status(id), Some(ThreadStatus::Terminated));
        assert!(matches!(machine.interrupt(id), Err(Error::InvalidArgument(_))));
        assert_eq!(machine.thread_status(kept.id()), Some(ThreadStatus::Running));
        assert_eq!(machine.thread_status(0), None);
    }
}
