//! Tasks: whole guest programs, each on its own [`Machine`]
//!
//! A task is started from a class path of suite names and an entry class. The entry class has to
//! be advertised by the boot library's manifest, either as its `Main-Class` or as the class field
//! of one of its `MIDlet-<n>` attributes.

use super::{ClassLibrary, EntryPoint, Error, Machine, Settings};
use crate::jvm::BinaryName;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Path of the manifest inside a library
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Status code for a class path entry with no matching library
pub const ERROR_MISSING_LIBRARY: i32 = -1;

/// Status code for an entry class the manifest does not advertise
pub const ERROR_INVALID_ENTRY: i32 = -2;

/// Looks up libraries (suites) by name
pub trait SuiteProvider: Send + Sync {
    fn library(&self, name: &str) -> Option<Arc<dyn ClassLibrary>>;
}

impl SuiteProvider for HashMap<String, Arc<dyn ClassLibrary>> {
    fn library(&self, name: &str) -> Option<Arc<dyn ClassLibrary>> {
        self.get(name).cloned()
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("no library named {0}")]
    MissingLibrary(String),

    #[error("{0} is not an entry point of the boot library")]
    InvalidEntry(String),
}

impl TaskError {
    /// Numeric form reported to guest code
    pub fn code(&self) -> i32 {
        match self {
            TaskError::MissingLibrary(_) => ERROR_MISSING_LIBRARY,
            TaskError::InvalidEntry(_) => ERROR_INVALID_ENTRY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    ExitedRegular,
    ExitedFatal,
}

/// Main attributes of a JAR manifest
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Manifest {
    /// Parse the main section (everything up to the first blank line)
    ///
    /// Lines starting with a single space continue the previous value. Malformed lines are
    /// skipped.
    pub fn parse(text: &str) -> Manifest {
        let mut attributes: Vec<(String, String)> = vec![];
        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = attributes.last_mut() {
                    value.push_str(continuation);
                }
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => {
                    attributes.push((key.trim().to_string(), value.trim().to_string()))
                }
                None => warn!("Skipping manifest line {:?}", line),
            }
        }
        Manifest { attributes }
    }

    /// Value of an attribute (names are case insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Entry classes, `Main-Class` first, then `MIDlet-1`, `MIDlet-2`, ... until one is missing
    pub fn entry_points(&self) -> Vec<String> {
        let mut entries = vec![];
        if let Some(main) = self.get("Main-Class") {
            entries.push(main.to_string());
        }
        for n in 1.. {
            let midlet = match self.get(&format!("MIDlet-{}", n)) {
                Some(midlet) => midlet,
                None => break,
            };
            match midlet.split(',').nth(2).map(str::trim) {
                Some(class) if !class.is_empty() => entries.push(class.to_string()),
                _ => warn!("MIDlet-{} has no class: {:?}", n, midlet),
            }
        }
        entries
    }
}

struct Task {
    machine: Arc<Machine>,
    exit_code: Arc<Mutex<Option<i32>>>,
    join: Option<JoinHandle<()>>,
}

impl Task {
    fn status(&self) -> TaskStatus {
        match *self.exit_code.lock() {
            None => TaskStatus::Running,
            Some(0) => TaskStatus::ExitedRegular,
            Some(_) => TaskStatus::ExitedFatal,
        }
    }
}

#[derive(Default)]
struct TaskTable {
    last_id: u32,
    tasks: HashMap<u32, Task>,
}

/// Starts and tracks tasks
pub struct TaskManager {
    provider: Arc<dyn SuiteProvider>,
    settings: Settings,
    table: Mutex<TaskTable>,
}

impl TaskManager {
    /// Task manager whose tasks run one level deeper than `settings`
    pub fn new(provider: Arc<dyn SuiteProvider>, settings: Settings) -> TaskManager {
        TaskManager {
            provider,
            settings,
            table: Mutex::new(TaskTable::default()),
        }
    }

    /// Start a task on a fresh machine, returning its id
    ///
    /// The last class path entry is the boot library whose manifest lists the valid entry
    /// classes. Entries are given as source names (`com.example.Main`).
    pub fn start_task(
        &self,
        class_path: &[&str],
        entry: &str,
        arguments: &[String],
    ) -> Result<u32, TaskError> {
        let libraries = class_path
            .iter()
            .map(|name| {
                self.provider
                    .library(name)
                    .ok_or_else(|| TaskError::MissingLibrary(name.to_string()))
            })
            .collect::<Result<Vec<_>, TaskError>>()?;
        let boot = libraries
            .last()
            .ok_or_else(|| TaskError::MissingLibrary("(empty class path)".to_string()))?;

        let manifest = match boot.resource(MANIFEST_PATH) {
            Some(bytes) => Manifest::parse(&String::from_utf8_lossy(&bytes)),
            None => {
                warn!("Library {} has no manifest", boot.name());
                Manifest::default()
            }
        };
        if !manifest.entry_points().iter().any(|candidate| candidate == entry) {
            return Err(TaskError::InvalidEntry(entry.to_string()));
        }
        let class = BinaryName::from_source_name(entry)
            .map_err(|_| TaskError::InvalidEntry(entry.to_string()))?;

        let machine = Machine::new(libraries, self.settings.nested());
        let exit_code = Arc::new(Mutex::new(None));
        let mut table = self.table.lock();
        table.last_id += 1;
        let id = table.last_id;

        let task_machine = machine.clone();
        let task_exit = exit_code.clone();
        let arguments = arguments.to_vec();
        let spawned = std::thread::Builder::new()
            .name(format!("MainTask-{}-{}", id, entry))
            .spawn(move || {
                let result = task_machine.run_main(&EntryPoint::main(class), &arguments);
                let code = match result {
                    Ok(()) => 0,
                    Err(Error::Exit(code)) => code,
                    Err(_) => 1,
                };
                info!("Task {} exited with {}", id, code);
                *task_exit.lock() = Some(code);
            });
        let join = match spawned {
            Ok(join) => Some(join),
            Err(err) => {
                warn!("Could not start task {}: {}", id, err);
                *exit_code.lock() = Some(1);
                None
            }
        };

        info!("Started task {} at {}", id, entry);
        table.tasks.insert(
            id,
            Task {
                machine,
                exit_code,
                join,
            },
        );
        Ok(id)
    }

    /// Status of a task, `None` for ids never handed out
    pub fn task_status(&self, id: u32) -> Option<TaskStatus> {
        self.table.lock().tasks.get(&id).map(Task::status)
    }

    /// Machine a task runs on
    pub fn machine(&self, id: u32) -> Option<Arc<Machine>> {
        self.table
            .lock()
            .tasks
            .get(&id)
            .map(|task| task.machine.clone())
    }

    /// Block until a task finishes, returning its final status
    pub fn wait(&self, id: u32) -> Option<TaskStatus> {
        let join = self.table.lock().tasks.get_mut(&id)?.join.take();
        if let Some(join) = join {
            if join.join().is_err() {
                warn!("Host thread of task {} panicked", id);
                if let Some(task) = self.table.lock().tasks.get(&id) {
                    task.exit_code.lock().get_or_insert(1);
                }
            }
        }
        self.task_status(id)
    }
}
