use crate::jvm::{BinaryName, UnqualifiedName};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Shared output target (guest `stdout`/`stderr` pipes and trace dumps)
pub type Sink = Arc<Mutex<dyn Write + Send>>;

/// Machine configuration
pub struct Settings {
    /// Steps a single frame may execute before a liveness diagnostic is logged
    ///
    /// The diagnostic is advisory: execution is never aborted because of it.
    pub step_warning_threshold: u64,

    /// Values returned by `System.getProperty`
    pub system_properties: HashMap<String, String>,

    /// Static method `(Ljava/lang/Throwable;)V` called with exceptions that escape a thread
    pub uncaught_handler: Option<(BinaryName, UnqualifiedName)>,

    /// Destination of pipe descriptor 1
    pub stdout: Sink,

    /// Destination of pipe descriptor 2 and of stack trace dumps
    pub stderr: Sink,

    /// How many task managers deep this machine is nested (0 for the outermost one)
    pub guest_depth: u32,

    /// Memory limit reported to guest code through the memory statistics calls
    pub memory_max: u64,
}

impl Settings {
    pub const DEFAULT_STEP_WARNING_THRESHOLD: u64 = 200_000;
    pub const DEFAULT_MEMORY_MAX: u64 = 16 * 1024 * 1024;

    pub fn new() -> Settings {
        let mut system_properties = HashMap::new();
        system_properties.insert(
            "microedition.configuration".to_string(),
            "CLDC-1.1".to_string(),
        );
        system_properties.insert("microedition.profiles".to_string(), "MIDP-2.0".to_string());
        system_properties.insert("microedition.encoding".to_string(), "UTF-8".to_string());
        system_properties.insert("microedition.platform".to_string(), "jmevm".to_string());

        Settings {
            step_warning_threshold: Self::DEFAULT_STEP_WARNING_THRESHOLD,
            system_properties,
            uncaught_handler: None,
            stdout: Arc::new(Mutex::new(std::io::stdout())),
            stderr: Arc::new(Mutex::new(std::io::stderr())),
            guest_depth: 0,
            memory_max: Self::DEFAULT_MEMORY_MAX,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Settings {
        self.system_properties.insert(name.into(), value.into());
        self
    }

    pub fn with_uncaught_handler(mut self, class: BinaryName, method: UnqualifiedName) -> Settings {
        self.uncaught_handler = Some((class, method));
        self
    }

    pub fn with_stdout(mut self, sink: Sink) -> Settings {
        self.stdout = sink;
        self
    }

    pub fn with_stderr(mut self, sink: Sink) -> Settings {
        self.stderr = sink;
        self
    }

    pub fn with_step_warning_threshold(mut self, steps: u64) -> Settings {
        self.step_warning_threshold = steps;
        self
    }

    pub fn with_memory_max(mut self, bytes: u64) -> Settings {
        self.memory_max = bytes;
        self
    }

    /// Settings for a machine nested one level deeper, sharing sinks and properties
    pub fn nested(&self) -> Settings {
        Settings {
            step_warning_threshold: self.step_warning_threshold,
            system_properties: self.system_properties.clone(),
            uncaught_handler: self.uncaught_handler.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            guest_depth: self.guest_depth + 1,
            memory_max: self.memory_max,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("step_warning_threshold", &self.step_warning_threshold)
            .field("system_properties", &self.system_properties)
            .field("uncaught_handler", &self.uncaught_handler)
            .field("guest_depth", &self.guest_depth)
            .field("memory_max", &self.memory_max)
            .finish()
    }
}
