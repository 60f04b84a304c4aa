use crate::jvm::{BinaryName, ClassData};
use std::collections::HashMap;
use std::sync::Arc;

/// Source of decoded classes and raw resources
///
/// Implemented by whatever sits in front of the class-file decoder (a suite on disk, a ROM image,
/// or an in-memory bundle for tests).
pub trait ClassLibrary: Send + Sync {
    /// Name of the library (as used in class paths)
    fn name(&self) -> &str;

    /// Decoded class, if the library contains it
    fn class_data(&self, name: &BinaryName) -> Option<Arc<ClassData>>;

    /// Raw resource bytes, by path within the library (eg. `META-INF/MANIFEST.MF`)
    fn resource(&self, path: &str) -> Option<Vec<u8>>;
}

/// Library held entirely in memory
#[derive(Default)]
pub struct MemoryLibrary {
    name: String,
    classes: HashMap<BinaryName, Arc<ClassData>>,
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryLibrary {
    pub fn new(name: impl Into<String>) -> MemoryLibrary {
        MemoryLibrary {
            name: name.into(),
            classes: HashMap::new(),
            resources: HashMap::new(),
        }
    }

    pub fn add_class(&mut self, class: ClassData) {
        self.classes.insert(class.name.clone(), Arc::new(class));
    }

    pub fn with_class(mut self, class: ClassData) -> MemoryLibrary {
        self.add_class(class);
        self
    }

    pub fn with_resource(
        mut self,
        path: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> MemoryLibrary {
        self.resources.insert(path.into(), bytes.into());
        self
    }
}

impl ClassLibrary for MemoryLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_data(&self, name: &BinaryName) -> Option<Arc<ClassData>> {
        self.classes.get(name).cloned()
    }

    fn resource(&self, path: &str) -> Option<Vec<u8>> {
        self.resources.get(path).cloned()
    }
}
