use super::{FieldData, MethodData};
use crate::jvm::{BinaryName, ClassAccessFlags};

/// Decoded class or interface
#[derive(Clone, Debug)]
pub struct ClassData {
    pub name: BinaryName,

    /// Superclass (`None` only for `java/lang/Object`)
    pub super_class: Option<BinaryName>,

    /// Directly implemented interfaces, in declaration order
    pub interfaces: Vec<BinaryName>,

    pub access_flags: ClassAccessFlags,

    /// Declared fields (both static and instance)
    pub fields: Vec<FieldData>,

    /// Declared methods
    pub methods: Vec<MethodData>,

    /// `SourceFile` attribute, if present
    pub source_file: Option<String>,
}

impl ClassData {
    /// Create a new public class extending `super_class`, with no members
    pub fn new(name: BinaryName, super_class: Option<BinaryName>) -> ClassData {
        ClassData {
            name,
            super_class,
            interfaces: vec![],
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            fields: vec![],
            methods: vec![],
            source_file: None,
        }
    }

    pub fn with_flags(mut self, access_flags: ClassAccessFlags) -> ClassData {
        self.access_flags = access_flags;
        self
    }

    pub fn with_interface(mut self, interface: BinaryName) -> ClassData {
        self.interfaces.push(interface);
        self
    }

    pub fn with_field(mut self, field: FieldData) -> ClassData {
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, method: MethodData) -> ClassData {
        self.methods.push(method);
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> ClassData {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}
