use crate::jvm::{
    BaseType, BinaryName, ClassAccessFlags, Code, Constant, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, UnqualifiedName,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Initialization state of a class
///
/// Only ever advances `Uninitialized -> Initializing -> Initialized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
}

/// What sort of class this is
#[derive(Debug)]
pub enum ClassKind {
    /// Class or interface backed by decoded class data
    Regular,

    /// Synthesized array class
    Array {
        component: FieldType,

        /// Class of the components (`None` for primitive components)
        component_class: Option<Arc<Class>>,
    },

    /// Synthesized class for a primitive type (eg. `int`)
    Primitive(BaseType),
}

/// Runtime class record
///
/// Immutable once built, apart from the initialization state. Methods and fields refer back to
/// their declaring class by name, so there are no ownership cycles.
pub struct Class {
    pub name: BinaryName,
    pub super_class: Option<Arc<Class>>,
    pub interfaces: Vec<Arc<Class>>,
    pub access_flags: ClassAccessFlags,
    pub source_file: Option<String>,
    pub kind: ClassKind,

    /// Declared fields
    pub fields: Vec<Arc<Field>>,

    /// Declared methods
    pub methods: Vec<Arc<Method>>,

    /// Types of all instance field slots, including inherited ones (superclass slots first)
    pub instance_layout: Vec<FieldType>,

    init_state: AtomicU8,
}

/// Field declared on a class
#[derive(Debug)]
pub struct Field {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub access_flags: FieldAccessFlags,

    /// Slot in instance storage (meaningless for static fields)
    pub slot: usize,

    pub constant_value: Option<Constant>,
}

/// Method declared on a class
#[derive(Debug)]
pub struct Method {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,
    pub code: Option<Code>,
}

impl Field {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::FINAL)
    }
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::PRIVATE)
    }

    /// Slots taken up by the arguments, including `this` for instance methods
    pub fn argument_slots(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static())
    }

    pub fn matches(&self, name: &UnqualifiedName, descriptor: &MethodDescriptor) -> bool {
        &self.name == name && &self.descriptor == descriptor
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::jvm::RenderDescriptor;
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor.render())
    }
}

impl Class {
    pub(crate) fn new(
        name: BinaryName,
        super_class: Option<Arc<Class>>,
        interfaces: Vec<Arc<Class>>,
        access_flags: ClassAccessFlags,
        kind: ClassKind,
    ) -> Class {
        let instance_layout = super_class
            .as_ref()
            .map(|sup| sup.instance_layout.clone())
            .unwrap_or_default();
        Class {
            name,
            super_class,
            interfaces,
            access_flags,
            source_file: None,
            kind,
            fields: vec![],
            methods: vec![],
            instance_layout,
            init_state: AtomicU8::new(InitState::Uninitialized as u8),
        }
    }

    pub fn init_state(&self) -> InitState {
        match self.init_state.load(Ordering::Acquire) {
            0 => InitState::Uninitialized,
            1 => InitState::Initializing,
            _ => InitState::Initialized,
        }
    }

    pub(crate) fn set_init_state(&self, state: InitState) {
        self.init_state.store(state as u8, Ordering::Release);
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn is_public(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::PUBLIC)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array { .. })
    }

    /// Component type, if this is an array class
    pub fn component_type(&self) -> Option<&FieldType> {
        match &self.kind {
            ClassKind::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    pub fn in_same_package(&self, other: &Class) -> bool {
        self.name.package() == other.name.package()
    }

    /// Is `ancestor` a strict superclass of this class?
    pub fn is_subclass_of(&self, ancestor: &Class) -> bool {
        let mut current = self.super_class.as_ref();
        while let Some(class) = current {
            if class.name == ancestor.name {
                return true;
            }
            current = class.super_class.as_ref();
        }
        false
    }

    /// Field declared directly on this class
    pub fn declared_field(&self, name: &UnqualifiedName) -> Option<&Arc<Field>> {
        self.fields.iter().find(|field| &field.name == name)
    }

    /// Resolve a field the way the JVM does: this class, then superinterfaces, then superclass
    pub fn lookup_field(&self, name: &UnqualifiedName) -> Option<Arc<Field>> {
        if let Some(field) = self.declared_field(name) {
            return Some(field.clone());
        }
        for interface in &self.interfaces {
            if let Some(field) = interface.lookup_field(name) {
                return Some(field);
            }
        }
        self.super_class
            .as_ref()
            .and_then(|sup| sup.lookup_field(name))
    }

    /// Method declared directly on this class
    pub fn declared_method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Option<&Arc<Method>> {
        self.methods
            .iter()
            .find(|method| method.matches(name, descriptor))
    }

    /// Resolve a method by walking the superclass chain, then superinterfaces
    ///
    /// Concrete methods found on the class chain always win over interface declarations.
    pub fn lookup_method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Option<Arc<Method>> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(method) = class.declared_method(name, descriptor) {
                return Some(method.clone());
            }
            current = class.super_class.as_deref();
        }
        self.lookup_interface_method(name, descriptor)
    }

    fn lookup_interface_method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Option<Arc<Method>> {
        for interface in &self.interfaces {
            if let Some(method) = interface.declared_method(name, descriptor) {
                return Some(method.clone());
            }
            if let Some(method) = interface.lookup_interface_method(name, descriptor) {
                return Some(method);
            }
        }
        self.super_class
            .as_ref()
            .and_then(|sup| sup.lookup_interface_method(name, descriptor))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.name)
    }
}

/// Subtyping relationship between runtime classes
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// This does a traversal of super types to determine assignability, with array classes following
/// the covariance rules of the instruction set
impl Assignable for Class {
    fn is_assignable(&self, super_type: &Class) -> bool {
        match (&self.kind, &super_type.kind) {
            (
                ClassKind::Array {
                    component: sub_component,
                    component_class: sub_class,
                },
                ClassKind::Array {
                    component: super_component,
                    component_class: super_class,
                },
            ) => match (sub_class, super_class) {
                (Some(sub_class), Some(super_class)) => sub_class.is_assignable(super_class),
                (None, None) => sub_component == super_component,
                _ => false,
            },

            // Special superclass and interfaces of all arrays
            (ClassKind::Array { .. }, _) => is_array_type_assignable(&super_type.name),

            _ => {
                let mut supertypes_to_visit: Vec<&Class> = vec![self];
                let mut dont_revisit: HashSet<&BinaryName> = HashSet::new();
                dont_revisit.insert(&self.name);

                // Optimization: if the super type is a class, then skip visiting interfaces
                let super_is_class = !super_type.is_interface();

                while let Some(class) = supertypes_to_visit.pop() {
                    if class.name == super_type.name {
                        return true;
                    }
                    if let Some(superclass) = &class.super_class {
                        if dont_revisit.insert(&superclass.name) {
                            supertypes_to_visit.push(superclass);
                        }
                    }
                    if !super_is_class {
                        for interface in &class.interfaces {
                            if dont_revisit.insert(&interface.name) {
                                supertypes_to_visit.push(interface);
                            }
                        }
                    }
                }
                false
            }
        }
    }
}

/// Check if arrays can be assigned to a super type
///
/// This bakes in knowledge of the small, finite set of super types arrays have.
fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}
