//! Allocation and the machine-wide identity caches, as seen from a running thread
//!
//! Anything that may run guest code (string construction, boxing) lives on [`Thread`] since it
//! needs a frame stack to run on.

use super::{ArrayStorage, Class, ClassKind, Condition, Object, ObjectRef, Thread, Trap, Value};
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, UnqualifiedName};
use crate::util::RefId;
use log::debug;
use std::sync::Arc;

/// Rough per-object header size used by the allocation estimate
const HEADER_BYTES: u64 = 16;

/// Bytes one array element of this type occupies in the allocation estimate
fn element_bytes(component: &FieldType) -> u64 {
    match component {
        FieldType::Base(BaseType::Boolean | BaseType::Byte) => 1,
        FieldType::Base(BaseType::Char | BaseType::Short) => 2,
        FieldType::Base(BaseType::Int | BaseType::Float) => 4,
        FieldType::Base(BaseType::Long | BaseType::Double) => 8,
        FieldType::Object(_) | FieldType::Array(_) => 8,
    }
}

impl Thread {
    pub fn load_class(&self, name: &BinaryName) -> Result<Arc<Class>, Trap> {
        Ok(self.machine.loader.load_class(name)?)
    }

    /// Load a class and check that the executing class may access it
    pub fn resolve_class(&self, name: &BinaryName) -> Result<Arc<Class>, Trap> {
        let context = self.current_class();
        Ok(self.machine.loader.resolve_class(name, context.as_deref())?)
    }

    /// Allocate a simple object without running any constructor
    pub fn new_object(&self, class: Arc<Class>) -> ObjectRef {
        self.machine
            .record_allocation(HEADER_BYTES + 8 * class.instance_layout.len() as u64);
        Object::new_simple(class)
    }

    /// Initialize a class and allocate an instance of it, without running a constructor
    pub fn allocate_instance(&mut self, class: Arc<Class>) -> Result<ObjectRef, Trap> {
        let instantiable = !(class.is_interface()
            || class.is_abstract()
            || matches!(class.kind, ClassKind::Array { .. } | ClassKind::Primitive(_)));
        if !instantiable {
            return Err(Trap::condition(
                Condition::Instantiation,
                class.name.to_string(),
            ));
        }
        self.initialize_class(&class)?;
        Ok(self.new_object(class))
    }

    /// Allocate a zeroed array of an array class
    ///
    /// An array whose estimated size exceeds the machine's memory maximum raises
    /// `OutOfMemoryError` before any host storage is reserved.
    pub fn new_array(&self, class: Arc<Class>, length: usize) -> Result<ObjectRef, Trap> {
        let element = class.component_type().map_or(8, element_bytes);
        let estimate = HEADER_BYTES.saturating_add(element.saturating_mul(length as u64));
        let memory_max = self.machine.settings.memory_max;
        if estimate > memory_max {
            debug!(
                "{}[{}] needs about {} bytes, over the {} byte maximum",
                class.name, length, estimate, memory_max
            );
            return Err(Trap::condition(
                Condition::OutOfMemory,
                format!("{} elements of {}", length, class.name),
            ));
        }
        let array = Object::new_array(class, length)?;
        self.machine.record_allocation(estimate);
        Ok(array)
    }

    /// Wrap existing element storage in an array object of the given component type
    pub(crate) fn array_from_storage(
        &self,
        component: &FieldType,
        storage: ArrayStorage,
    ) -> Result<ObjectRef, Trap> {
        let class = self.machine.loader.array_class(component)?;
        self.machine
            .record_allocation(HEADER_BYTES + 8 * storage.len() as u64);
        Ok(Object::with_storage(class, storage))
    }

    /// Create a fresh (not interned) guest string
    pub fn new_string(&mut self, text: &str) -> Result<ObjectRef, Trap> {
        self.new_string_from_chars(text.encode_utf16().collect())
    }

    /// Create a guest string by running `String.<init>([C)V` over a new character array
    pub fn new_string_from_chars(&mut self, chars: Vec<u16>) -> Result<ObjectRef, Trap> {
        let array =
            self.array_from_storage(&FieldType::Base(BaseType::Char), ArrayStorage::Char(chars))?;
        let class = self.load_class(&BinaryName::STRING)?;
        self.initialize_class(&class)?;
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::array(FieldType::Base(BaseType::Char))],
            return_type: None,
        };
        let constructor = class
            .declared_method(&UnqualifiedName::INIT, &descriptor)
            .cloned()
            .ok_or_else(|| Trap::fatal("java/lang/String has no ([C)V constructor"))?;
        let string = self.new_object(class.clone());
        self.invoke_method(
            class,
            constructor,
            vec![Value::object(string.clone()), Value::object(array)],
        )?;
        Ok(string)
    }

    /// Canonical guest string for some content
    ///
    /// The machine lock is held while the string is built, so two threads interning the same
    /// content always end up with the same object.
    pub fn intern(&mut self, text: &str) -> Result<ObjectRef, Trap> {
        let machine = self.machine.clone();
        let globals = machine.global_lock();
        if let Some(existing) = globals.borrow().interned.get(text) {
            return Ok(existing.clone());
        }
        let string = self.new_string(text)?;
        let interned = globals
            .borrow_mut()
            .interned
            .entry(text.to_string())
            .or_insert(string)
            .clone();
        Ok(interned)
    }

    /// Host copy of a guest string's content
    pub fn string_value(&self, string: &ObjectRef) -> Result<String, Trap> {
        let class = string.class();
        if class.name != BinaryName::STRING {
            return Err(Trap::fatal(format!("{} is not a string", class.name)));
        }
        let field = class
            .declared_field(&UnqualifiedName::VALUE)
            .ok_or_else(|| Trap::fatal("java/lang/String has no value field"))?;
        let chars = match string.get_field(field.slot)?.as_reference()? {
            Some(chars) => chars,
            None => return Ok(String::new()),
        };
        let storage = chars.array()?;
        match &*storage {
            ArrayStorage::Char(chars) => Ok(String::from_utf16_lossy(chars)),
            other => Err(Trap::fatal(format!(
                "string backed by {:?} elements",
                other.kind()
            ))),
        }
    }

    /// Canonical `java/lang/Class` object for a class name
    pub fn class_object(&mut self, name: &BinaryName) -> Result<ObjectRef, Trap> {
        let machine = self.machine.clone();
        let globals = machine.global_lock();
        if let Some(existing) = globals.borrow().class_objects.get(name) {
            return Ok(existing.clone());
        }
        self.load_class(name)?;
        let class_class = self.load_class(&BinaryName::CLASS)?;
        self.initialize_class(&class_class)?;
        let object = self.new_object(class_class);

        let mut globals = globals.borrow_mut();
        let object = globals
            .class_objects
            .entry(name.clone())
            .or_insert(object)
            .clone();
        globals
            .class_names
            .insert(RefId(object.clone()), name.clone());
        Ok(object)
    }

    /// Name of the class a class object stands for
    pub fn class_name_of(&self, class_object: &ObjectRef) -> Option<BinaryName> {
        let globals = self.machine.global_lock();
        let name = globals
            .borrow()
            .class_names
            .get(&RefId(class_object.clone()))
            .cloned();
        name
    }

    /// Wrap a primitive in its box class, without running the constructor
    pub fn box_value(&mut self, box_class: &BinaryName, value: Value) -> Result<ObjectRef, Trap> {
        let class = self.load_class(box_class)?;
        self.initialize_class(&class)?;
        let field = class
            .declared_field(&UnqualifiedName::VALUE)
            .cloned()
            .ok_or_else(|| Trap::fatal(format!("{} is not a box class", box_class)))?;
        if !value.matches(&field.descriptor) {
            return Err(Trap::fatal(format!(
                "cannot box a {} value in {}",
                value.kind_name(),
                box_class
            )));
        }
        let boxed = self.new_object(class);
        boxed.set_field(field.slot, value)?;
        Ok(boxed)
    }

    /// Primitive held by a box
    pub fn unbox_value(&self, boxed: &ObjectRef) -> Result<Value, Trap> {
        let field = boxed
            .class()
            .declared_field(&UnqualifiedName::VALUE)
            .filter(|field| !field.descriptor.is_reference())
            .ok_or_else(|| Trap::fatal(format!("{} is not a box", boxed.class().name)))?;
        boxed.get_field(field.slot)
    }

    /// `String[]` built from host strings (`None` entries stay `null`)
    pub fn new_string_array(&mut self, strings: &[Option<String>]) -> Result<ObjectRef, Trap> {
        let class = self
            .machine
            .loader
            .array_class(&FieldType::object(BinaryName::STRING))?;
        let array = self.new_array(class, strings.len())?;
        for (index, string) in strings.iter().enumerate() {
            if let Some(string) = string {
                let element = self.new_string(string)?;
                array
                    .array()?
                    .store(index as i32, Value::object(element))?;
            }
        }
        Ok(array)
    }
}
