use super::{Class, Condition, Monitor, Trap, Value};
use crate::jvm::{BaseType, FieldType};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a guest object (`null` is `None` wherever a reference may be absent)
pub type ObjectRef = Arc<Object>;

/// Guest object: either a simple object with one slot per instance field, or an array
pub struct Object {
    class: Arc<Class>,
    body: Body,

    /// Attached the first time the object is locked or waited on
    monitor: OnceCell<Monitor>,
}

enum Body {
    Simple(Mutex<Vec<Value>>),
    Array(Mutex<ArrayStorage>),
}

/// Homogeneous backing storage of an array
///
/// `boolean` and `byte` arrays share the signed byte representation.
#[derive(Debug, Clone)]
pub enum ArrayStorage {
    Byte(Vec<i8>),
    Char(Vec<u16>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Reference(Vec<Option<ObjectRef>>),
}

/// Element family expected by an array instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ArrayStorage {
    pub fn new(component: &FieldType, length: usize) -> ArrayStorage {
        match component {
            FieldType::Base(BaseType::Boolean | BaseType::Byte) => {
                ArrayStorage::Byte(vec![0; length])
            }
            FieldType::Base(BaseType::Char) => ArrayStorage::Char(vec![0; length]),
            FieldType::Base(BaseType::Short) => ArrayStorage::Short(vec![0; length]),
            FieldType::Base(BaseType::Int) => ArrayStorage::Int(vec![0; length]),
            FieldType::Base(BaseType::Long) => ArrayStorage::Long(vec![0; length]),
            FieldType::Base(BaseType::Float) => ArrayStorage::Float(vec![0.0; length]),
            FieldType::Base(BaseType::Double) => ArrayStorage::Double(vec![0.0; length]),
            _ => ArrayStorage::Reference(vec![None; length]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayStorage::Byte(v) => v.len(),
            ArrayStorage::Char(v) => v.len(),
            ArrayStorage::Short(v) => v.len(),
            ArrayStorage::Int(v) => v.len(),
            ArrayStorage::Long(v) => v.len(),
            ArrayStorage::Float(v) => v.len(),
            ArrayStorage::Double(v) => v.len(),
            ArrayStorage::Reference(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ArrayStorage::Byte(_) => ElementKind::Byte,
            ArrayStorage::Char(_) => ElementKind::Char,
            ArrayStorage::Short(_) => ElementKind::Short,
            ArrayStorage::Int(_) => ElementKind::Int,
            ArrayStorage::Long(_) => ElementKind::Long,
            ArrayStorage::Float(_) => ElementKind::Float,
            ArrayStorage::Double(_) => ElementKind::Double,
            ArrayStorage::Reference(_) => ElementKind::Reference,
        }
    }

    /// Validate an index against the length
    pub fn check_index(&self, index: i32) -> Result<usize, Trap> {
        let length = self.len();
        if index < 0 || index as usize >= length {
            return Err(Trap::condition(
                Condition::ArrayIndexOutOfBounds,
                format!("index {} out of bounds for length {}", index, length),
            ));
        }
        Ok(index as usize)
    }

    /// Read an element, widening sub-int values the way the load instructions do
    pub fn load(&self, index: i32) -> Result<Value, Trap> {
        let i = self.check_index(index)?;
        Ok(match self {
            ArrayStorage::Byte(v) => Value::Int(v[i] as i32),
            ArrayStorage::Char(v) => Value::Int(v[i] as i32),
            ArrayStorage::Short(v) => Value::Int(v[i] as i32),
            ArrayStorage::Int(v) => Value::Int(v[i]),
            ArrayStorage::Long(v) => Value::Long(v[i]),
            ArrayStorage::Float(v) => Value::Float(v[i]),
            ArrayStorage::Double(v) => Value::Double(v[i]),
            ArrayStorage::Reference(v) => Value::Reference(v[i].clone()),
        })
    }

    /// Write an element, truncating ints into narrower element types
    pub fn store(&mut self, index: i32, value: Value) -> Result<(), Trap> {
        let i = self.check_index(index)?;
        match self {
            ArrayStorage::Byte(v) => v[i] = value.as_int()? as i8,
            ArrayStorage::Char(v) => v[i] = value.as_int()? as u16,
            ArrayStorage::Short(v) => v[i] = value.as_int()? as i16,
            ArrayStorage::Int(v) => v[i] = value.as_int()?,
            ArrayStorage::Long(v) => v[i] = value.as_long()?,
            ArrayStorage::Float(v) => v[i] = value.as_float()?,
            ArrayStorage::Double(v) => v[i] = value.as_double()?,
            ArrayStorage::Reference(v) => v[i] = value.as_reference()?,
        }
        Ok(())
    }

    /// Copy a range between two distinct storages of the same kind
    pub fn copy_from(
        &mut self,
        source: &ArrayStorage,
        source_pos: usize,
        dest_pos: usize,
        length: usize,
    ) -> Result<(), Trap> {
        let src = source_pos..source_pos + length;
        let dst = dest_pos..dest_pos + length;
        match (self, source) {
            (ArrayStorage::Byte(d), ArrayStorage::Byte(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Char(d), ArrayStorage::Char(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Short(d), ArrayStorage::Short(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Int(d), ArrayStorage::Int(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Long(d), ArrayStorage::Long(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Float(d), ArrayStorage::Float(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Double(d), ArrayStorage::Double(s)) => d[dst].copy_from_slice(&s[src]),
            (ArrayStorage::Reference(d), ArrayStorage::Reference(s)) => {
                d[dst].clone_from_slice(&s[src])
            }
            _ => {
                return Err(Trap::condition(
                    Condition::ArrayStore,
                    "array element types differ",
                ))
            }
        }
        Ok(())
    }

    /// Copy a range within one array
    pub fn copy_within(&mut self, source_pos: usize, dest_pos: usize, length: usize) {
        let src = source_pos..source_pos + length;
        match self {
            ArrayStorage::Byte(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Char(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Short(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Int(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Long(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Float(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Double(v) => v.copy_within(src, dest_pos),
            ArrayStorage::Reference(v) => {
                let moved: Vec<Option<ObjectRef>> = v[src].to_vec();
                v[dest_pos..dest_pos + length].clone_from_slice(&moved);
            }
        }
    }
}

impl Object {
    /// Allocate a simple object with every instance slot at its zero value
    ///
    /// No constructor runs: the caller is responsible for invoking `<init>`.
    pub fn new_simple(class: Arc<Class>) -> ObjectRef {
        let slots = class.instance_layout.iter().map(Value::default_for).collect();
        Arc::new(Object {
            class,
            body: Body::Simple(Mutex::new(slots)),
            monitor: OnceCell::new(),
        })
    }

    /// Allocate an array of an array class, with zeroed elements
    pub fn new_array(class: Arc<Class>, length: usize) -> Result<ObjectRef, Trap> {
        let component = class
            .component_type()
            .ok_or_else(|| Trap::fatal(format!("{} is not an array class", class.name)))?;
        let storage = ArrayStorage::new(component, length);
        Ok(Object::with_storage(class, storage))
    }

    /// Wrap existing storage as an array of the given array class
    pub fn with_storage(class: Arc<Class>, storage: ArrayStorage) -> ObjectRef {
        Arc::new(Object {
            class,
            body: Body::Array(Mutex::new(storage)),
            monitor: OnceCell::new(),
        })
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn is_array(&self) -> bool {
        matches!(self.body, Body::Array(_))
    }

    /// Lock the array storage (fatal for simple objects)
    pub fn array(&self) -> Result<MutexGuard<'_, ArrayStorage>, Trap> {
        match &self.body {
            Body::Array(storage) => Ok(storage.lock()),
            Body::Simple(_) => Err(Trap::fatal(format!("{} is not an array", self.class.name))),
        }
    }

    pub fn array_length(&self) -> Result<usize, Trap> {
        Ok(self.array()?.len())
    }

    /// Read an instance field slot
    pub fn get_field(&self, slot: usize) -> Result<Value, Trap> {
        match &self.body {
            Body::Simple(slots) => slots.lock().get(slot).cloned().ok_or_else(|| {
                Trap::fatal(format!("field slot {} out of range on {}", slot, self.class.name))
            }),
            Body::Array(_) => Err(Trap::fatal("arrays have no field slots")),
        }
    }

    /// Write an instance field slot
    pub fn set_field(&self, slot: usize, value: Value) -> Result<(), Trap> {
        match &self.body {
            Body::Simple(slots) => match slots.lock().get_mut(slot) {
                Some(entry) => {
                    *entry = value;
                    Ok(())
                }
                None => Err(Trap::fatal(format!(
                    "field slot {} out of range on {}",
                    slot, self.class.name
                ))),
            },
            Body::Array(_) => Err(Trap::fatal("arrays have no field slots")),
        }
    }

    /// Monitor of this object, attached on first use
    pub fn monitor(&self) -> &Monitor {
        self.monitor.get_or_init(Monitor::new)
    }

    /// Monitor of this object, if it was ever locked
    pub fn existing_monitor(&self) -> Option<&Monitor> {
        self.monitor.get()
    }

    /// Identity hash, derived from the object's address
    pub fn identity_hash(self: &Arc<Self>) -> i32 {
        let address = Arc::as_ptr(self) as usize as u64;
        ((address >> 3) ^ (address >> 35)) as i32
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.class.name, self as *const Object)
    }
}
