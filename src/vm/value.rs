use super::{ObjectRef, Trap};
use crate::jvm::{BaseType, Constant, FieldType};
use crate::util::Width;
use std::sync::Arc;

/// Value held in a local variable, on the operand stack, in a field, or in an array
///
/// `byte`, `short`, `char`, and `boolean` are all represented as `Int`, the same way the
/// instruction set treats them. `Long` and `Double` are category-2.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Reference(Option<ObjectRef>),
}

impl Width for Value {
    fn width(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Values compare like the guest would see them through `==` on bits: floats by their bit
/// patterns and references by identity
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Reference(a), Value::Reference(b)) => same_reference(a, b),
            _ => false,
        }
    }
}

/// Reference identity, with `null == null`
pub fn same_reference(a: &Option<ObjectRef>, b: &Option<ObjectRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

impl Value {
    pub const NULL: Value = Value::Reference(None);

    pub fn object(object: ObjectRef) -> Value {
        Value::Reference(Some(object))
    }

    /// Zero value for a field or array element of the given type
    pub fn default_for(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Base(BaseType::Long) => Value::Long(0),
            FieldType::Base(BaseType::Float) => Value::Float(0.0),
            FieldType::Base(BaseType::Double) => Value::Double(0.0),
            FieldType::Base(_) => Value::Int(0),
            _ => Value::NULL,
        }
    }

    /// Value of a numeric constant (strings and classes need the machine to be materialized)
    pub fn from_constant(constant: &Constant) -> Option<Value> {
        match constant {
            Constant::Integer(i) => Some(Value::Int(*i)),
            Constant::Long(l) => Some(Value::Long(*l)),
            Constant::Float(f) => Some(Value::Float(*f)),
            Constant::Double(d) => Some(Value::Double(*d)),
            Constant::String(_) | Constant::Class(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Reference(_) => "reference",
        }
    }

    /// Does this value fit a slot of the given type?
    pub fn matches(&self, field_type: &FieldType) -> bool {
        matches!(
            (self, field_type),
            (Value::Long(_), FieldType::Base(BaseType::Long))
                | (Value::Float(_), FieldType::Base(BaseType::Float))
                | (Value::Double(_), FieldType::Base(BaseType::Double))
                | (
                    Value::Int(_),
                    FieldType::Base(
                        BaseType::Int
                            | BaseType::Boolean
                            | BaseType::Byte
                            | BaseType::Char
                            | BaseType::Short
                    )
                )
                | (Value::Reference(_), FieldType::Object(_) | FieldType::Array(_))
        )
    }

    fn mismatch(&self, expected: &str) -> Trap {
        Trap::fatal(format!("expected {} but found {}", expected, self.kind_name()))
    }

    pub fn as_int(&self) -> Result<i32, Trap> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_long(&self) -> Result<i64, Trap> {
        match self {
            Value::Long(l) => Ok(*l),
            other => Err(other.mismatch("long")),
        }
    }

    pub fn as_float(&self) -> Result<f32, Trap> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_double(&self) -> Result<f64, Trap> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(other.mismatch("double")),
        }
    }

    pub fn as_reference(&self) -> Result<Option<ObjectRef>, Trap> {
        match self {
            Value::Reference(r) => Ok(r.clone()),
            other => Err(other.mismatch("reference")),
        }
    }
}
