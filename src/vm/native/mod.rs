//! Bridge from `native` guest methods to host functions
//!
//! Bindings are looked up by the declaring class, method name, and rendered descriptor of the
//! resolved method. Arguments are converted to [`NativeValue`]s according to the declared
//! parameter types before the host function runs, and its result is converted back according to
//! the declared return type.

mod builtins;
mod convert;
mod intrinsics;

use super::{Method, ObjectRef, Thread, Trap, Value};
use crate::jvm::{BinaryName, Name, RenderDescriptor};
use log::trace;
use std::collections::HashMap;
use std::sync::Arc;

/// Host implementation of a native method
///
/// Instance methods receive their receiver as the first argument.
pub type NativeFn = fn(&mut Thread, &[NativeValue]) -> Result<NativeValue, Trap>;

/// Host-side form of values crossing the bridge
#[derive(Debug, Clone)]
pub enum NativeValue {
    /// Result of a `void` method
    Void,
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    CharArray(Vec<u16>),
    IntArray(Vec<i32>),
    StringArray(Vec<Option<String>>),

    /// A `java/lang/Class` object, by the name of the class it stands for
    Class(BinaryName),

    /// Any other guest object, passed through untouched
    Object(ObjectRef),
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &NativeValue) -> bool {
        use NativeValue::*;
        match (self, other) {
            (Void, Void) | (Null, Null) => true,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (CharArray(a), CharArray(b)) => a == b,
            (IntArray(a), IntArray(b)) => a == b,
            (StringArray(a), StringArray(b)) => a == b,
            (Class(a), Class(b)) => a == b,
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl NativeValue {
    fn mismatch(&self, expected: &str) -> Trap {
        Trap::fatal(format!("native argument {:?} is not {}", self, expected))
    }

    pub fn as_int(&self) -> Result<i32, Trap> {
        match self {
            NativeValue::Int(i) => Ok(*i),
            other => Err(other.mismatch("an int")),
        }
    }

    pub fn as_long(&self) -> Result<i64, Trap> {
        match self {
            NativeValue::Long(l) => Ok(*l),
            other => Err(other.mismatch("a long")),
        }
    }

    pub fn as_float(&self) -> Result<f32, Trap> {
        match self {
            NativeValue::Float(f) => Ok(*f),
            other => Err(other.mismatch("a float")),
        }
    }

    pub fn as_double(&self) -> Result<f64, Trap> {
        match self {
            NativeValue::Double(d) => Ok(*d),
            other => Err(other.mismatch("a double")),
        }
    }

    /// Opaque object argument (`None` for `null`)
    pub fn as_object(&self) -> Result<Option<ObjectRef>, Trap> {
        match self {
            NativeValue::Object(object) => Ok(Some(object.clone())),
            NativeValue::Null => Ok(None),
            other => Err(other.mismatch("an object")),
        }
    }

    /// String argument (`None` for `null`)
    pub fn as_str(&self) -> Result<Option<&str>, Trap> {
        match self {
            NativeValue::String(string) => Ok(Some(string)),
            NativeValue::Null => Ok(None),
            other => Err(other.mismatch("a string")),
        }
    }
}

type NativeKey = (BinaryName, String, String);

/// Table of native bindings
#[derive(Default, Clone)]
pub struct NativeRegistry {
    bindings: HashMap<NativeKey, NativeFn>,
}

impl NativeRegistry {
    /// Empty registry
    pub fn new() -> NativeRegistry {
        NativeRegistry::default()
    }

    /// Registry holding every binding the built-in classes need
    pub fn with_builtins() -> NativeRegistry {
        let mut registry = NativeRegistry::new();
        builtins::register(&mut registry);
        intrinsics::register(&mut registry);
        registry
    }

    /// Bind (or rebind) a native method
    pub fn register(
        &mut self,
        class: &BinaryName,
        name: &str,
        descriptor: &str,
        function: NativeFn,
    ) {
        self.bindings.insert(
            (class.clone(), name.to_string(), descriptor.to_string()),
            function,
        );
    }

    pub fn lookup(&self, method: &Method) -> Option<NativeFn> {
        let key = (
            method.class.clone(),
            method.name.as_str().to_string(),
            method.descriptor.render(),
        );
        self.bindings.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Thread {
    /// Run the host binding of a native method
    ///
    /// A missing binding, or a value that cannot cross the bridge in the declared shape, means
    /// the bridge table is incomplete and is fatal.
    pub(crate) fn call_native(
        &mut self,
        method: &Arc<Method>,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, Trap> {
        let function = self
            .machine
            .natives
            .lookup(method)
            .ok_or_else(|| Trap::fatal(format!("no native binding for {}", method)))?;

        let mut arguments = arguments.into_iter();
        let mut native_arguments = Vec::with_capacity(method.descriptor.parameters.len() + 1);
        if !method.is_static() {
            match arguments.next() {
                Some(Value::Reference(Some(receiver))) => {
                    native_arguments.push(NativeValue::Object(receiver))
                }
                _ => return Err(Trap::fatal(format!("{} called without a receiver", method))),
            }
        }
        for parameter in &method.descriptor.parameters {
            let value = arguments
                .next()
                .ok_or_else(|| Trap::fatal(format!("{} is missing arguments", method)))?;
            native_arguments.push(self.to_native(value, parameter)?);
        }

        trace!("Native call {} with {:?}", method, native_arguments);
        let result = function(self, &native_arguments)?;
        match &method.descriptor.return_type {
            None => match result {
                NativeValue::Void => Ok(None),
                other => Err(Trap::fatal(format!("void {} returned {:?}", method, other))),
            },
            Some(return_type) => self.from_native(result, return_type).map(Some),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, ParseDescriptor, UnqualifiedName};

    fn answer(_: &mut Thread, _: &[NativeValue]) -> Result<NativeValue, Trap> {
        Ok(NativeValue::Int(42))
    }

    #[test]
    fn lookup_matches_class_name_and_descriptor() {
        let class = BinaryName::from_string("demo/Natives".to_string()).unwrap();
        let mut registry = NativeRegistry::new();
        registry.register(&class, "answer", "()I", answer);

        let method = |name: &str, descriptor: &str| Method {
            class: class.clone(),
            name: UnqualifiedName::from_string(name.to_string()).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            access_flags: MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
            code: None,
        };
        assert!(registry.lookup(&method("answer", "()I")).is_some());
        assert!(
            registry.lookup(&method("answer", "()J")).is_none(),
            "descriptor is part of the key"
        );
        assert!(registry.lookup(&method("question", "()I")).is_none());
    }

    #[test]
    fn builtins_cover_the_core_library() {
        use crate::vm::{ClassLibrary, CoreLibrary};

        let registry = NativeRegistry::with_builtins();
        let library = CoreLibrary::new();
        for name in [
            BinaryName::OBJECT,
            BinaryName::CLASS,
            BinaryName::STRING,
            BinaryName::SYSTEM,
            BinaryName::THREAD,
            BinaryName::INTRINSICS,
            BinaryName::OBJECTACCESS,
        ] {
            let class = library.class_data(&name).unwrap();
            let natives = class
                .methods
                .iter()
                .filter(|m| m.access_flags.contains(MethodAccessFlags::NATIVE));
            for method in natives {
                let method = Method {
                    class: name.clone(),
                    name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                    access_flags: method.access_flags,
                    code: None,
                };
                assert!(registry.lookup(&method).is_some(), "{} has a binding", method);
            }
        }
    }

    #[test]
    fn objects_compare_by_identity() {
        assert_eq!(NativeValue::Float(f32::NAN), NativeValue::Float(f32::NAN));
        assert_ne!(NativeValue::Int(1), NativeValue::Long(1));
        assert_eq!(NativeValue::Null.as_str().unwrap(), None);
        assert!(matches!(NativeValue::Int(1).as_long(), Err(Trap::Fatal(_))));
    }
}
