use super::NativeValue;
use crate::jvm::{BaseType, BinaryName, FieldType, RenderDescriptor};
use crate::vm::{ArrayStorage, ObjectRef, Thread, Trap, Value};

/// Primitive wrapped by a box class
pub fn box_type(class: &BinaryName) -> Option<BaseType> {
    let base = match class.as_ref() {
        "java/lang/Boolean" => BaseType::Boolean,
        "java/lang/Byte" => BaseType::Byte,
        "java/lang/Character" => BaseType::Char,
        "java/lang/Short" => BaseType::Short,
        "java/lang/Integer" => BaseType::Int,
        "java/lang/Long" => BaseType::Long,
        "java/lang/Float" => BaseType::Float,
        "java/lang/Double" => BaseType::Double,
        _ => return None,
    };
    Some(base)
}

fn shape_error(value: impl std::fmt::Debug, typ: &FieldType) -> Trap {
    Trap::fatal(format!(
        "{:?} cannot cross the native bridge as {}",
        value,
        typ.render()
    ))
}

fn primitive(value: Value) -> NativeValue {
    match value {
        Value::Int(i) => NativeValue::Int(i),
        Value::Long(l) => NativeValue::Long(l),
        Value::Float(f) => NativeValue::Float(f),
        Value::Double(d) => NativeValue::Double(d),
        Value::Reference(None) => NativeValue::Null,
        Value::Reference(Some(object)) => NativeValue::Object(object),
    }
}

/// Narrow an `int` to the range of a sub-word type
fn narrow(value: i32, base: BaseType) -> i32 {
    match base {
        BaseType::Boolean => i32::from(value != 0),
        BaseType::Byte => i32::from(value as i8),
        BaseType::Char => i32::from(value as u16),
        BaseType::Short => i32::from(value as i16),
        _ => value,
    }
}

impl Thread {
    /// Guest value to host form, driven by the declared type
    pub(crate) fn to_native(&self, value: Value, typ: &FieldType) -> Result<NativeValue, Trap> {
        let object = match (typ, value) {
            (FieldType::Base(base), value) => {
                return if value.matches(typ) {
                    Ok(primitive(value))
                } else {
                    Err(shape_error(value, &FieldType::Base(*base)))
                };
            }
            (_, Value::Reference(None)) => return Ok(NativeValue::Null),
            (_, Value::Reference(Some(object))) => object,
            (_, other) => return Err(shape_error(other, typ)),
        };

        match typ {
            FieldType::Object(class) if *class == BinaryName::STRING => {
                Ok(NativeValue::String(self.string_value(&object)?))
            }
            FieldType::Object(class) if *class == BinaryName::CLASS => self
                .class_name_of(&object)
                .map(NativeValue::Class)
                .ok_or_else(|| shape_error(&object, typ)),
            FieldType::Object(class) if box_type(class).is_some() => {
                if &object.class().name != class {
                    return Err(shape_error(&object, typ));
                }
                Ok(primitive(self.unbox_value(&object)?))
            }
            FieldType::Array(component) => {
                let storage = object.array()?;
                let converted = match (component.as_ref(), &*storage) {
                    (FieldType::Base(BaseType::Char), ArrayStorage::Char(chars)) => {
                        Some(Ok(NativeValue::CharArray(chars.clone())))
                    }
                    (FieldType::Base(BaseType::Int), ArrayStorage::Int(ints)) => {
                        Some(Ok(NativeValue::IntArray(ints.clone())))
                    }
                    (FieldType::Object(class), ArrayStorage::Reference(elements))
                        if *class == BinaryName::STRING =>
                    {
                        Some(self.host_strings(elements))
                    }
                    (FieldType::Base(BaseType::Char | BaseType::Int), _) => {
                        Some(Err(shape_error(&object, typ)))
                    }
                    (FieldType::Object(class), _) if *class == BinaryName::STRING => {
                        Some(Err(shape_error(&object, typ)))
                    }
                    _ => None,
                };
                drop(storage);
                converted.unwrap_or(Ok(NativeValue::Object(object)))
            }
            FieldType::Object(_) => Ok(NativeValue::Object(object)),
            FieldType::Base(_) => Err(shape_error(&object, typ)),
        }
    }

    fn host_strings(&self, elements: &[Option<ObjectRef>]) -> Result<NativeValue, Trap> {
        let strings = elements
            .iter()
            .map(|element| match element {
                Some(string) => self.string_value(string).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, Trap>>()?;
        Ok(NativeValue::StringArray(strings))
    }

    /// Host value to guest form, driven by the declared type
    pub(crate) fn from_native(
        &mut self,
        value: NativeValue,
        typ: &FieldType,
    ) -> Result<Value, Trap> {
        let is_object = *typ == FieldType::object(BinaryName::OBJECT);
        let converted = match (value, typ) {
            (NativeValue::Int(i), FieldType::Base(base)) if !matches!(
                base,
                BaseType::Long | BaseType::Float | BaseType::Double
            ) =>
            {
                Value::Int(narrow(i, *base))
            }
            (NativeValue::Long(l), FieldType::Base(BaseType::Long)) => Value::Long(l),
            (NativeValue::Float(f), FieldType::Base(BaseType::Float)) => Value::Float(f),
            (NativeValue::Double(d), FieldType::Base(BaseType::Double)) => Value::Double(d),

            (NativeValue::Null, typ) if typ.is_reference() => Value::NULL,
            (NativeValue::Object(object), typ) if typ.is_reference() => Value::object(object),

            (NativeValue::String(string), FieldType::Object(class))
                if *class == BinaryName::STRING || is_object =>
            {
                Value::object(self.new_string(&string)?)
            }
            (NativeValue::Class(name), FieldType::Object(class))
                if *class == BinaryName::CLASS || is_object =>
            {
                Value::object(self.class_object(&name)?)
            }
            (NativeValue::CharArray(chars), typ)
                if is_object || *typ == FieldType::array(FieldType::Base(BaseType::Char)) =>
            {
                let component = FieldType::Base(BaseType::Char);
                Value::object(self.array_from_storage(&component, ArrayStorage::Char(chars))?)
            }
            (NativeValue::IntArray(ints), typ)
                if is_object || *typ == FieldType::array(FieldType::int()) =>
            {
                Value::object(self.array_from_storage(&FieldType::int(), ArrayStorage::Int(ints))?)
            }
            (NativeValue::StringArray(strings), typ)
                if is_object
                    || *typ == FieldType::array(FieldType::object(BinaryName::STRING)) =>
            {
                Value::object(self.new_string_array(&strings)?)
            }

            // Primitives returned through a box type
            (unboxed, FieldType::Object(class)) if box_type(class).is_some() => {
                let base = box_type(class).unwrap_or(BaseType::Int);
                let unboxed = self.from_native(unboxed, &FieldType::Base(base))?;
                Value::object(self.box_value(class, unboxed)?)
            }

            (value, typ) => return Err(shape_error(value, typ)),
        };
        Ok(converted)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{Machine, Settings};

    #[test]
    fn host_values_survive_the_bridge() {
        let machine = Machine::new(vec![], Settings::new());
        let mut thread = machine.new_thread("bridge");
        let cases = vec![
            (NativeValue::Int(-7), FieldType::int()),
            (NativeValue::Long(1 << 40), FieldType::long()),
            (NativeValue::Float(1.5), FieldType::Base(BaseType::Float)),
            (NativeValue::Double(-0.25), FieldType::Base(BaseType::Double)),
            (
                NativeValue::String("héllo".to_string()),
                FieldType::object(BinaryName::STRING),
            ),
            (
                NativeValue::CharArray(vec![104, 105, 0xd83d]),
                FieldType::array(FieldType::Base(BaseType::Char)),
            ),
            (
                NativeValue::IntArray(vec![1, -2, i32::MAX]),
                FieldType::array(FieldType::int()),
            ),
        ];
        for (value, typ) in cases {
            let guest = thread.from_native(value.clone(), &typ).unwrap();
            let back = thread.to_native(guest, &typ).unwrap();
            assert_eq!(back, value, "{} comes back unchanged", typ.render());
        }
    }

    #[test]
    fn boxes_and_class_names() {
        let machine = Machine::new(vec![], Settings::new());
        let mut thread = machine.new_thread("bridge");

        let integer = FieldType::object(BinaryName::INTEGER);
        let boxed = thread.from_native(NativeValue::Int(12), &integer).unwrap();
        let boxed_class = boxed.as_reference().unwrap().unwrap().class().name.clone();
        assert_eq!(boxed_class, BinaryName::INTEGER, "int returned as Integer is boxed");
        assert_eq!(thread.to_native(boxed, &integer).unwrap(), NativeValue::Int(12));

        let class = FieldType::object(BinaryName::CLASS);
        let object = thread
            .from_native(NativeValue::Class(BinaryName::STRING), &class)
            .unwrap();
        assert_eq!(
            thread.to_native(object, &class).unwrap(),
            NativeValue::Class(BinaryName::STRING)
        );

        let narrowed = thread
            .from_native(NativeValue::Int(0x1_0041), &FieldType::Base(BaseType::Char))
            .unwrap();
        assert_eq!(narrowed, Value::Int(0x41), "chars are truncated to 16 bits");
    }

    #[test]
    fn contradicting_shapes_are_fatal() {
        let machine = Machine::new(vec![], Settings::new());
        let mut thread = machine.new_thread("bridge");
        assert!(matches!(
            thread.to_native(Value::Long(1), &FieldType::int()),
            Err(Trap::Fatal(_))
        ));
        assert!(matches!(
            thread.from_native(NativeValue::String("x".to_string()), &FieldType::int()),
            Err(Trap::Fatal(_))
        ));
        let chars = thread
            .from_native(
                NativeValue::CharArray(vec![1]),
                &FieldType::array(FieldType::Base(BaseType::Char)),
            )
            .unwrap();
        assert!(matches!(
            thread.to_native(chars, &FieldType::object(BinaryName::STRING)),
            Err(Trap::Fatal(_))
        ));
    }
}
