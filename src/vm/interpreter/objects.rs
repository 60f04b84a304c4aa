use crate::jvm::{BinaryName, Constant, FieldRef, UnqualifiedName};
use crate::vm::{Assignable, Class, Condition, Field, Thread, Trap, Value};
use std::sync::Arc;

fn incompatible(field: &Field, expected: &str) -> Trap {
    Trap::condition(
        Condition::IncompatibleClassChange,
        format!("{}.{} is not {}", field.class, field.name, expected),
    )
}

impl Thread {
    /// `ldc`: numeric constants are pushed as is, strings are interned, classes become class
    /// objects
    pub(super) fn load_constant(&mut self, constant: &Constant) -> Result<(), Trap> {
        let value = match constant {
            Constant::String(text) => Value::object(self.intern(text)?),
            Constant::Class(name) => {
                let class = self.resolve_class(name)?;
                Value::object(self.class_object(&class.name)?)
            }
            numeric => Value::from_constant(numeric)
                .ok_or_else(|| Trap::fatal(format!("unloadable constant {:?}", numeric)))?,
        };
        self.current_frame()?.push(value);
        Ok(())
    }

    fn resolve_field(&self, field_ref: &FieldRef) -> Result<(Arc<Class>, Arc<Field>), Trap> {
        let context = self.current_class();
        Ok(self.machine.loader.resolve_field(field_ref, context.as_deref())?)
    }

    /// Is the executing method the given initializer of the field's declaring class?
    fn in_initializer_of(&self, field: &Field, initializer: &UnqualifiedName) -> bool {
        self.current_activation().map_or(false, |activation| {
            &activation.method.name == initializer && activation.class.name == field.class
        })
    }

    fn check_final_write(&self, field: &Field, initializer: &UnqualifiedName) -> Result<(), Trap> {
        if field.is_final() && !self.in_initializer_of(field, initializer) {
            return Err(Trap::condition(
                Condition::IllegalAccess,
                format!(
                    "final field {}.{} written outside of {}",
                    field.class, field.name, initializer
                ),
            ));
        }
        Ok(())
    }

    pub(super) fn get_static(&mut self, field_ref: &FieldRef) -> Result<(), Trap> {
        let (class, field) = self.resolve_field(field_ref)?;
        if !field.is_static() {
            return Err(incompatible(&field, "static"));
        }
        self.initialize_class(&class)?;
        let value = self.machine.get_static(&field);
        self.current_frame()?.push(value);
        Ok(())
    }

    pub(super) fn put_static(&mut self, field_ref: &FieldRef) -> Result<(), Trap> {
        let (class, field) = self.resolve_field(field_ref)?;
        if !field.is_static() {
            return Err(incompatible(&field, "static"));
        }
        self.check_final_write(&field, &UnqualifiedName::CLINIT)?;
        self.initialize_class(&class)?;
        let value = self.current_frame()?.pop()?;
        check_field_value(&field, &value)?;
        self.machine.set_static(&field, value);
        Ok(())
    }

    pub(super) fn get_field(&mut self, field_ref: &FieldRef) -> Result<(), Trap> {
        let (class, field) = self.resolve_field(field_ref)?;
        if field.is_static() {
            return Err(incompatible(&field, "an instance field"));
        }
        let frame = self.current_frame()?;
        let object = frame.pop_object("getfield")?;
        if !object.class().is_assignable(&class) {
            return Err(Trap::fatal(format!(
                "{}.{} read from an instance of {}",
                field.class,
                field.name,
                object.class().name
            )));
        }
        let value = object.get_field(field.slot)?;
        frame.push(value);
        Ok(())
    }

    pub(super) fn put_field(&mut self, field_ref: &FieldRef) -> Result<(), Trap> {
        let (class, field) = self.resolve_field(field_ref)?;
        if field.is_static() {
            return Err(incompatible(&field, "an instance field"));
        }
        self.check_final_write(&field, &UnqualifiedName::INIT)?;
        let frame = self.current_frame()?;
        let value = frame.pop()?;
        let object = frame.pop_object("putfield")?;
        if !object.class().is_assignable(&class) {
            return Err(Trap::fatal(format!(
                "{}.{} written to an instance of {}",
                field.class,
                field.name,
                object.class().name
            )));
        }
        check_field_value(&field, &value)?;
        object.set_field(field.slot, value)
    }

    /// `new`: allocates with zeroed fields, leaving the constructor call to the next instructions
    pub(super) fn new_instance(&mut self, class_name: &BinaryName) -> Result<(), Trap> {
        let class = self.resolve_class(class_name)?;
        let object = self.allocate_instance(class)?;
        self.current_frame()?.push(Value::object(object));
        Ok(())
    }

    /// `checkcast`: leaves the reference on the stack
    pub(super) fn check_cast(&mut self, class_name: &BinaryName) -> Result<(), Trap> {
        let class = self.resolve_class(class_name)?;
        let object = match self.current_frame()?.stack.last() {
            Some(Value::Reference(object)) => object.clone(),
            Some(other) => {
                return Err(Trap::fatal(format!(
                    "checkcast on a {} value",
                    other.kind_name()
                )))
            }
            None => return Err(Trap::fatal("operand stack underflow")),
        };
        match object {
            Some(object) if !object.class().is_assignable(&class) => Err(Trap::condition(
                Condition::ClassCast,
                format!(
                    "{} cannot be cast to {}",
                    object.class().name.to_source_name(),
                    class.name.to_source_name()
                ),
            )),
            _ => Ok(()),
        }
    }

    /// `instanceof`: `null` is an instance of nothing
    pub(super) fn instance_of(&mut self, class_name: &BinaryName) -> Result<(), Trap> {
        let class = self.resolve_class(class_name)?;
        let frame = self.current_frame()?;
        let is_instance = match frame.pop_reference()? {
            Some(object) => object.class().is_assignable(&class),
            None => false,
        };
        frame.push(Value::Int(i32::from(is_instance)));
        Ok(())
    }
}

fn check_field_value(field: &Field, value: &Value) -> Result<(), Trap> {
    if value.matches(&field.descriptor) {
        Ok(())
    } else {
        Err(Trap::fatal(format!(
            "{} value stored into {}.{}",
            value.kind_name(),
            field.class,
            field.name
        )))
    }
}
