use crate::jvm::{BaseType, BinaryName, FieldType, Instruction, Name, ParseDescriptor};
use crate::vm::{
    Assignable, Class, ClassKind, Condition, ElementKind, Frame, ObjectRef, Thread, Trap, Value,
};
use std::sync::Arc;

/// Element kind the array instruction operates on
fn element_kind(instruction: &Instruction) -> Result<ElementKind, Trap> {
    use Instruction::*;
    Ok(match instruction {
        IALoad | IAStore => ElementKind::Int,
        LALoad | LAStore => ElementKind::Long,
        FALoad | FAStore => ElementKind::Float,
        DALoad | DAStore => ElementKind::Double,
        AALoad | AAStore => ElementKind::Reference,
        BALoad | BAStore => ElementKind::Byte,
        CALoad | CAStore => ElementKind::Char,
        SALoad | SAStore => ElementKind::Short,
        other => return Err(Trap::fatal(format!("{:?} is not an array access", other))),
    })
}

fn check_element_kind(instruction: &Instruction, found: ElementKind) -> Result<(), Trap> {
    let expected = element_kind(instruction)?;
    if expected == found {
        Ok(())
    } else {
        Err(Trap::fatal(format!(
            "{:?} used on an array of {:?} elements",
            instruction, found
        )))
    }
}

fn negative_size(count: i32) -> Trap {
    Trap::condition(Condition::NegativeArraySize, count.to_string())
}

/// `xaload`: null check, then bounds check, then read
pub fn load_element(frame: &mut Frame, instruction: &Instruction) -> Result<(), Trap> {
    let index = frame.pop_int()?;
    let array = frame.pop_object("array load")?;
    let value = {
        let storage = array.array()?;
        check_element_kind(instruction, storage.kind())?;
        storage.load(index)?
    };
    frame.push(value);
    Ok(())
}

/// `xastore` for primitive elements (reference stores need a type check, see
/// [`Thread::store_reference_element`])
pub fn store_element(frame: &mut Frame, instruction: &Instruction) -> Result<(), Trap> {
    let value = frame.pop()?;
    let index = frame.pop_int()?;
    let array = frame.pop_object("array store")?;
    let mut storage = array.array()?;
    check_element_kind(instruction, storage.kind())?;
    storage.store(index, value)
}

impl Thread {
    /// `aastore`: the stored reference must be assignable to the component class
    pub(super) fn store_reference_element(&mut self) -> Result<(), Trap> {
        let frame = self.current_frame()?;
        let value = frame.pop_reference()?;
        let index = frame.pop_int()?;
        let array = frame.pop_object("array store")?;

        let mut storage = array.array()?;
        check_element_kind(&Instruction::AAStore, storage.kind())?;
        storage.check_index(index)?;
        if let (Some(element), ClassKind::Array { component_class: Some(component), .. }) =
            (&value, &array.class().kind)
        {
            if !element.class().is_assignable(component) {
                return Err(Trap::condition(
                    Condition::ArrayStore,
                    format!("{} stored into {}", element.class().name, array.class().name),
                ));
            }
        }
        storage.store(index, Value::Reference(value))
    }

    /// `newarray`
    pub(super) fn new_primitive_array(&mut self, base: BaseType) -> Result<(), Trap> {
        let count = self.current_frame()?.pop_int()?;
        if count < 0 {
            return Err(negative_size(count));
        }
        let class = self.machine.loader.array_class(&FieldType::Base(base))?;
        let array = self.new_array(class, count as usize)?;
        self.current_frame()?.push(Value::object(array));
        Ok(())
    }

    /// `anewarray`
    pub(super) fn new_reference_array(&mut self, component: &BinaryName) -> Result<(), Trap> {
        let count = self.current_frame()?.pop_int()?;
        let component_class = self.resolve_class(component)?;
        if count < 0 {
            return Err(negative_size(count));
        }
        let component_type = FieldType::from_class_name(&component_class.name)
            .map_err(|err| Trap::fatal(format!("bad component class {}: {}", component, err)))?;
        let class = self.machine.loader.array_class(&component_type)?;
        let array = self.new_array(class, count as usize)?;
        self.current_frame()?.push(Value::object(array));
        Ok(())
    }

    /// `multianewarray`: allocates every dimension that has a count
    pub(super) fn new_multi_array(
        &mut self,
        class: &BinaryName,
        dimensions: u8,
    ) -> Result<(), Trap> {
        let class = self.resolve_class(class)?;
        let depth = match FieldType::parse(class.name.as_str()) {
            Ok(typ) => array_depth(&typ),
            Err(_) => 0,
        };
        if dimensions == 0 || usize::from(dimensions) > depth {
            return Err(Trap::fatal(format!(
                "{} cannot be allocated with {} dimensions",
                class.name, dimensions
            )));
        }

        let counts = self
            .current_frame()?
            .pop_many(usize::from(dimensions))?
            .iter()
            .map(Value::as_int)
            .collect::<Result<Vec<i32>, Trap>>()?;
        if let Some(count) = counts.iter().find(|count| **count < 0) {
            return Err(negative_size(*count));
        }

        let array = self.allocate_dimensions(&class, &counts)?;
        self.current_frame()?.push(Value::object(array));
        Ok(())
    }

    fn allocate_dimensions(&self, class: &Arc<Class>, counts: &[i32]) -> Result<ObjectRef, Trap> {
        let (count, rest) = match counts.split_first() {
            Some(split) => split,
            None => return Err(Trap::fatal("no dimensions left to allocate")),
        };
        let array = self.new_array(class.clone(), *count as usize)?;
        if rest.is_empty() {
            return Ok(array);
        }
        let component = match &class.kind {
            ClassKind::Array {
                component_class: Some(component),
                ..
            } => component.clone(),
            _ => return Err(Trap::fatal(format!("{} has no array components", class.name))),
        };
        for index in 0..*count {
            let inner = self.allocate_dimensions(&component, rest)?;
            array.array()?.store(index, Value::object(inner))?;
        }
        Ok(array)
    }
}

fn array_depth(typ: &FieldType) -> usize {
    match typ {
        FieldType::Array(component) => 1 + array_depth(component),
        _ => 0,
    }
}
