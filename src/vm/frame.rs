use super::{Class, Method, ObjectRef, Trap, Value};
use crate::jvm::{Code, Instruction, Pc};
use crate::util::Width;
use std::sync::Arc;

/// Local variable slot
///
/// A category-2 value takes up its own slot plus the following one, which holds `Top`.
#[derive(Clone, Debug)]
pub enum Slot {
    Empty,
    Value(Value),
    Top,
}

/// Method being executed by a frame
#[derive(Clone, Debug)]
pub struct Activation {
    pub class: Arc<Class>,
    pub method: Arc<Method>,
}

/// One method activation
///
/// Blank frames (no activation) sit under host-to-guest calls: they never execute, but they
/// receive the return value or the exception that escaped the call.
#[derive(Debug)]
pub struct Frame {
    pub activation: Option<Activation>,
    pub locals: Vec<Slot>,
    pub stack: Vec<Value>,

    /// Next instruction to execute
    pub pc: Pc,

    /// Instruction executed most recently (exception ranges are checked against this)
    pub last_pc: Pc,

    /// Exception propagated out of the frame above, processed on the next step
    tossed: Option<ObjectRef>,

    /// Instructions executed in this frame
    pub steps: u64,
}

impl Frame {
    /// Frame for a method with a body, with the arguments packed into the locals
    pub fn new(
        class: Arc<Class>,
        method: Arc<Method>,
        arguments: Vec<Value>,
    ) -> Result<Frame, Trap> {
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| Trap::fatal(format!("{} has no code", method)))?;
        let (max_locals, max_stack) = (usize::from(code.max_locals), usize::from(code.max_stack));
        let argument_width: usize = arguments.iter().map(Width::width).sum();
        if argument_width != method.argument_slots() {
            return Err(Trap::fatal(format!(
                "{} expects {} argument slots but got {}",
                method,
                method.argument_slots(),
                argument_width
            )));
        }

        let mut locals = Vec::with_capacity(max_locals.max(argument_width));
        for argument in arguments {
            let wide = argument.width() == 2;
            locals.push(Slot::Value(argument));
            if wide {
                locals.push(Slot::Top);
            }
        }
        locals.resize(max_locals.max(argument_width), Slot::Empty);

        Ok(Frame {
            activation: Some(Activation { class, method }),
            locals,
            stack: Vec::with_capacity(max_stack),
            pc: 0,
            last_pc: 0,
            tossed: None,
            steps: 0,
        })
    }

    pub fn blank() -> Frame {
        Frame {
            activation: None,
            locals: vec![],
            stack: vec![],
            pc: 0,
            last_pc: 0,
            tossed: None,
            steps: 0,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.activation.is_none()
    }

    pub fn code(&self) -> Option<&Code> {
        self.activation
            .as_ref()
            .and_then(|activation| activation.method.code.as_ref())
    }

    /// Instruction at `pc`, if it is in range
    pub fn instruction(&self, pc: Pc) -> Option<&Instruction> {
        self.code().and_then(|code| code.instructions.get(pc))
    }

    /// Source line of the instruction executed most recently
    pub fn line(&self) -> Option<u16> {
        self.code().and_then(|code| code.line_at(self.last_pc))
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.stack
            .pop()
            .ok_or_else(|| Trap::fatal("operand stack underflow"))
    }

    pub fn pop_int(&mut self) -> Result<i32, Trap> {
        self.pop()?.as_int()
    }

    pub fn pop_long(&mut self) -> Result<i64, Trap> {
        self.pop()?.as_long()
    }

    pub fn pop_float(&mut self) -> Result<f32, Trap> {
        self.pop()?.as_float()
    }

    pub fn pop_double(&mut self) -> Result<f64, Trap> {
        self.pop()?.as_double()
    }

    pub fn pop_reference(&mut self) -> Result<Option<ObjectRef>, Trap> {
        self.pop()?.as_reference()
    }

    /// Pop a reference that must not be `null`
    pub fn pop_object(&mut self, context: &str) -> Result<ObjectRef, Trap> {
        self.pop_reference()?
            .ok_or_else(|| Trap::null_pointer(format!("null receiver for {}", context)))
    }

    /// Pop `count` values, returned in push order
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<Value>, Trap> {
        if count > self.stack.len() {
            return Err(Trap::fatal("operand stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Read a local (reading the upper half of a category-2 value is fatal)
    pub fn load_local(&self, index: u16) -> Result<Value, Trap> {
        match self.locals.get(usize::from(index)) {
            Some(Slot::Value(value)) => Ok(value.clone()),
            Some(Slot::Top) => Err(Trap::fatal(format!(
                "local {} is the second half of a wide value",
                index
            ))),
            Some(Slot::Empty) => Err(Trap::fatal(format!("local {} is unset", index))),
            None => Err(Trap::fatal(format!("local {} out of range", index))),
        }
    }

    /// Write a local, invalidating any wide value the write overlaps
    pub fn store_local(&mut self, index: u16, value: Value) -> Result<(), Trap> {
        let index = usize::from(index);
        let width = value.width();
        if index + width > self.locals.len() {
            return Err(Trap::fatal(format!("local {} out of range", index)));
        }

        // Overwriting the upper half of a wide value kills the lower half
        if let Some(Slot::Top) = self.locals.get(index) {
            if index > 0 {
                self.locals[index - 1] = Slot::Empty;
            }
        }
        // Overwriting the lower half of a wide value orphans its upper half
        let last = index + width - 1;
        if let Some(Slot::Value(old)) = self.locals.get(last) {
            if old.width() == 2 && last + 1 < self.locals.len() {
                self.locals[last + 1] = Slot::Empty;
            }
        }

        self.locals[index] = Slot::Value(value);
        if width == 2 {
            self.locals[index + 1] = Slot::Top;
        }
        Ok(())
    }

    /// Attach an exception for the next step to process
    pub fn toss(&mut self, exception: ObjectRef) {
        self.tossed = Some(exception);
    }

    pub fn take_tossed(&mut self) -> Option<ObjectRef> {
        self.tossed.take()
    }

    pub fn has_tossed(&self) -> bool {
        self.tossed.is_some()
    }

    /// Human readable location, used in stack traces
    pub fn describe(&self) -> String {
        match &self.activation {
            None => "<host call>".to_string(),
            Some(activation) => {
                let source = activation.class.source_file.as_deref().unwrap_or("Unknown Source");
                match self.line() {
                    Some(line) => format!(
                        "{} ({}:{}, pc {})",
                        activation.method, source, line, self.last_pc
                    ),
                    None => format!("{} ({}, pc {})", activation.method, source, self.last_pc),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame_with_locals(count: usize) -> Frame {
        let mut frame = Frame::blank();
        frame.locals = vec![Slot::Empty; count];
        frame
    }

    #[test]
    fn wide_locals() {
        let mut frame = frame_with_locals(4);
        frame.store_local(1, Value::Long(7)).unwrap();
        assert_eq!(frame.load_local(1).unwrap(), Value::Long(7));
        assert!(
            matches!(frame.load_local(2), Err(Trap::Fatal(_))),
            "upper half is not readable"
        );

        frame.store_local(2, Value::Int(3)).unwrap();
        assert!(
            matches!(frame.load_local(1), Err(Trap::Fatal(_))),
            "overwriting the upper half invalidates the long"
        );
        assert!(frame.store_local(3, Value::Double(1.0)).is_err(), "no room for two slots");
    }

    #[test]
    fn popping_arguments() {
        let mut frame = Frame::blank();
        frame.push(Value::Int(1));
        frame.push(Value::Long(2));
        frame.push(Value::Int(3));
        let popped = frame.pop_many(2).unwrap();
        assert_eq!(popped, vec![Value::Long(2), Value::Int(3)], "push order is kept");
        assert_eq!(frame.stack, vec![Value::Int(1)]);
        assert!(frame.pop_many(2).is_err(), "underflow");
    }
}
