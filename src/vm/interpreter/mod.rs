//! Instruction interpreter
//!
//! [`Thread::run`] is the only loop: everything that needs guest code to run to completion
//! (static initializers, constructors called from the host, callbacks from native methods) pushes
//! frames and calls `run` with the current depth as the floor.

mod arrays;
mod invoke;
mod math;
mod objects;
mod stack;

use super::{Frame, Thread, Trap, Value};
use crate::jvm::Instruction;
use log::{trace, warn};

impl Thread {
    /// Execute steps while there are more than `frame_limit` frames
    ///
    /// Exceptions are dispatched inside the loop. What escapes is fatal errors, machine exit, and
    /// (at the outermost level) nothing else: an exception that unwinds every frame ends in the
    /// uncaught exception hook.
    pub fn run(&mut self, frame_limit: usize) -> Result<(), Trap> {
        while self.frames.len() > frame_limit {
            if self.shared.should_terminate() {
                return self.abort(Trap::Exit, frame_limit);
            }
            if let Err(trap) = self.step() {
                self.handle_trap(trap, frame_limit)?;
            }
        }
        Ok(())
    }

    fn handle_trap(&mut self, trap: Trap, frame_limit: usize) -> Result<(), Trap> {
        let exception = match trap {
            Trap::Throw(exception) => exception,
            Trap::Condition(condition, message) => match self.materialize(condition, &message) {
                Ok(exception) | Err(Trap::Throw(exception)) => exception,
                Err(other) => return self.abort(other, frame_limit),
            },
            other => return self.abort(other, frame_limit),
        };
        match self.dispatch(exception) {
            Ok(()) => Ok(()),
            Err(trap) => self.abort(trap, frame_limit),
        }
    }

    /// Propagate a trap that guest code cannot catch
    fn abort(&mut self, trap: Trap, frame_limit: usize) -> Result<(), Trap> {
        match trap {
            Trap::Exit => {
                if frame_limit == 0 {
                    self.exit_all_frames();
                }
                Err(Trap::Exit)
            }
            Trap::Fatal(message) => {
                if self.fatal_trace.is_none() {
                    self.fatal_trace = Some(self.stack_trace());
                }
                if frame_limit == 0 {
                    self.report_fatal(&message);
                }
                Err(Trap::Fatal(message))
            }
            Trap::Condition(condition, message) => {
                let message = format!(
                    "could not raise {} ({})",
                    condition.class_name(),
                    message
                );
                self.abort(Trap::Fatal(message), frame_limit)
            }
            Trap::Throw(exception) => Err(Trap::Throw(exception)),
        }
    }

    /// Execute a single instruction in the top frame
    fn step(&mut self) -> Result<(), Trap> {
        let threshold = self.machine.settings.step_warning_threshold;
        let frame = self.current_frame()?;
        if let Some(exception) = frame.take_tossed() {
            return Err(Trap::Throw(exception));
        }
        let method = match &frame.activation {
            Some(activation) => activation.method.clone(),
            None => return Err(Trap::fatal("stepped into a blank frame")),
        };
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| Trap::fatal(format!("{} has no code", method)))?;
        let pc = frame.pc;
        let instruction = code.instructions.get(pc).ok_or_else(|| {
            Trap::fatal(format!("{} ran off the end of its code at {}", method, pc))
        })?;

        frame.last_pc = pc;
        frame.pc = pc + 1;
        frame.steps += 1;
        let steps = frame.steps;
        if threshold > 0 && steps % threshold == 0 {
            warn!(
                "{} has executed {} steps without returning (thread {})",
                method, steps, self.shared.name
            );
        }
        trace!("{}:{} {:?}", method, pc, instruction);
        self.execute(instruction)
    }

    fn execute(&mut self, instruction: &Instruction) -> Result<(), Trap> {
        use Instruction::*;
        match instruction {
            Ldc(constant) => self.load_constant(constant),
            IReturn | LReturn | FReturn | DReturn | AReturn => self.return_from_method(true),
            Return => self.return_from_method(false),
            GetStatic(field) => self.get_static(field),
            PutStatic(field) => self.put_static(field),
            GetField(field) => self.get_field(field),
            PutField(field) => self.put_field(field),
            Invoke(kind, method) => self.invoke(*kind, method),
            New(class) => self.new_instance(class),
            NewArray(base) => self.new_primitive_array(*base),
            ANewArray(component) => self.new_reference_array(component),
            MultiANewArray(class, dimensions) => self.new_multi_array(class, *dimensions),
            AThrow => {
                let exception = self.current_frame()?.pop_object("athrow")?;
                Err(Trap::Throw(exception))
            }
            CheckCast(class) => self.check_cast(class),
            InstanceOf(class) => self.instance_of(class),
            MonitorEnter => {
                let object = self.current_frame()?.pop_object("monitorenter")?;
                object.monitor().enter(&self.shared)
            }
            MonitorExit => {
                let object = self.current_frame()?.pop_object("monitorexit")?;
                object.monitor().exit(self.shared.id, true)
            }
            AAStore => self.store_reference_element(),
            other => execute_in_frame(self.current_frame()?, other),
        }
    }
}

/// Instructions that only touch the current frame
fn execute_in_frame(frame: &mut Frame, instruction: &Instruction) -> Result<(), Trap> {
    use Instruction::*;
    match instruction {
        Nop => (),
        AConstNull => frame.push(Value::NULL),
        IConst(i) => frame.push(Value::Int(*i)),
        LConst(l) => frame.push(Value::Long(*l)),
        FConst(f) => frame.push(Value::Float(*f)),
        DConst(d) => frame.push(Value::Double(*d)),

        ILoad(index) | FLoad(index) | ALoad(index) | LLoad(index) | DLoad(index) => {
            let value = frame.load_local(*index)?;
            check_kind(instruction, &value)?;
            frame.push(value);
        }
        IStore(index) | FStore(index) | AStore(index) | LStore(index) | DStore(index) => {
            let value = frame.pop()?;
            check_kind(instruction, &value)?;
            frame.store_local(*index, value)?;
        }
        IInc(index, delta) => {
            let value = frame.load_local(*index)?.as_int()?;
            frame.store_local(*index, Value::Int(value.wrapping_add(i32::from(*delta))))?;
        }

        IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => {
            arrays::load_element(frame, instruction)?
        }
        IAStore | LAStore | FAStore | DAStore | BAStore | CAStore | SAStore => {
            arrays::store_element(frame, instruction)?
        }
        ArrayLength => {
            let array = frame.pop_object("arraylength")?;
            let length = array.array_length()?;
            frame.push(Value::Int(length as i32));
        }

        Pop | Pop2 | Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 | Swap => {
            stack::shuffle(frame, instruction)?
        }

        If(comparison, target) => {
            let value = frame.pop_int()?;
            if comparison.holds(value, 0) {
                frame.pc = *target;
            }
        }
        IfICmp(comparison, target) => {
            let right = frame.pop_int()?;
            let left = frame.pop_int()?;
            if comparison.holds(left, right) {
                frame.pc = *target;
            }
        }
        IfACmp(comparison, target) => {
            let right = frame.pop_reference()?;
            let left = frame.pop_reference()?;
            if comparison.holds(super::same_reference(&left, &right)) {
                frame.pc = *target;
            }
        }
        IfNull(comparison, target) => {
            let value = frame.pop_reference()?;
            if comparison.holds(value.is_none()) {
                frame.pc = *target;
            }
        }
        Goto(target) => frame.pc = *target,
        TableSwitch {
            default,
            low,
            targets,
        } => {
            let key = frame.pop_int()?;
            let offset = i64::from(key) - i64::from(*low);
            frame.pc = usize::try_from(offset)
                .ok()
                .and_then(|offset| targets.get(offset))
                .copied()
                .unwrap_or(*default);
        }
        LookupSwitch { default, targets } => {
            let key = frame.pop_int()?;
            frame.pc = targets
                .iter()
                .find(|(candidate, _)| *candidate == key)
                .map_or(*default, |(_, target)| *target);
        }

        other => math::execute(frame, other)?,
    }
    Ok(())
}

/// Typed local loads and stores must see the kind of value they name
fn check_kind(instruction: &Instruction, value: &Value) -> Result<(), Trap> {
    use Instruction::*;
    let matches = match instruction {
        ILoad(_) | IStore(_) => matches!(value, Value::Int(_)),
        LLoad(_) | LStore(_) => matches!(value, Value::Long(_)),
        FLoad(_) | FStore(_) => matches!(value, Value::Float(_)),
        DLoad(_) | DStore(_) => matches!(value, Value::Double(_)),
        _ => matches!(value, Value::Reference(_)),
    };
    if matches {
        Ok(())
    } else {
        Err(Trap::fatal(format!(
            "{:?} found a {} value",
            instruction,
            value.kind_name()
        )))
    }
}
