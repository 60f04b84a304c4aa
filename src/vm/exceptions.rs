//! Exception dispatch
//!
//! Unwinding is incremental: when the current frame has no matching handler it is popped and the
//! exception is tossed to the caller, which processes it on its next step. A blank frame (the
//! bottom of a host call) simply keeps the exception for the host to pick up.

use super::{Assignable, Condition, ObjectRef, Thread, Trap, Value};
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Pc, RenderDescriptor, UnqualifiedName,
};
use log::{error, warn};

impl Thread {
    /// Find a handler for the exception in the current frame, or unwind that frame
    pub(crate) fn dispatch(&mut self, exception: ObjectRef) -> Result<(), Trap> {
        let frame = self.current_frame()?;
        if frame.is_blank() {
            frame.toss(exception);
            return Ok(());
        }

        match self.find_handler(&exception)? {
            Some(handler) => {
                let frame = self.current_frame()?;
                frame.clear_stack();
                frame.push(Value::object(exception));
                frame.pc = handler;
                self.unwind_trace.clear();
                Ok(())
            }
            None => {
                let frame = self
                    .pop_frame()
                    .ok_or_else(|| Trap::fatal("exception raised with no frame"))?;
                self.unwind_trace.push(frame.describe());
                match self.frames.last_mut() {
                    Some(caller) => {
                        caller.toss(exception);
                        Ok(())
                    }
                    None => self.uncaught(exception),
                }
            }
        }
    }

    /// First handler in table order covering the last executed instruction whose catch type the
    /// exception is assignable to
    fn find_handler(&mut self, exception: &ObjectRef) -> Result<Option<Pc>, Trap> {
        let frame = self.current_frame()?;
        let handlers = match frame.code() {
            Some(code) => code.handlers_at(frame.last_pc).cloned().collect::<Vec<_>>(),
            None => vec![],
        };

        for handler in handlers {
            let catches = match &handler.catch_type {
                None => true,
                Some(catch_type) => {
                    let class = self.machine.loader.load_class(catch_type).map_err(|err| {
                        Trap::fatal(format!("could not load handler type {}: {}", catch_type, err))
                    })?;
                    exception.class().is_assignable(&class)
                }
            };
            if catches {
                return Ok(Some(handler.handler));
            }
        }
        Ok(None)
    }

    /// An exception escaped the outermost frame: run the hook, dump traces, and stop
    pub(crate) fn uncaught(&mut self, exception: ObjectRef) -> Result<(), Trap> {
        let class_name = exception.class().name.clone();
        let message = self.throwable_message(&exception);
        error!(
            "Uncaught {} in thread {}: {}",
            class_name,
            self.shared.name,
            message.as_deref().unwrap_or("(no message)")
        );

        if !self.in_uncaught_hook {
            if let Some((class, method)) = self.machine.settings.uncaught_handler.clone() {
                self.in_uncaught_hook = true;
                let outcome = self.call_uncaught_handler(&class, &method, &exception);
                self.in_uncaught_hook = false;
                match outcome {
                    Ok(()) => (),
                    Err(Trap::Throw(_) | Trap::Condition(..)) => {
                        warn!("Uncaught exception handler {}.{} threw", class, method)
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        let headline = match message {
            Some(message) => format!(
                "Exception in thread \"{}\" {}: {}",
                self.shared.name,
                class_name.to_source_name(),
                message
            ),
            None => format!(
                "Exception in thread \"{}\" {}",
                self.shared.name,
                class_name.to_source_name()
            ),
        };
        let trace = std::mem::take(&mut self.unwind_trace);
        self.print_stack_trace(&headline, &trace);
        self.uncaught = Some(exception);
        Ok(())
    }

    fn call_uncaught_handler(
        &mut self,
        class: &BinaryName,
        method: &UnqualifiedName,
        exception: &ObjectRef,
    ) -> Result<(), Trap> {
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::THROWABLE)],
            return_type: None,
        };
        let class = self.load_class(class)?;
        self.initialize_class(&class)?;
        let handler = class
            .declared_method(method, &descriptor)
            .filter(|handler| handler.is_static())
            .cloned()
            .ok_or_else(|| {
                Trap::fatal(format!(
                    "uncaught exception handler {}.{}{} is missing",
                    class.name,
                    method,
                    descriptor.render()
                ))
            })?;
        self.invoke_method(class, handler, vec![Value::object(exception.clone())])?;
        Ok(())
    }

    /// Turn an engine condition into a guest throwable
    pub(crate) fn materialize(
        &mut self,
        condition: Condition,
        message: &str,
    ) -> Result<ObjectRef, Trap> {
        self.new_throwable(&condition.class_name(), message)
    }

    /// Construct a throwable through its `<init>(Ljava/lang/String;)V` constructor
    pub fn new_throwable(&mut self, class: &BinaryName, message: &str) -> Result<ObjectRef, Trap> {
        let class = self.load_class(class)?;
        self.initialize_class(&class)?;
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::STRING)],
            return_type: None,
        };
        let constructor = class
            .declared_method(&UnqualifiedName::INIT, &descriptor)
            .cloned()
            .ok_or_else(|| Trap::fatal(format!("{} has no message constructor", class.name)))?;
        let throwable = self.new_object(class.clone());
        let text = self.new_string(message)?;
        self.invoke_method(
            class,
            constructor,
            vec![Value::object(throwable.clone()), Value::object(text)],
        )?;
        Ok(throwable)
    }

    /// Message stored in a throwable, if it has one
    pub fn throwable_message(&self, throwable: &ObjectRef) -> Option<String> {
        let field = throwable.class().lookup_field(&UnqualifiedName::MESSAGE)?;
        if field.class != BinaryName::THROWABLE {
            return None;
        }
        let message = throwable.get_field(field.slot).ok()?.as_reference().ok()??;
        self.string_value(&message).ok()
    }

    /// Dump a fatal error once, then bring the whole machine down
    pub(crate) fn report_fatal(&mut self, message: &str) {
        if self.fatal_reported {
            return;
        }
        self.fatal_reported = true;
        error!("Fatal error in thread {}: {}", self.shared.name, message);
        let trace = match self.fatal_trace.take() {
            Some(trace) => trace,
            None => self.stack_trace(),
        };
        self.print_stack_trace(&format!("FATAL: {}", message), &trace);
        self.exit_all_frames();
        self.machine.exit(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{
        ClassData, Code, ExceptionHandler, Instruction, MethodAccessFlags, MethodData, Name,
        ParseDescriptor,
    };
    use crate::vm::{ClassLibrary, Machine, MemoryLibrary, Settings, Sink};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// `run()V` of `app/Guarded`, with `Throwable` caught over `0..3`
    fn guarded_thread(stderr: Sink) -> Thread {
        let code = Code::new(
            0,
            4,
            vec![
                Instruction::IConst(1),
                Instruction::IConst(2),
                Instruction::Nop,
                Instruction::Return,
                Instruction::Pop,
                Instruction::Return,
            ],
        )
        .with_handler(ExceptionHandler {
            start: 0,
            end: 3,
            handler: 4,
            catch_type: None,
        });
        let name = BinaryName::from_string("app/Guarded".to_string()).unwrap();
        let class = ClassData::new(name, Some(BinaryName::OBJECT)).with_method(
            MethodData::new(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                UnqualifiedName::from_string("run".to_string()).unwrap(),
                MethodDescriptor::parse("()V").unwrap(),
            )
            .with_code(code),
        );
        let library: Arc<dyn ClassLibrary> =
            Arc::new(MemoryLibrary::new("app").with_class(class));
        let machine = Machine::new(vec![library], Settings::new().with_stderr(stderr));
        machine.new_thread("dispatch")
    }

    fn enter_run(thread: &mut Thread, last_pc: Pc) {
        let name = BinaryName::from_string("app/Guarded".to_string()).unwrap();
        let class = thread.load_class(&name).unwrap();
        let method = class
            .declared_method(
                &UnqualifiedName::from_string("run".to_string()).unwrap(),
                &MethodDescriptor::parse("()V").unwrap(),
            )
            .cloned()
            .unwrap();
        thread.enter_frame(class, method, vec![]).unwrap();
        let frame = thread.current_frame().unwrap();
        frame.push(Value::Int(1));
        frame.push(Value::Int(2));
        frame.last_pc = last_pc;
        frame.pc = last_pc + 1;
    }

    #[test]
    fn handler_sees_only_the_exception() {
        let mut thread = guarded_thread(Arc::new(Mutex::new(Vec::<u8>::new())));
        enter_run(&mut thread, 2);
        let exception = thread
            .new_throwable(&BinaryName::RUNTIMEEXCEPTION, "boom")
            .unwrap();
        thread.dispatch(exception.clone()).unwrap();

        let frame = thread.current_frame().unwrap();
        assert_eq!(frame.pc, 4, "jumped to the handler");
        assert_eq!(
            frame.stack,
            vec![Value::object(exception)],
            "operand stack holds just the exception"
        );
    }

    #[test]
    fn unmatched_exception_unwinds() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink: Sink = buffer.clone();
        let mut thread = guarded_thread(sink);
        enter_run(&mut thread, 3);
        let exception = thread
            .new_throwable(&BinaryName::RUNTIMEEXCEPTION, "late")
            .unwrap();
        thread.dispatch(exception.clone()).unwrap();

        assert_eq!(thread.depth(), 0, "the frame was popped");
        assert!(
            thread
                .uncaught_exception()
                .map_or(false, |uncaught| Arc::ptr_eq(uncaught, &exception)),
            "no caller, so the exception is uncaught"
        );
        let output = String::from_utf8_lossy(&buffer.lock()).into_owned();
        assert!(output.contains("java.lang.RuntimeException: late"), "{}", output);
        assert!(output.contains("app/Guarded.run()V"), "{}", output);
    }

    #[test]
    fn blank_frames_keep_the_exception() {
        let mut thread = guarded_thread(Arc::new(Mutex::new(Vec::<u8>::new())));
        thread.enter_blank_frame();
        let exception = thread
            .new_throwable(&BinaryName::ARITHMETICEXCEPTION, "zero")
            .unwrap();
        thread.dispatch(exception).unwrap();
        assert_eq!(thread.depth(), 1);
        assert!(thread.current_frame().unwrap().has_tossed());
    }
}
