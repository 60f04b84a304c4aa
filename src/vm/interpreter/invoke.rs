use crate::jvm::{InvokeType, MethodRef, UnqualifiedName};
use crate::vm::{Assignable, Class, Condition, Method, ObjectRef, Thread, Trap, Value};
use log::trace;
use std::sync::Arc;

fn incompatible(method: &Method, expected: &str) -> Trap {
    Trap::condition(
        Condition::IncompatibleClassChange,
        format!("{} is not {}", method, expected),
    )
}

fn abstract_method(method: impl std::fmt::Display) -> Trap {
    Trap::condition(Condition::AbstractMethod, method.to_string())
}

impl Thread {
    /// The four `invoke*` instructions
    ///
    /// The symbolic reference is always resolved against the named class first (which is where
    /// access checks happen). Only then does each policy pick the method that actually runs.
    pub(super) fn invoke(&mut self, kind: InvokeType, method_ref: &MethodRef) -> Result<(), Trap> {
        let context = self.current_class();
        let (declaring, method) = self
            .machine
            .loader
            .resolve_method(method_ref, context.as_deref())?;
        let parameters = method.descriptor.parameters.len();

        match kind {
            InvokeType::Static => {
                if !method.is_static() {
                    return Err(incompatible(&method, "static"));
                }
                self.initialize_class(&declaring)?;
                let arguments = self.current_frame()?.pop_many(parameters)?;
                self.enter_method(declaring, method, arguments)
            }

            InvokeType::Special => {
                if method.is_static() {
                    return Err(incompatible(&method, "an instance method"));
                }

                // Non-virtual super call: start the search at the caller's superclass
                let mut target = (declaring, method);
                if let Some(context) = &context {
                    let (_, method) = &target;
                    if !method.is_private() && method.name != UnqualifiedName::INIT {
                        let referenced = self.load_class(&method_ref.class)?;
                        if context.is_subclass_of(&referenced) {
                            target = self.lookup_from_superclass(context, method_ref)?;
                        }
                    }
                }

                let (class, method) = target;
                let arguments = self.current_frame()?.pop_many(parameters + 1)?;
                receiver_of(&arguments, &method)?;
                if method.is_abstract() {
                    return Err(abstract_method(&method));
                }
                self.enter_method(class, method, arguments)
            }

            InvokeType::Virtual | InvokeType::Interface => {
                let arguments = self.current_frame()?.pop_many(parameters + 1)?;
                let runtime = receiver_of(&arguments, &method)?.class().clone();
                if kind == InvokeType::Interface {
                    let interface = self.load_class(&method_ref.class)?;
                    if !runtime.is_assignable(&interface) {
                        return Err(Trap::condition(
                            Condition::IncompatibleClassChange,
                            format!("{} does not implement {}", runtime.name, interface.name),
                        ));
                    }
                }

                // Dynamic dispatch on the runtime class of the receiver
                let target = if method.is_private() {
                    Some(method.clone())
                } else {
                    runtime.lookup_method(&method_ref.name, &method_ref.descriptor)
                };
                let target = match target {
                    Some(target) if !target.is_abstract() => target,
                    _ => {
                        return Err(abstract_method(format!(
                            "{}.{} on {}",
                            method_ref.class, method_ref.name, runtime.name
                        )))
                    }
                };
                if target.is_static() {
                    return Err(incompatible(&target, "an instance method"));
                }
                let class = self.load_class(&target.class)?;
                self.enter_method(class, target, arguments)
            }
        }
    }

    fn lookup_from_superclass(
        &self,
        context: &Class,
        method_ref: &MethodRef,
    ) -> Result<(Arc<Class>, Arc<Method>), Trap> {
        let method = context
            .super_class
            .as_ref()
            .and_then(|sup| sup.lookup_method(&method_ref.name, &method_ref.descriptor))
            .ok_or_else(|| {
                abstract_method(format!(
                    "{}.{} from {}",
                    method_ref.class, method_ref.name, context.name
                ))
            })?;
        let class = self.load_class(&method.class)?;
        Ok((class, method))
    }

    /// Start executing a resolved method with its arguments (receiver first)
    ///
    /// Native methods complete immediately; methods with bodies get a new frame that the run loop
    /// picks up on its next step.
    pub(crate) fn enter_method(
        &mut self,
        class: Arc<Class>,
        method: Arc<Method>,
        arguments: Vec<Value>,
    ) -> Result<(), Trap> {
        if method.is_native() {
            if let Some(result) = self.call_native(&method, arguments)? {
                self.current_frame()?.push(result);
            }
            Ok(())
        } else if method.is_abstract() || method.code.is_none() {
            Err(abstract_method(&method))
        } else {
            self.enter_frame(class, method, arguments)
        }
    }

    /// Call a guest method from the host and run it to completion on this thread
    ///
    /// A blank frame under the callee receives either its return value or the exception that
    /// escaped it.
    pub fn invoke_method(
        &mut self,
        class: Arc<Class>,
        method: Arc<Method>,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, Trap> {
        trace!("Host call into {}", method);
        let depth = self.frames.len();
        self.enter_blank_frame();
        let outcome = match self.enter_method(class, method, arguments) {
            Ok(()) => self.run(depth + 1),
            Err(trap) => Err(trap),
        };
        if let Err(trap) = outcome {
            self.frames.truncate(depth);
            return Err(trap);
        }

        let mut blank = self
            .pop_frame()
            .ok_or_else(|| Trap::fatal("host call frame vanished"))?;
        if let Some(exception) = blank.take_tossed() {
            return Err(Trap::Throw(exception));
        }
        Ok(blank.stack.pop())
    }

    /// `xreturn` and `return`
    pub(super) fn return_from_method(&mut self, has_value: bool) -> Result<(), Trap> {
        let mut frame = self
            .pop_frame()
            .ok_or_else(|| Trap::fatal("return with no frame"))?;
        let value = if has_value { Some(frame.pop()?) } else { None };

        if let Some(activation) = &frame.activation {
            let return_type = &activation.method.descriptor.return_type;
            let well_typed = match (&value, return_type) {
                (None, None) => true,
                (Some(value), Some(typ)) => value.matches(typ),
                _ => false,
            };
            if !well_typed {
                return Err(Trap::fatal(format!(
                    "{} returned {}",
                    activation.method,
                    value.as_ref().map_or("nothing", Value::kind_name)
                )));
            }
        }

        if let (Some(value), Some(caller)) = (value, self.frames.last_mut()) {
            caller.push(value);
        }
        Ok(())
    }
}

/// The receiver must be a non-null reference
fn receiver_of<'a>(arguments: &'a [Value], method: &Method) -> Result<&'a ObjectRef, Trap> {
    match arguments.first() {
        Some(Value::Reference(Some(receiver))) => Ok(receiver),
        Some(Value::Reference(None)) => Err(Trap::null_pointer(format!(
            "null receiver for {}",
            method
        ))),
        _ => Err(Trap::fatal(format!("no receiver for {}", method))),
    }
}
