use super::{Class, InitState, Thread, Trap, Value};
use crate::jvm::{Constant, MethodDescriptor, UnqualifiedName};
use log::debug;
use std::sync::Arc;

impl Thread {
    /// Run static initialization for a class, at most once per machine
    ///
    /// The class is marked as initializing before anything else happens, so a `<clinit>` that
    /// (directly or not) refers back to its own class sees it as already set up. Other threads
    /// block on the machine lock until the initializer finishes. A failed `<clinit>` still leaves
    /// the class initialized; the failure is returned to whoever triggered initialization.
    pub fn initialize_class(&mut self, class: &Arc<Class>) -> Result<(), Trap> {
        if class.init_state() == InitState::Initialized {
            return Ok(());
        }
        let machine = self.machine.clone();
        let _guard = machine.global_lock();
        if class.init_state() != InitState::Uninitialized {
            return Ok(());
        }

        debug!("Initializing class {}", class.name);
        class.set_init_state(InitState::Initializing);
        let outcome = self.run_initialization(class);
        class.set_init_state(InitState::Initialized);
        debug!("Initialized class {}", class.name);
        outcome
    }

    fn run_initialization(&mut self, class: &Arc<Class>) -> Result<(), Trap> {
        for field in class.fields.iter().filter(|field| field.is_static()) {
            let value = match &field.constant_value {
                Some(Constant::String(text)) => Value::object(self.intern(text)?),
                Some(constant) => Value::from_constant(constant)
                    .filter(|value| value.matches(&field.descriptor))
                    .unwrap_or_else(|| Value::default_for(&field.descriptor)),
                None => Value::default_for(&field.descriptor),
            };
            self.machine.set_static(field, value);
        }

        if let Some(super_class) = &class.super_class {
            self.initialize_class(super_class)?;
        }
        for interface in &class.interfaces {
            self.initialize_class(interface)?;
        }

        let void = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        if let Some(initializer) = class.declared_method(&UnqualifiedName::CLINIT, &void) {
            self.invoke_method(class.clone(), initializer.clone(), vec![])?;
        }
        Ok(())
    }
}
