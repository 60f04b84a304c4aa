use super::{Class, ClassKind, ClassLibrary, Field, LinkError, Method};
use crate::jvm::{
    BaseType, BinaryName, ClassAccessFlags, FieldRef, FieldType, MethodRef, Name, ParseDescriptor,
    RenderDescriptor, Visibility,
};
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

const PRIMITIVES: [BaseType; 8] = [
    BaseType::Boolean,
    BaseType::Byte,
    BaseType::Char,
    BaseType::Short,
    BaseType::Int,
    BaseType::Long,
    BaseType::Float,
    BaseType::Double,
];

/// Turns class names into runtime class records, consulting libraries in order
///
/// Loading only builds the record: initialization (static storage and `<clinit>`) is driven by
/// the executing thread, since it has to run guest code.
pub struct ClassLoader {
    libraries: Vec<Arc<dyn ClassLibrary>>,
    classes: RwLock<HashMap<BinaryName, Arc<Class>>>,
}

impl ClassLoader {
    pub fn new(libraries: Vec<Arc<dyn ClassLibrary>>) -> ClassLoader {
        ClassLoader {
            libraries,
            classes: RwLock::new(HashMap::new()),
        }
    }

    pub fn libraries(&self) -> &[Arc<dyn ClassLibrary>] {
        &self.libraries
    }

    /// Number of classes loaded so far
    pub fn loaded_count(&self) -> usize {
        self.classes.read().len()
    }

    /// Already-loaded class, without triggering a load
    pub fn loaded(&self, name: &BinaryName) -> Option<Arc<Class>> {
        self.classes.read().get(name).cloned()
    }

    /// Return the cached class or build and register a new one
    pub fn load_class(&self, name: &BinaryName) -> Result<Arc<Class>, LinkError> {
        self.load_tracking(name, &mut vec![])
    }

    /// Load a class and check that `context` may see it
    pub fn resolve_class(
        &self,
        name: &BinaryName,
        context: Option<&Class>,
    ) -> Result<Arc<Class>, LinkError> {
        let class = self.load_class(name)?;
        check_class_access(&class, context)?;
        Ok(class)
    }

    /// Array class whose components are of the given type
    pub fn array_class(&self, component: &FieldType) -> Result<Arc<Class>, LinkError> {
        let name = FieldType::array(component.clone())
            .class_name()
            .ok_or_else(|| LinkError::Malformed {
                class: BinaryName::OBJECT,
                message: format!("bad array component {}", component.render()),
            })?;
        self.load_class(&name)
    }

    /// Resolve a symbolic field reference, checking class and member access
    pub fn resolve_field(
        &self,
        field_ref: &FieldRef,
        context: Option<&Class>,
    ) -> Result<(Arc<Class>, Arc<Field>), LinkError> {
        let class = self.resolve_class(&field_ref.class, context)?;
        let field = class
            .lookup_field(&field_ref.name)
            .filter(|field| field.descriptor == field_ref.descriptor)
            .ok_or_else(|| LinkError::NoSuchField {
                class: field_ref.class.clone(),
                name: field_ref.name.clone(),
            })?;
        let declaring = self.load_class(&field.class)?;
        check_member_access(
            &declaring,
            field.access_flags.visibility(),
            &format!("{}.{}", field.class, field.name),
            context,
        )?;
        Ok((declaring, field))
    }

    /// Resolve a symbolic method reference against the named class, checking access
    pub fn resolve_method(
        &self,
        method_ref: &MethodRef,
        context: Option<&Class>,
    ) -> Result<(Arc<Class>, Arc<Method>), LinkError> {
        let class = self.resolve_class(&method_ref.class, context)?;
        let method = class
            .lookup_method(&method_ref.name, &method_ref.descriptor)
            .ok_or_else(|| LinkError::NoSuchMethod {
                class: method_ref.class.clone(),
                name: method_ref.name.clone(),
                descriptor: method_ref.descriptor.render(),
            })?;
        let declaring = self.load_class(&method.class)?;
        check_member_access(
            &declaring,
            method.access_flags.visibility(),
            &method.to_string(),
            context,
        )?;
        Ok((declaring, method))
    }

    fn load_tracking(
        &self,
        name: &BinaryName,
        pending: &mut Vec<BinaryName>,
    ) -> Result<Arc<Class>, LinkError> {
        if let Some(class) = self.classes.read().get(name) {
            return Ok(class.clone());
        }
        if pending.contains(name) {
            return Err(LinkError::Malformed {
                class: name.clone(),
                message: "class circularly extends itself".to_string(),
            });
        }

        pending.push(name.clone());
        let defined = if name.is_array() {
            self.define_array(name, pending)
        } else if let Some(base) = PRIMITIVES
            .iter()
            .find(|base| base.primitive_name() == name.as_str())
        {
            Ok(Class::new(
                name.clone(),
                None,
                vec![],
                ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::ABSTRACT,
                ClassKind::Primitive(*base),
            ))
        } else {
            self.define_class(name, pending)
        };
        pending.pop();
        let defined = defined?;

        let mut classes = self.classes.write();
        let class = classes
            .entry(name.clone())
            .or_insert_with(|| Arc::new(defined))
            .clone();
        debug!("Loaded class {}", name);
        Ok(class)
    }

    fn define_class(
        &self,
        name: &BinaryName,
        pending: &mut Vec<BinaryName>,
    ) -> Result<Class, LinkError> {
        let data = self
            .libraries
            .iter()
            .find_map(|library| library.class_data(name))
            .ok_or_else(|| LinkError::ClassNotFound(name.clone()))?;
        let malformed = |message: &str| LinkError::Malformed {
            class: name.clone(),
            message: message.to_string(),
        };
        if &data.name != name {
            return Err(malformed("library returned a class with a different name"));
        }

        let super_class = match &data.super_class {
            None if name == &BinaryName::OBJECT => None,
            None => return Err(malformed("only java/lang/Object may lack a superclass")),
            Some(super_name) => {
                let super_class = self.load_tracking(super_name, pending)?;
                if super_class.is_interface() {
                    return Err(LinkError::IncompatibleClassChange(format!(
                        "{} extends interface {}",
                        name, super_name
                    )));
                }
                Some(super_class)
            }
        };
        let mut interfaces = vec![];
        for interface_name in &data.interfaces {
            let interface = self.load_tracking(interface_name, pending)?;
            if !interface.is_interface() {
                return Err(LinkError::IncompatibleClassChange(format!(
                    "{} implements non-interface {}",
                    name, interface_name
                )));
            }
            interfaces.push(interface);
        }

        let mut class = Class::new(
            name.clone(),
            super_class,
            interfaces,
            data.access_flags,
            ClassKind::Regular,
        );
        class.source_file = data.source_file.clone();
        for field in &data.fields {
            let slot = if field.is_static() {
                0
            } else {
                class.instance_layout.push(field.descriptor.clone());
                class.instance_layout.len() - 1
            };
            class.fields.push(Arc::new(Field {
                class: name.clone(),
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                access_flags: field.access_flags,
                slot,
                constant_value: field.constant_value.clone(),
            }));
        }
        for method in &data.methods {
            class.methods.push(Arc::new(Method {
                class: name.clone(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                access_flags: method.access_flags,
                code: method.code.clone(),
            }));
        }
        Ok(class)
    }

    fn define_array(
        &self,
        name: &BinaryName,
        pending: &mut Vec<BinaryName>,
    ) -> Result<Class, LinkError> {
        let component = match FieldType::parse(name.as_str()) {
            Ok(FieldType::Array(component)) => *component,
            _ => {
                return Err(LinkError::Malformed {
                    class: name.clone(),
                    message: "not an array descriptor".to_string(),
                })
            }
        };
        let component_class = match component.class_name() {
            Some(component_name) => Some(self.load_tracking(&component_name, pending)?),
            None => None,
        };
        let visible = component_class
            .as_ref()
            .map_or(true, |class| class.is_public());
        let mut access_flags = ClassAccessFlags::FINAL | ClassAccessFlags::ABSTRACT;
        if visible {
            access_flags |= ClassAccessFlags::PUBLIC;
        }

        let object = self.load_tracking(&BinaryName::OBJECT, pending)?;
        let interfaces = vec![
            self.load_tracking(&BinaryName::CLONEABLE, pending)?,
            self.load_tracking(&BinaryName::SERIALIZABLE, pending)?,
        ];
        Ok(Class::new(
            name.clone(),
            Some(object),
            interfaces,
            access_flags,
            ClassKind::Array {
                component,
                component_class,
            },
        ))
    }
}

/// Can code in `context` see `target`?
pub fn check_class_access(target: &Class, context: Option<&Class>) -> Result<(), LinkError> {
    // Arrays are as visible as their innermost element
    if let ClassKind::Array {
        component_class: Some(component),
        ..
    } = &target.kind
    {
        return check_class_access(component, context);
    }

    let context = match context {
        None => return Ok(()),
        Some(context) => context,
    };
    let allowed = target.is_public()
        || context.name == BinaryName::OBJECT
        || context.name == BinaryName::CLASS
        || context.name == target.name
        || context.is_subclass_of(target)
        || context.in_same_package(target);
    if allowed {
        Ok(())
    } else {
        Err(LinkError::IllegalAccess {
            target: target.name.to_string(),
            context: context.name.clone(),
        })
    }
}

/// Can code in `context` see a member with the given visibility declared on `declaring`?
pub fn check_member_access(
    declaring: &Class,
    visibility: Visibility,
    member: &str,
    context: Option<&Class>,
) -> Result<(), LinkError> {
    let context = match context {
        None => return Ok(()),
        Some(context) => context,
    };
    let allowed = context.name == declaring.name
        || match visibility {
            Visibility::Public => true,
            Visibility::Protected => {
                context.is_subclass_of(declaring) || context.in_same_package(declaring)
            }
            Visibility::PackagePrivate => context.in_same_package(declaring),
            Visibility::Private => false,
        };
    if allowed {
        Ok(())
    } else {
        Err(LinkError::IllegalAccess {
            target: member.to_string(),
            context: context.name.clone(),
        })
    }
}
