use crate::jvm::{Constant, FieldAccessFlags, FieldType, UnqualifiedName};

/// Decoded field
#[derive(Clone, Debug)]
pub struct FieldData {
    pub access_flags: FieldAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,

    /// `ConstantValue` attribute, used to seed static fields when storage is allocated
    pub constant_value: Option<Constant>,
}

impl FieldData {
    pub fn new(
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType,
    ) -> FieldData {
        FieldData {
            access_flags,
            name,
            descriptor,
            constant_value: None,
        }
    }

    pub fn with_constant(mut self, constant: Constant) -> FieldData {
        self.constant_value = Some(constant);
        self
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}
