//! Built-in `java/lang` classes and engine intrinsics
//!
//! Every machine consults this library before any application library. It carries just enough of
//! the class library for the engine to function: the root class, strings, class objects, the
//! throwables the engine raises, boxed numerics, and the native holders backing the bridge.

use super::ClassLibrary;
use crate::jvm::{
    BaseType, BinaryName, ClassAccessFlags, ClassData, Code, EqComparison, FieldAccessFlags,
    FieldData, FieldRef, FieldType, Instruction, InvokeType, MethodAccessFlags, MethodData,
    MethodDescriptor, MethodRef, UnqualifiedName,
};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

static CORE_CLASSES: Lazy<HashMap<BinaryName, Arc<ClassData>>> = Lazy::new(|| {
    core_classes()
        .into_iter()
        .map(|class| (class.name.clone(), Arc::new(class)))
        .collect()
});

/// Library of built-in classes
#[derive(Default)]
pub struct CoreLibrary;

impl CoreLibrary {
    pub fn new() -> CoreLibrary {
        CoreLibrary
    }
}

impl ClassLibrary for CoreLibrary {
    fn name(&self) -> &str {
        "core"
    }

    fn class_data(&self, name: &BinaryName) -> Option<Arc<ClassData>> {
        CORE_CLASSES.get(name).cloned()
    }

    fn resource(&self, _path: &str) -> Option<Vec<u8>> {
        None
    }
}

const PUBLIC: MethodAccessFlags = MethodAccessFlags::PUBLIC;
const PUBLIC_STATIC: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(
    MethodAccessFlags::PUBLIC.bits() | MethodAccessFlags::STATIC.bits(),
);
const PUBLIC_NATIVE: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(
    MethodAccessFlags::PUBLIC.bits() | MethodAccessFlags::NATIVE.bits(),
);
const PUBLIC_STATIC_NATIVE: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(
    MethodAccessFlags::PUBLIC.bits()
        | MethodAccessFlags::STATIC.bits()
        | MethodAccessFlags::NATIVE.bits(),
);

fn object(name: BinaryName) -> FieldType {
    FieldType::Object(name)
}

fn base(base: BaseType) -> FieldType {
    FieldType::Base(base)
}

fn desc(parameters: Vec<FieldType>, return_type: Option<FieldType>) -> MethodDescriptor {
    MethodDescriptor {
        parameters,
        return_type,
    }
}

fn name(value: &'static str) -> UnqualifiedName {
    UnqualifiedName::from_static(value)
}

fn invoke_special(
    class: BinaryName,
    method: UnqualifiedName,
    descriptor: MethodDescriptor,
) -> Instruction {
    Instruction::Invoke(
        InvokeType::Special,
        MethodRef {
            class,
            name: method,
            descriptor,
        },
    )
}

fn field_ref(class: &BinaryName, field: UnqualifiedName, descriptor: FieldType) -> FieldRef {
    FieldRef {
        class: class.clone(),
        name: field,
        descriptor,
    }
}

fn native(
    flags: MethodAccessFlags,
    method: &'static str,
    descriptor: MethodDescriptor,
) -> MethodData {
    MethodData::new(flags, name(method), descriptor)
}

/// Public static native method
fn static_native(
    method: &'static str,
    parameters: Vec<FieldType>,
    return_type: Option<FieldType>,
) -> MethodData {
    native(PUBLIC_STATIC_NATIVE, method, desc(parameters, return_type))
}

/// `<init>` taking `parameters`, delegating to the superclass constructor with the same arguments
fn delegating_constructor(super_class: &BinaryName, parameters: Vec<FieldType>) -> MethodData {
    let mut instructions = vec![Instruction::ALoad(0)];
    let mut slot = 1;
    for parameter in &parameters {
        instructions.push(load(parameter, slot));
        slot += if matches!(parameter, FieldType::Base(BaseType::Long | BaseType::Double)) {
            2
        } else {
            1
        };
    }
    instructions.push(invoke_special(
        super_class.clone(),
        UnqualifiedName::INIT,
        desc(parameters.clone(), None),
    ));
    instructions.push(Instruction::Return);
    MethodData::new(PUBLIC, UnqualifiedName::INIT, desc(parameters, None))
        .with_code(Code::new(slot, slot, instructions))
}

/// `<init>` storing a single argument into a field after calling the superclass's `<init>()V`
fn storing_constructor(
    class: &BinaryName,
    super_class: &BinaryName,
    field: UnqualifiedName,
    typ: FieldType,
) -> MethodData {
    let instructions = vec![
        Instruction::ALoad(0),
        invoke_special(super_class.clone(), UnqualifiedName::INIT, desc(vec![], None)),
        Instruction::ALoad(0),
        load(&typ, 1),
        Instruction::PutField(field_ref(class, field, typ.clone())),
        Instruction::Return,
    ];
    MethodData::new(PUBLIC, UnqualifiedName::INIT, desc(vec![typ], None))
        .with_code(Code::new(3, 3, instructions))
}

/// Instance getter returning a field
fn getter(
    class: &BinaryName,
    method: &'static str,
    field: UnqualifiedName,
    typ: FieldType,
) -> MethodData {
    let instructions = vec![
        Instruction::ALoad(0),
        Instruction::GetField(field_ref(class, field, typ.clone())),
        return_of(&typ),
    ];
    MethodData::new(PUBLIC, name(method), desc(vec![], Some(typ)))
        .with_code(Code::new(1, 2, instructions))
}

fn load(typ: &FieldType, slot: u16) -> Instruction {
    match typ {
        FieldType::Base(BaseType::Long) => Instruction::LLoad(slot),
        FieldType::Base(BaseType::Float) => Instruction::FLoad(slot),
        FieldType::Base(BaseType::Double) => Instruction::DLoad(slot),
        FieldType::Base(_) => Instruction::ILoad(slot),
        _ => Instruction::ALoad(slot),
    }
}

fn return_of(typ: &FieldType) -> Instruction {
    match typ {
        FieldType::Base(BaseType::Long) => Instruction::LReturn,
        FieldType::Base(BaseType::Float) => Instruction::FReturn,
        FieldType::Base(BaseType::Double) => Instruction::DReturn,
        FieldType::Base(_) => Instruction::IReturn,
        _ => Instruction::AReturn,
    }
}

fn core_classes() -> Vec<ClassData> {
    let mut classes = vec![
        object_class(),
        interface(BinaryName::CLONEABLE),
        interface(BinaryName::SERIALIZABLE),
        ClassData::new(BinaryName::CLASS, Some(BinaryName::OBJECT))
            .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
            .with_method(native(
                PUBLIC_NATIVE,
                "getName",
                desc(vec![], Some(object(BinaryName::STRING))),
            )),
        string_class(),
        system_class(),
        thread_class(),
        intrinsics_class(),
        object_access_class(),
        ClassData::new(BinaryName::NUMBER, Some(BinaryName::OBJECT))
            .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT)
            .with_interface(BinaryName::SERIALIZABLE)
            .with_method(delegating_constructor(&BinaryName::OBJECT, vec![])),
    ];

    // Throwables, parents before children
    let throwable = ClassData::new(BinaryName::THROWABLE, Some(BinaryName::OBJECT))
        .with_interface(BinaryName::SERIALIZABLE)
        .with_field(FieldData::new(
            FieldAccessFlags::PRIVATE,
            UnqualifiedName::MESSAGE,
            object(BinaryName::STRING),
        ))
        .with_method(delegating_constructor(&BinaryName::OBJECT, vec![]))
        .with_method(storing_constructor(
            &BinaryName::THROWABLE,
            &BinaryName::OBJECT,
            UnqualifiedName::MESSAGE,
            object(BinaryName::STRING),
        ))
        .with_method(getter(
            &BinaryName::THROWABLE,
            "getMessage",
            UnqualifiedName::MESSAGE,
            object(BinaryName::STRING),
        ));
    classes.push(throwable);
    let hierarchy = [
        (BinaryName::EXCEPTION, BinaryName::THROWABLE),
        (BinaryName::ERROR, BinaryName::THROWABLE),
        (BinaryName::RUNTIMEEXCEPTION, BinaryName::EXCEPTION),
        (BinaryName::INTERRUPTEDEXCEPTION, BinaryName::EXCEPTION),
        (BinaryName::ARITHMETICEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::ARRAYSTOREEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::CLASSCASTEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::ILLEGALMONITORSTATEEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::NEGATIVEARRAYSIZEEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::NULLPOINTEREXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::INDEXOUTOFBOUNDSEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
        (BinaryName::ARRAYINDEXOUTOFBOUNDSEXCEPTION, BinaryName::INDEXOUTOFBOUNDSEXCEPTION),
        (BinaryName::LINKAGEERROR, BinaryName::ERROR),
        (BinaryName::NOCLASSDEFFOUNDERROR, BinaryName::LINKAGEERROR),
        (BinaryName::INCOMPATIBLECLASSCHANGEERROR, BinaryName::LINKAGEERROR),
        (BinaryName::ABSTRACTMETHODERROR, BinaryName::INCOMPATIBLECLASSCHANGEERROR),
        (BinaryName::ILLEGALACCESSERROR, BinaryName::INCOMPATIBLECLASSCHANGEERROR),
        (BinaryName::INSTANTIATIONERROR, BinaryName::INCOMPATIBLECLASSCHANGEERROR),
        (BinaryName::NOSUCHFIELDERROR, BinaryName::INCOMPATIBLECLASSCHANGEERROR),
        (BinaryName::NOSUCHMETHODERROR, BinaryName::INCOMPATIBLECLASSCHANGEERROR),
        (BinaryName::VIRTUALMACHINEERROR, BinaryName::ERROR),
        (BinaryName::OUTOFMEMORYERROR, BinaryName::VIRTUALMACHINEERROR),
    ];
    for (class, super_class) in hierarchy {
        classes.push(
            ClassData::new(class, Some(super_class.clone()))
                .with_method(delegating_constructor(&super_class, vec![]))
                .with_method(delegating_constructor(
                    &super_class,
                    vec![object(BinaryName::STRING)],
                )),
        );
    }

    // Boxes
    let boxes = [
        (BinaryName::BOOLEAN, BinaryName::OBJECT, BaseType::Boolean, "booleanValue"),
        (BinaryName::CHARACTER, BinaryName::OBJECT, BaseType::Char, "charValue"),
        (BinaryName::BYTE, BinaryName::NUMBER, BaseType::Byte, "byteValue"),
        (BinaryName::SHORT, BinaryName::NUMBER, BaseType::Short, "shortValue"),
        (BinaryName::INTEGER, BinaryName::NUMBER, BaseType::Int, "intValue"),
        (BinaryName::LONG, BinaryName::NUMBER, BaseType::Long, "longValue"),
        (BinaryName::FLOAT, BinaryName::NUMBER, BaseType::Float, "floatValue"),
        (BinaryName::DOUBLE, BinaryName::NUMBER, BaseType::Double, "doubleValue"),
    ];
    for (class, super_class, typ, accessor) in boxes {
        classes.push(box_class(class, super_class, base(typ), accessor));
    }

    classes
}

fn interface(class: BinaryName) -> ClassData {
    ClassData::new(class, Some(BinaryName::OBJECT)).with_flags(
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
    )
}

fn object_class() -> ClassData {
    let this = object(BinaryName::OBJECT);
    let equals = vec![
        Instruction::ALoad(0),
        Instruction::ALoad(1),
        Instruction::IfACmp(EqComparison::NE, 5),
        Instruction::IConst(1),
        Instruction::IReturn,
        Instruction::IConst(0),
        Instruction::IReturn,
    ];
    let wait_forever = vec![
        Instruction::ALoad(0),
        Instruction::LConst(0),
        Instruction::Invoke(
            InvokeType::Virtual,
            MethodRef {
                class: BinaryName::OBJECT,
                name: name("wait"),
                descriptor: desc(vec![FieldType::long()], None),
            },
        ),
        Instruction::Return,
    ];

    ClassData::new(BinaryName::OBJECT, None)
        .with_method(
            MethodData::new(PUBLIC, UnqualifiedName::INIT, desc(vec![], None))
                .with_code(Code::new(1, 0, vec![Instruction::Return])),
        )
        .with_method(
            MethodData::new(PUBLIC, name("equals"), desc(vec![this], Some(base(BaseType::Boolean))))
                .with_code(Code::new(2, 2, equals)),
        )
        .with_method(
            MethodData::new(PUBLIC, name("wait"), desc(vec![], None))
                .with_code(Code::new(1, 3, wait_forever)),
        )
        .with_method(native(
            PUBLIC_NATIVE,
            "getClass",
            desc(vec![], Some(object(BinaryName::CLASS))),
        ))
        .with_method(native(PUBLIC_NATIVE, "hashCode", desc(vec![], Some(FieldType::int()))))
        .with_method(native(PUBLIC_NATIVE, "notify", desc(vec![], None)))
        .with_method(native(PUBLIC_NATIVE, "notifyAll", desc(vec![], None)))
        .with_method(native(PUBLIC_NATIVE, "wait", desc(vec![FieldType::long()], None)))
        .with_method(native(
            PUBLIC_NATIVE,
            "wait",
            desc(vec![FieldType::long(), FieldType::int()], None),
        ))
}

fn string_class() -> ClassData {
    let chars = FieldType::array(base(BaseType::Char));
    let string = BinaryName::STRING;
    let value = UnqualifiedName::VALUE;
    let char_at = vec![
        Instruction::ALoad(0),
        Instruction::GetField(field_ref(&string, value.clone(), chars.clone())),
        Instruction::ILoad(1),
        Instruction::CALoad,
        Instruction::IReturn,
    ];
    let length = vec![
        Instruction::ALoad(0),
        Instruction::GetField(field_ref(&string, value.clone(), chars.clone())),
        Instruction::ArrayLength,
        Instruction::IReturn,
    ];

    ClassData::new(string.clone(), Some(BinaryName::OBJECT))
        .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
        .with_interface(BinaryName::SERIALIZABLE)
        .with_field(FieldData::new(
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
            value.clone(),
            chars.clone(),
        ))
        .with_method(storing_constructor(&string, &BinaryName::OBJECT, value, chars))
        .with_method(
            MethodData::new(
                PUBLIC,
                name("charAt"),
                desc(vec![FieldType::int()], Some(base(BaseType::Char))),
            )
            .with_code(Code::new(2, 2, char_at)),
        )
        .with_method(
            MethodData::new(PUBLIC, name("length"), desc(vec![], Some(FieldType::int())))
                .with_code(Code::new(1, 1, length)),
        )
        .with_method(
            MethodData::new(PUBLIC, name("toString"), desc(vec![], Some(object(string.clone()))))
                .with_code(Code::new(1, 1, vec![Instruction::ALoad(0), Instruction::AReturn])),
        )
        .with_method(native(PUBLIC_NATIVE, "intern", desc(vec![], Some(object(string)))))
}

fn system_class() -> ClassData {
    let int = FieldType::int;
    let long = FieldType::long;
    let any = object(BinaryName::OBJECT);
    let string = object(BinaryName::STRING);
    ClassData::new(BinaryName::SYSTEM, Some(BinaryName::OBJECT))
        .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
        .with_method(static_native(
            "arraycopy",
            vec![any.clone(), int(), any.clone(), int(), int()],
            None,
        ))
        .with_method(static_native("currentTimeMillis", vec![], Some(long())))
        .with_method(static_native("nanoTime", vec![], Some(long())))
        .with_method(static_native("identityHashCode", vec![any], Some(int())))
        .with_method(static_native("getProperty", vec![string.clone()], Some(string)))
}

fn thread_class() -> ClassData {
    ClassData::new(BinaryName::THREAD, Some(BinaryName::OBJECT))
        .with_method(static_native("sleep", vec![FieldType::long()], None))
        .with_method(static_native(
            "holdsLock",
            vec![object(BinaryName::OBJECT)],
            Some(base(BaseType::Boolean)),
        ))
}

fn intrinsics_class() -> ClassData {
    let int = FieldType::int;
    let long = FieldType::long;
    let float = || base(BaseType::Float);
    let double = || base(BaseType::Double);
    let any = object(BinaryName::OBJECT);
    let mut class = ClassData::new(BinaryName::INTRINSICS, Some(BinaryName::OBJECT))
        .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
        .with_method(static_native("arrayLength", vec![any.clone()], Some(int())))
        .with_method(static_native("longPack", vec![int(), int()], Some(long())))
        .with_method(static_native("longUnpackHigh", vec![long()], Some(int())))
        .with_method(static_native("longUnpackLow", vec![long()], Some(int())))
        .with_method(static_native("doublePack", vec![int(), int()], Some(double())))
        .with_method(static_native("doubleToRawLongBits", vec![double()], Some(long())))
        .with_method(static_native("longBitsToDouble", vec![long()], Some(double())))
        .with_method(static_native("floatToRawIntBits", vec![float()], Some(int())))
        .with_method(static_native("intBitsToFloat", vec![int()], Some(float())))
        .with_method(static_native("objectToPointer", vec![any.clone()], Some(int())))
        .with_method(static_native("pointerToObject", vec![int()], Some(any)));

    // System calls take the call index plus up to eight arguments
    for arity in 0..=8 {
        let parameters: Vec<FieldType> = (0..=arity).map(|_| int()).collect();
        class = class
            .with_method(static_native("sysCall", parameters.clone(), Some(int())))
            .with_method(static_native("sysCallV", parameters, None));
    }
    class
}

fn object_access_class() -> ClassData {
    let int = FieldType::int;
    let any = || object(BinaryName::OBJECT);
    let class = || object(BinaryName::CLASS);
    let string = object(BinaryName::STRING);
    let boolean = base(BaseType::Boolean);
    ClassData::new(BinaryName::OBJECTACCESS, Some(BinaryName::OBJECT))
        .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
        .with_method(static_native("allocateObject", vec![string.clone()], Some(any())))
        .with_method(static_native("arrayNew", vec![class(), int()], Some(any())))
        .with_method(static_native("classByName", vec![string], Some(class())))
        .with_method(static_native("classOf", vec![any()], Some(class())))
        .with_method(static_native("identityHashCode", vec![any()], Some(int())))
        .with_method(static_native("holdsLock", vec![int(), any()], Some(boolean.clone())))
        .with_method(static_native("monitorNotify", vec![any(), boolean], Some(int())))
        .with_method(static_native(
            "monitorWait",
            vec![any(), FieldType::long(), int()],
            Some(int()),
        ))
}

fn box_class(
    class: BinaryName,
    super_class: BinaryName,
    typ: FieldType,
    accessor: &'static str,
) -> ClassData {
    let value = UnqualifiedName::VALUE;
    let value_of = vec![
        Instruction::New(class.clone()),
        Instruction::Dup,
        load(&typ, 0),
        invoke_special(class.clone(), UnqualifiedName::INIT, desc(vec![typ.clone()], None)),
        Instruction::AReturn,
    ];
    ClassData::new(class.clone(), Some(super_class.clone()))
        .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL)
        .with_field(FieldData::new(
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
            value.clone(),
            typ.clone(),
        ))
        .with_method(storing_constructor(&class, &super_class, value.clone(), typ.clone()))
        .with_method(getter(&class, accessor, value, typ.clone()))
        .with_method(
            MethodData::new(PUBLIC_STATIC, name("valueOf"), desc(vec![typ], Some(object(class))))
                .with_code(Code::new(2, 4, value_of)),
        )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hierarchy_is_complete() {
        let library = CoreLibrary::new();
        for class in CORE_CLASSES.values() {
            if let Some(super_class) = &class.super_class {
                assert!(
                    library.class_data(super_class).is_some(),
                    "superclass {} of {} is built in",
                    super_class,
                    class.name
                );
            }
        }
        assert!(library.class_data(&BinaryName::OBJECT).unwrap().super_class.is_none());
    }

    #[test]
    fn syscall_arities() {
        let library = CoreLibrary::new();
        let intrinsics = library.class_data(&BinaryName::INTRINSICS).unwrap();
        let sys_calls = intrinsics
            .methods
            .iter()
            .filter(|method| method.name.as_ref() == "sysCall")
            .count();
        assert_eq!(sys_calls, 9, "call index plus zero to eight arguments");
    }
}
