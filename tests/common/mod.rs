//! Builders shared by the integration tests
//!
//! Guest classes are assembled directly from the decoded class model, so no class files are
//! involved.

#![allow(dead_code)]

use jmevm::jvm::{
    BinaryName, ClassAccessFlags, ClassData, Code, FieldAccessFlags, FieldData, FieldRef,
    FieldType, Instruction, InvokeType, MethodAccessFlags, MethodData, MethodDescriptor,
    MethodRef, Name, ParseDescriptor, UnqualifiedName,
};
use jmevm::vm::{
    ClassLibrary, Machine, MemoryLibrary, ObjectRef, Settings, Sink, Thread, Trap, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn class_name(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_string()).unwrap()
}

pub fn member(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_string()).unwrap()
}

pub fn descriptor(descriptor: &str) -> MethodDescriptor {
    MethodDescriptor::parse(descriptor).unwrap()
}

pub fn field_type(descriptor: &str) -> FieldType {
    FieldType::parse(descriptor).unwrap()
}

pub fn public_static() -> MethodAccessFlags {
    MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC
}

/// Method with a body (the operand stack limit is generous since it is never enforced)
pub fn method(
    flags: MethodAccessFlags,
    name: &str,
    desc: &str,
    max_locals: u16,
    instructions: Vec<Instruction>,
) -> MethodData {
    MethodData::new(flags, member(name), descriptor(desc))
        .with_code(Code::new(max_locals, 8, instructions))
}

pub fn static_method(
    name: &str,
    desc: &str,
    max_locals: u16,
    instructions: Vec<Instruction>,
) -> MethodData {
    method(public_static(), name, desc, max_locals, instructions)
}

pub fn static_field(name: &str, desc: &str) -> FieldData {
    FieldData::new(
        FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC,
        member(name),
        field_type(desc),
    )
}

pub fn method_ref(class: &str, name: &str, desc: &str) -> MethodRef {
    MethodRef {
        class: class_name(class),
        name: member(name),
        descriptor: descriptor(desc),
    }
}

pub fn field_ref(class: &str, name: &str, desc: &str) -> FieldRef {
    FieldRef {
        class: class_name(class),
        name: member(name),
        descriptor: field_type(desc),
    }
}

pub fn invoke(kind: InvokeType, class: &str, name: &str, desc: &str) -> Instruction {
    Instruction::Invoke(kind, method_ref(class, name, desc))
}

pub fn invoke_static(class: &str, name: &str, desc: &str) -> Instruction {
    invoke(InvokeType::Static, class, name, desc)
}

pub fn get_static(class: &str, name: &str, desc: &str) -> Instruction {
    Instruction::GetStatic(field_ref(class, name, desc))
}

pub fn put_static(class: &str, name: &str, desc: &str) -> Instruction {
    Instruction::PutStatic(field_ref(class, name, desc))
}

/// `sysCall` taking the call index plus `arguments` more ints
pub fn sys_call(arguments: usize) -> Instruction {
    let desc = format!("({})I", "I".repeat(arguments + 1));
    invoke_static("jmevm/runtime/Intrinsics", "sysCall", &desc)
}

pub fn sys_call_void(arguments: usize) -> Instruction {
    let desc = format!("({})V", "I".repeat(arguments + 1));
    invoke_static("jmevm/runtime/Intrinsics", "sysCallV", &desc)
}

/// `<init>()V` calling the superclass's no-argument constructor
pub fn constructor(super_class: &str) -> MethodData {
    method(
        MethodAccessFlags::PUBLIC,
        "<init>",
        "()V",
        1,
        vec![
            Instruction::ALoad(0),
            invoke(InvokeType::Special, super_class, "<init>", "()V"),
            Instruction::Return,
        ],
    )
}

/// Public class with a no-argument constructor
pub fn class(name: &str, super_class: &str) -> ClassData {
    ClassData::new(class_name(name), Some(class_name(super_class)))
        .with_flags(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)
        .with_method(constructor(super_class))
}

pub fn library(name: &str, classes: Vec<ClassData>) -> MemoryLibrary {
    classes
        .into_iter()
        .fold(MemoryLibrary::new(name), MemoryLibrary::with_class)
}

pub fn machine_with(classes: Vec<ClassData>, settings: Settings) -> Arc<Machine> {
    let library: Arc<dyn ClassLibrary> = Arc::new(library("test", classes));
    Machine::new(vec![library], settings)
}

pub fn machine(classes: Vec<ClassData>) -> Arc<Machine> {
    machine_with(classes, Settings::new())
}

/// Call a static method from the host on a thread
pub fn call_static(
    thread: &mut Thread,
    class: &str,
    name: &str,
    desc: &str,
    arguments: Vec<Value>,
) -> Result<Option<Value>, Trap> {
    let class = thread.load_class(&class_name(class))?;
    thread.initialize_class(&class)?;
    let method = class
        .declared_method(&member(name), &descriptor(desc))
        .cloned()
        .unwrap_or_else(|| panic!("{}.{}{} exists", class.name, name, desc));
    thread.invoke_method(class, method, arguments)
}

pub fn call_int(thread: &mut Thread, class: &str, name: &str) -> i32 {
    call_static(thread, class, name, "()I", vec![])
        .unwrap()
        .unwrap()
        .as_int()
        .unwrap()
}

/// Current value of a static field
pub fn static_value(machine: &Machine, class: &str, name: &str) -> Value {
    let class = machine.loader.load_class(&class_name(class)).unwrap();
    let field = class.declared_field(&member(name)).unwrap();
    machine.get_static(field)
}

/// Class of the exception carried by a trap
pub fn thrown_class(trap: Trap) -> BinaryName {
    match trap {
        Trap::Throw(exception) => exception.class().name.clone(),
        other => panic!("expected a guest exception, got {:?}", other),
    }
}

pub fn reference(value: Option<Value>) -> ObjectRef {
    value.unwrap().as_reference().unwrap().unwrap()
}

/// Sink collecting everything written to it
pub fn capture() -> (Sink, Arc<Mutex<Vec<u8>>>) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink: Sink = buffer.clone();
    (sink, buffer)
}

pub fn captured(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buffer.lock()).into_owned()
}

/// Poll until a condition holds, giving up after a few seconds
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
