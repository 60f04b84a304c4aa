mod common;

use common::*;
use jmevm::jvm::{
    BinaryName, ClassData, Code, ExceptionHandler, Instruction::*, InvokeType, OrdComparison,
};
use jmevm::vm::{EntryPoint, Error, ThreadStatus, Value};

const LOCK: &str = "Ljava/lang/Object;";

fn lock() -> jmevm::jvm::Instruction {
    get_static("demo/Mailbox", "lock", LOCK)
}

/// Shared state: a lock object plus the flags the threads communicate through
fn mailbox() -> ClassData {
    class("demo/Mailbox", "java/lang/Object")
        .with_field(static_field("lock", LOCK))
        .with_field(static_field("value", "I"))
        .with_field(static_field("interrupted", "I"))
        .with_method(static_method(
            "<clinit>",
            "()V",
            0,
            vec![
                New(BinaryName::OBJECT),
                Dup,
                invoke(InvokeType::Special, "java/lang/Object", "<init>", "()V"),
                put_static("demo/Mailbox", "lock", LOCK),
                Return,
            ],
        ))
}

/// Waits under the lock until `value` is set
fn waiter() -> ClassData {
    class("demo/Waiter", "java/lang/Object").with_method(static_method(
        "main",
        "([Ljava/lang/String;)V",
        1,
        vec![
            lock(),
            MonitorEnter,
            get_static("demo/Mailbox", "value", "I"),
            If(OrdComparison::NE, 7),
            lock(),
            invoke(InvokeType::Virtual, "java/lang/Object", "wait", "()V"),
            Goto(2),
            lock(),
            MonitorExit,
            Return,
        ],
    ))
}

fn notifier() -> ClassData {
    class("demo/Notifier", "java/lang/Object").with_method(static_method(
        "main",
        "([Ljava/lang/String;)V",
        1,
        vec![
            lock(),
            MonitorEnter,
            IConst(1),
            put_static("demo/Mailbox", "value", "I"),
            lock(),
            invoke(InvokeType::Virtual, "java/lang/Object", "notifyAll", "()V"),
            lock(),
            MonitorExit,
            Return,
        ],
    ))
}

/// Waits forever, recording an interrupt in `interrupted`
fn sleeper() -> ClassData {
    let code = Code::new(
        1,
        8,
        vec![
            lock(),
            MonitorEnter,
            lock(),
            LConst(0),
            invoke(InvokeType::Virtual, "java/lang/Object", "wait", "(J)V"),
            lock(),
            MonitorExit,
            Return,
            Pop,
            IConst(1),
            put_static("demo/Mailbox", "interrupted", "I"),
            lock(),
            MonitorExit,
            Return,
        ],
    )
    .with_handler(ExceptionHandler {
        start: 4,
        end: 5,
        handler: 8,
        catch_type: Some(BinaryName::INTERRUPTEDEXCEPTION),
    });
    class("demo/Sleeper", "java/lang/Object").with_method(
        jmevm::jvm::MethodData::new(
            public_static(),
            member("main"),
            descriptor("([Ljava/lang/String;)V"),
        )
        .with_code(code),
    )
}

fn rude() -> ClassData {
    class("demo/Rude", "java/lang/Object").with_method(static_method(
        "poke",
        "()V",
        0,
        vec![
            New(BinaryName::OBJECT),
            Dup,
            invoke(InvokeType::Special, "java/lang/Object", "<init>", "()V"),
            invoke(InvokeType::Virtual, "java/lang/Object", "notify", "()V"),
            Return,
        ],
    ))
}

fn classes() -> Vec<ClassData> {
    vec![mailbox(), waiter(), notifier(), sleeper(), rude()]
}

#[test]
fn wait_and_notify() {
    init_logging();
    let machine = machine(classes());
    let waiting = machine
        .start_thread(EntryPoint::main(class_name("demo/Waiter")), vec![])
        .unwrap();
    let id = waiting.id();
    assert!(
        eventually(|| machine.thread_status(id) == Some(ThreadStatus::Waiting)),
        "the waiter blocks on the lock"
    );

    let notifying = machine
        .start_thread(EntryPoint::main(class_name("demo/Notifier")), vec![])
        .unwrap();
    notifying.join().unwrap();
    waiting.join().unwrap();
    assert_eq!(static_value(&machine, "demo/Mailbox", "value"), Value::Int(1));
    assert_eq!(machine.thread_status(id), Some(ThreadStatus::Terminated));
}

#[test]
fn interrupting_a_wait_throws() {
    init_logging();
    let machine = machine(classes());
    let sleeping = machine
        .start_thread(EntryPoint::main(class_name("demo/Sleeper")), vec![])
        .unwrap();
    let id = sleeping.id();
    assert!(eventually(
        || machine.thread_status(id) == Some(ThreadStatus::Waiting)
    ));

    machine.interrupt(id).unwrap();
    sleeping.join().unwrap();
    assert_eq!(
        static_value(&machine, "demo/Mailbox", "interrupted"),
        Value::Int(1),
        "InterruptedException reached the handler"
    );
}

#[test]
fn notify_requires_ownership() {
    init_logging();
    let machine = machine(classes());
    let mut thread = machine.new_thread("rude");
    let trap = call_static(&mut thread, "demo/Rude", "poke", "()V", vec![]).unwrap_err();
    assert_eq!(thrown_class(trap), BinaryName::ILLEGALMONITORSTATEEXCEPTION);
}

#[test]
fn exit_wakes_waiting_threads() {
    init_logging();
    let machine = machine(classes());
    let waiting = machine
        .start_thread(EntryPoint::main(class_name("demo/Waiter")), vec![])
        .unwrap();
    let id = waiting.id();
    assert!(eventually(
        || machine.thread_status(id) == Some(ThreadStatus::Waiting)
    ));

    machine.exit(5);
    let result = waiting.join();
    assert!(matches!(result, Err(Error::Exit(5))), "got {:?}", result);
    assert_eq!(machine.exit_status(), Some(5));
}
