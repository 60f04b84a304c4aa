mod common;

use common::*;
use jmevm::jvm::{
    BaseType, BinaryName, ClassData, Code, Constant, EqComparison, ExceptionHandler,
    FieldAccessFlags, FieldData, Instruction::*, InvokeType, MethodAccessFlags, MethodData,
};
use jmevm::vm::{EntryPoint, Error, NativeRegistry, NativeValue, Settings, Thread, Trap, Value};
use std::sync::Arc;

#[test]
fn subtraction_end_to_end() {
    init_logging();
    let main = class("demo/Arith", "java/lang/Object")
        .with_field(static_field("result", "I"))
        .with_method(static_method(
            "main",
            "([Ljava/lang/String;)V",
            1,
            vec![
                IConst(7),
                IConst(3),
                ISub,
                put_static("demo/Arith", "result", "I"),
                Return,
            ],
        ));
    let machine = machine(vec![main]);
    machine
        .run_main(&EntryPoint::main(class_name("demo/Arith")), &[])
        .unwrap();
    assert_eq!(static_value(&machine, "demo/Arith", "result"), Value::Int(4), "7 - 3");
}

#[test]
fn handlers_clear_the_operand_stack() {
    init_logging();
    let store = MethodData::new(public_static(), member("store"), descriptor("()I")).with_code(
        Code::new(
            0,
            8,
            vec![
                IConst(2),
                NewArray(BaseType::Int),
                IConst(5),
                IConst(9),
                IAStore,
                IConst(0),
                IReturn,
                InstanceOf(BinaryName::ARRAYINDEXOUTOFBOUNDSEXCEPTION),
                IReturn,
            ],
        )
        .with_handler(ExceptionHandler {
            start: 0,
            end: 5,
            handler: 7,
            catch_type: Some(BinaryName::RUNTIMEEXCEPTION),
        }),
    );
    let machine = machine(vec![class("demo/Bounds", "java/lang/Object").with_method(store)]);
    let mut thread = machine.new_thread("bounds");
    assert_eq!(
        call_int(&mut thread, "demo/Bounds", "store"),
        1,
        "out of bounds store is caught as ArrayIndexOutOfBoundsException"
    );
}

#[test]
fn handler_ranges_and_order() {
    init_logging();
    let handler = |start, end, handler, catch_type: Option<BinaryName>| ExceptionHandler {
        start,
        end,
        handler,
        catch_type,
    };
    // Division by zero at 2; handlers are tried in table order
    let ordered = Code::new(
        0,
        8,
        vec![
            IConst(1),
            IConst(0),
            IDiv,
            IReturn,
            Pop,
            IConst(10),
            IReturn,
            Pop,
            IConst(20),
            IReturn,
            Pop,
            IConst(30),
            IReturn,
        ],
    )
    .with_handler(handler(0, 3, 4, Some(BinaryName::NULLPOINTEREXCEPTION)))
    .with_handler(handler(0, 3, 7, Some(BinaryName::THROWABLE)))
    .with_handler(handler(0, 3, 10, Some(BinaryName::ARITHMETICEXCEPTION)));

    // The end of a range is exclusive
    let outside = Code::new(0, 8, vec![Nop, AConstNull, AThrow, Pop, IConst(1), IReturn])
        .with_handler(handler(0, 2, 3, None));

    let class = class("demo/Ranges", "java/lang/Object")
        .with_method(
            MethodData::new(public_static(), member("ordered"), descriptor("()I"))
                .with_code(ordered),
        )
        .with_method(
            MethodData::new(public_static(), member("outside"), descriptor("()I"))
                .with_code(outside),
        );
    let machine = machine(vec![class]);
    let mut thread = machine.new_thread("ranges");

    assert_eq!(
        call_int(&mut thread, "demo/Ranges", "ordered"),
        20,
        "first assignable handler in table order wins"
    );
    let escaped = call_static(&mut thread, "demo/Ranges", "outside", "()I", vec![]).unwrap_err();
    assert_eq!(
        thrown_class(escaped),
        BinaryName::NULLPOINTEREXCEPTION,
        "athrow of null is not covered by a range ending before it"
    );
    assert_eq!(thread.depth(), 0, "the failed call leaves no frames behind");
}

#[test]
fn invokespecial_calls_the_superclass() {
    init_logging();
    let name_returning = |value| {
        method(
            MethodAccessFlags::PUBLIC,
            "name",
            "()I",
            1,
            vec![IConst(value), IReturn],
        )
    };
    let base = class("demo/Base", "java/lang/Object").with_method(name_returning(1));
    let derived = class("demo/Derived", "demo/Base")
        .with_method(name_returning(2))
        .with_method(method(
            MethodAccessFlags::PUBLIC,
            "superName",
            "()I",
            1,
            vec![
                ALoad(0),
                invoke(InvokeType::Special, "demo/Base", "name", "()I"),
                IReturn,
            ],
        ))
        .with_method(static_method(
            "check",
            "()I",
            1,
            vec![
                New(class_name("demo/Derived")),
                Dup,
                invoke(InvokeType::Special, "demo/Derived", "<init>", "()V"),
                AStore(0),
                ALoad(0),
                invoke(InvokeType::Virtual, "demo/Base", "name", "()I"),
                IConst(10),
                IMul,
                ALoad(0),
                invoke(InvokeType::Virtual, "demo/Derived", "superName", "()I"),
                IAdd,
                IReturn,
            ],
        ));
    let machine = machine(vec![base, derived]);
    let mut thread = machine.new_thread("dispatch");
    assert_eq!(
        call_int(&mut thread, "demo/Derived", "check"),
        21,
        "virtual dispatch finds the override, invokespecial the superclass version"
    );
}

#[test]
fn final_statics_are_written_only_by_clinit() {
    init_logging();
    let config = class("demo/Config", "java/lang/Object")
        .with_field(FieldData::new(
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            member("LIMIT"),
            field_type("I"),
        ))
        .with_method(static_method(
            "<clinit>",
            "()V",
            0,
            vec![IConst(5), put_static("demo/Config", "LIMIT", "I"), Return],
        ))
        .with_method(static_method(
            "limit",
            "()I",
            0,
            vec![get_static("demo/Config", "LIMIT", "I"), IReturn],
        ))
        .with_method(static_method(
            "tamper",
            "()V",
            0,
            vec![IConst(6), put_static("demo/Config", "LIMIT", "I"), Return],
        ));
    let machine = machine(vec![config]);
    let mut thread = machine.new_thread("finals");

    assert_eq!(call_int(&mut thread, "demo/Config", "limit"), 5, "set by <clinit>");
    let trap = call_static(&mut thread, "demo/Config", "tamper", "()V", vec![]).unwrap_err();
    assert_eq!(thrown_class(trap), BinaryName::ILLEGALACCESSERROR);
    assert_eq!(call_int(&mut thread, "demo/Config", "limit"), 5, "value unchanged");
}

#[test]
fn string_literals_are_interned() {
    init_logging();
    let strings = class("demo/Strings", "java/lang/Object")
        .with_method(static_method(
            "same",
            "()I",
            0,
            vec![
                Ldc(Constant::String("hello".to_string())),
                Ldc(Constant::String("hello".to_string())),
                IfACmp(EqComparison::NE, 5),
                IConst(1),
                IReturn,
                IConst(0),
                IReturn,
            ],
        ))
        .with_method(static_method(
            "literal",
            "()Ljava/lang/String;",
            0,
            vec![Ldc(Constant::String("hello".to_string())), AReturn],
        ))
        .with_method(static_method(
            "intern",
            "(Ljava/lang/String;)Ljava/lang/String;",
            1,
            vec![
                ALoad(0),
                invoke(
                    InvokeType::Virtual,
                    "java/lang/String",
                    "intern",
                    "()Ljava/lang/String;",
                ),
                AReturn,
            ],
        ));
    let machine = machine(vec![strings]);
    let mut thread = machine.new_thread("strings");

    assert_eq!(call_int(&mut thread, "demo/Strings", "same"), 1, "two ldc, one object");
    let literal = reference(
        call_static(&mut thread, "demo/Strings", "literal", "()Ljava/lang/String;", vec![])
            .unwrap(),
    );
    assert_eq!(thread.string_value(&literal).unwrap(), "hello");

    let fresh = thread.new_string("hello").unwrap();
    assert!(!Arc::ptr_eq(&fresh, &literal), "new strings are not interned");
    let interned = reference(
        call_static(
            &mut thread,
            "demo/Strings",
            "intern",
            "(Ljava/lang/String;)Ljava/lang/String;",
            vec![Value::object(fresh)],
        )
        .unwrap(),
    );
    assert!(Arc::ptr_eq(&interned, &literal), "String.intern finds the literal");
}

#[test]
fn clinit_runs_once_across_threads() {
    init_logging();
    let counter = class("demo/Counter", "java/lang/Object")
        .with_field(static_field("runs", "I"))
        .with_method(static_method(
            "<clinit>",
            "()V",
            0,
            vec![
                get_static("demo/Counter", "runs", "I"),
                IConst(1),
                IAdd,
                put_static("demo/Counter", "runs", "I"),
                LConst(50),
                invoke_static("java/lang/Thread", "sleep", "(J)V"),
                Return,
            ],
        ));
    let touch = class("demo/Touch", "java/lang/Object").with_method(static_method(
        "main",
        "([Ljava/lang/String;)V",
        1,
        vec![get_static("demo/Counter", "runs", "I"), Pop, Return],
    ));
    let machine = machine(vec![counter, touch]);

    let handles = (0..4)
        .map(|_| {
            machine
                .start_thread(EntryPoint::main(class_name("demo/Touch")), vec![])
                .unwrap()
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(
        static_value(&machine, "demo/Counter", "runs"),
        Value::Int(1),
        "<clinit> ran exactly once"
    );
}

#[test]
fn uncaught_exceptions_reach_the_handler() {
    init_logging();
    let (stderr, output) = capture();
    let handler = class("demo/Handler", "java/lang/Object")
        .with_field(static_field("seen", "Ljava/lang/Throwable;"))
        .with_method(static_method(
            "report",
            "(Ljava/lang/Throwable;)V",
            1,
            vec![
                ALoad(0),
                put_static("demo/Handler", "seen", "Ljava/lang/Throwable;"),
                Return,
            ],
        ));
    let main = class("demo/Boom", "java/lang/Object").with_method(static_method(
        "main",
        "([Ljava/lang/String;)V",
        1,
        vec![
            New(BinaryName::RUNTIMEEXCEPTION),
            Dup,
            Ldc(Constant::String("boom".to_string())),
            invoke(
                InvokeType::Special,
                "java/lang/RuntimeException",
                "<init>",
                "(Ljava/lang/String;)V",
            ),
            AThrow,
        ],
    ));
    let settings = Settings::new()
        .with_stderr(stderr)
        .with_uncaught_handler(class_name("demo/Handler"), member("report"));
    let machine = machine_with(vec![handler, main], settings);

    let result = machine.run_main(&EntryPoint::main(class_name("demo/Boom")), &[]);
    match result {
        Err(Error::Uncaught(name)) => assert_eq!(name, BinaryName::RUNTIMEEXCEPTION),
        other => panic!("expected an uncaught exception, got {:?}", other),
    }
    let seen = static_value(&machine, "demo/Handler", "seen");
    assert!(
        matches!(seen, Value::Reference(Some(_))),
        "the handler received the exception"
    );

    let output = captured(&output);
    assert!(
        output.contains("Exception in thread \"main\" java.lang.RuntimeException: boom"),
        "headline in {}",
        output
    );
    assert!(output.contains("*** EXTERNAL STACK TRACE ***"));
    assert!(output.contains("*** INTERNAL STACK TRACE ***"));
    assert!(output.contains("demo/Boom.main"), "guest frames in {}", output);
}

#[test]
fn exit_stops_the_machine() {
    init_logging();
    let main = class("demo/Quit", "java/lang/Object")
        .with_field(static_field("after", "I"))
        .with_method(static_method(
            "main",
            "([Ljava/lang/String;)V",
            1,
            vec![
                IConst(11),
                IConst(3),
                sys_call_void(1),
                IConst(1),
                put_static("demo/Quit", "after", "I"),
                Return,
            ],
        ));
    let machine = machine(vec![main]);
    let result = machine.run_main(&EntryPoint::main(class_name("demo/Quit")), &[]);
    assert!(matches!(result, Err(Error::Exit(3))), "got {:?}", result);
    assert_eq!(machine.exit_status(), Some(3));
    assert_eq!(
        static_value(&machine, "demo/Quit", "after"),
        Value::Int(0),
        "nothing runs after exit"
    );
}

#[test]
fn main_receives_its_arguments() {
    init_logging();
    let main = class("demo/Args", "java/lang/Object")
        .with_field(static_field("count", "I"))
        .with_field(static_field("first", "Ljava/lang/String;"))
        .with_method(static_method(
            "main",
            "([Ljava/lang/String;)V",
            1,
            vec![
                ALoad(0),
                ArrayLength,
                put_static("demo/Args", "count", "I"),
                ALoad(0),
                IConst(0),
                AALoad,
                put_static("demo/Args", "first", "Ljava/lang/String;"),
                Return,
            ],
        ));
    let machine = machine(vec![main]);
    let arguments = vec!["alpha".to_string(), "beta".to_string()];
    machine
        .run_main(&EntryPoint::main(class_name("demo/Args")), &arguments)
        .unwrap();
    assert_eq!(static_value(&machine, "demo/Args", "count"), Value::Int(2));

    let first = static_value(&machine, "demo/Args", "first")
        .as_reference()
        .unwrap()
        .unwrap();
    let thread = machine.new_thread("inspect");
    assert_eq!(thread.string_value(&first).unwrap(), "alpha");
}

fn greet(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let name = arguments[0].as_str()?.unwrap_or("nobody").to_string();
    let times = arguments[1].as_int()?;
    assert_eq!(thread.depth(), 2, "natives run without a frame of their own");
    Ok(NativeValue::String(format!("{}x{}", name, times)))
}

fn natives_class() -> ClassData {
    class("demo/Natives", "java/lang/Object")
        .with_method(MethodData::new(
            public_static() | MethodAccessFlags::NATIVE,
            member("greet"),
            descriptor("(Ljava/lang/String;I)Ljava/lang/String;"),
        ))
        .with_method(MethodData::new(
            public_static() | MethodAccessFlags::NATIVE,
            member("unbound"),
            descriptor("()V"),
        ))
        .with_method(static_method(
            "run",
            "()Ljava/lang/String;",
            0,
            vec![
                Ldc(Constant::String("hi".to_string())),
                IConst(3),
                invoke_static(
                    "demo/Natives",
                    "greet",
                    "(Ljava/lang/String;I)Ljava/lang/String;",
                ),
                AReturn,
            ],
        ))
        .with_method(static_method(
            "main",
            "([Ljava/lang/String;)V",
            1,
            vec![invoke_static("demo/Natives", "unbound", "()V"), Return],
        ))
}

#[test]
fn native_methods_cross_the_bridge() {
    init_logging();
    let mut natives = NativeRegistry::with_builtins();
    natives.register(
        &class_name("demo/Natives"),
        "greet",
        "(Ljava/lang/String;I)Ljava/lang/String;",
        greet,
    );
    let library: Arc<dyn jmevm::vm::ClassLibrary> =
        Arc::new(library("test", vec![natives_class()]));
    let machine = jmevm::vm::Machine::with_natives(vec![library], Settings::new(), natives);
    let mut thread = machine.new_thread("bridge");

    let result = reference(
        call_static(&mut thread, "demo/Natives", "run", "()Ljava/lang/String;", vec![]).unwrap(),
    );
    assert_eq!(thread.string_value(&result).unwrap(), "hix3");
}

#[test]
fn missing_native_binding_is_fatal() {
    init_logging();
    let (stderr, output) = capture();
    let machine = machine_with(vec![natives_class()], Settings::new().with_stderr(stderr));
    let result = machine.run_main(&EntryPoint::main(class_name("demo/Natives")), &[]);
    assert!(matches!(result, Err(Error::Fatal(_))), "got {:?}", result);
    assert_eq!(machine.exit_status(), Some(1), "a fatal error brings the machine down");
    assert!(captured(&output).contains("FATAL: no native binding"));
}
