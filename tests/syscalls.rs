mod common;

use common::*;
use jmevm::jvm::{ClassData, Code, Instruction::*, MethodData};
use jmevm::vm::{syscall, Settings};

const CALL_STACK_ITEM: i32 = syscall::CALL_STACK_ITEM as i32;

/// `CALL_STACK_ITEM` for the calling frame
fn own_frame(item: i32) -> Vec<jmevm::jvm::Instruction> {
    vec![IConst(CALL_STACK_ITEM), IConst(0), IConst(item), sys_call(2)]
}

fn introspection() -> ClassData {
    let mut class_name_code = own_frame(syscall::call_stack_item::CLASS_NAME);
    class_name_code.extend(vec![
        IConst(syscall::LOAD_STRING as i32),
        Swap,
        sys_call(1),
        invoke_static(
            "jmevm/runtime/Intrinsics",
            "pointerToObject",
            "(I)Ljava/lang/Object;",
        ),
        AReturn,
    ]);
    let with_return = |mut code: Vec<jmevm::jvm::Instruction>| {
        code.push(IReturn);
        code
    };

    class("demo/Sys", "java/lang/Object")
        .with_source_file("Sys.java")
        .with_method(static_method(
            "className",
            "()Ljava/lang/Object;",
            0,
            class_name_code,
        ))
        .with_method(
            MethodData::new(public_static(), member("line"), descriptor("()I")).with_code(
                Code::new(
                    0,
                    8,
                    with_return(own_frame(syscall::call_stack_item::SOURCE_LINE)),
                )
                .with_line(0, 42),
            ),
        )
        .with_method(static_method(
            "noLine",
            "()I",
            0,
            with_return(own_frame(syscall::call_stack_item::SOURCE_LINE)),
        ))
        .with_method(static_method(
            "pc",
            "()I",
            0,
            with_return(own_frame(syscall::call_stack_item::PC_ADDRESS)),
        ))
        .with_method(static_method(
            "outer",
            "()I",
            0,
            vec![invoke_static("demo/Sys", "inner", "()I"), IReturn],
        ))
        .with_method(static_method(
            "inner",
            "()I",
            0,
            vec![IConst(syscall::CALL_STACK_HEIGHT as i32), sys_call(0), IReturn],
        ))
        .with_method(static_method(
            "write",
            "()V",
            0,
            vec![
                IConst(syscall::PD_WRITE_BYTE as i32),
                IConst(syscall::PD_OF_STDOUT as i32),
                sys_call(0),
                IConst(i32::from(b'o')),
                sys_call_void(2),
                IConst(syscall::PD_WRITE_BYTE as i32),
                IConst(syscall::PD_OF_STDOUT as i32),
                sys_call(0),
                IConst(i32::from(b'k')),
                sys_call_void(2),
                Return,
            ],
        ))
        .with_method(static_method(
            "badPipe",
            "()I",
            0,
            vec![
                IConst(syscall::PD_WRITE_BYTE as i32),
                IConst(9),
                IConst(0),
                sys_call(2),
                Pop,
                IConst(syscall::ERROR_GET as i32),
                IConst(syscall::PD_WRITE_BYTE as i32),
                sys_call(1),
                IReturn,
            ],
        ))
}

#[test]
fn call_stack_items() {
    init_logging();
    let machine = machine(vec![introspection()]);
    let mut thread = machine.new_thread("introspect");

    let name = reference(
        call_static(&mut thread, "demo/Sys", "className", "()Ljava/lang/Object;", vec![]).unwrap(),
    );
    assert_eq!(
        thread.string_value(&name).unwrap(),
        "demo/Sys",
        "depth 0 is the method making the call"
    );
    assert_eq!(call_int(&mut thread, "demo/Sys", "line"), 42);
    assert_eq!(call_int(&mut thread, "demo/Sys", "noLine"), -1, "no line table");
    assert_eq!(
        call_int(&mut thread, "demo/Sys", "pc"),
        3,
        "pc of the invoke instruction"
    );
    assert_eq!(
        call_int(&mut thread, "demo/Sys", "outer"),
        2,
        "host call frames are not counted"
    );
}

#[test]
fn pipes_from_guest_code() {
    init_logging();
    let (stdout, output) = capture();
    let machine = machine_with(vec![introspection()], Settings::new().with_stdout(stdout));
    let mut thread = machine.new_thread("pipes");

    call_static(&mut thread, "demo/Sys", "write", "()V", vec![]).unwrap();
    assert_eq!(captured(&output), "ok");
    assert_eq!(
        call_int(&mut thread, "demo/Sys", "badPipe"),
        syscall::PIPE_DESCRIPTOR_INVALID,
        "the failed write left its error behind"
    );
}
