mod common;

use common::*;
use jmevm::jvm::{ClassData, Instruction::*};
use jmevm::vm::{ClassLibrary, Settings, TaskError, TaskManager, TaskStatus, MANIFEST_PATH};
use std::collections::HashMap;
use std::sync::Arc;

fn main_class(name: &str, body: Vec<jmevm::jvm::Instruction>) -> ClassData {
    class(name, "java/lang/Object").with_method(static_method(
        "main",
        "([Ljava/lang/String;)V",
        1,
        body,
    ))
}

fn manager() -> (TaskManager, Arc<parking_lot::Mutex<Vec<u8>>>) {
    let app = library(
        "app",
        vec![
            main_class("demo/App", vec![Return]),
            main_class("demo/Game", vec![IConst(11), IConst(4), sys_call_void(1), Return]),
            main_class("demo/Boom", vec![AConstNull, AThrow]),
            main_class("demo/Hidden", vec![Return]),
        ],
    )
    .with_resource(
        MANIFEST_PATH,
        concat!(
            "Manifest-Version: 1.0\n",
            "Main-Class: demo.App\n",
            "MIDlet-1: Game, /game.png, demo.Game\n",
            "MIDlet-2: Boom, , demo.Boom\n",
        ),
    );
    let mut suites: HashMap<String, Arc<dyn ClassLibrary>> = HashMap::new();
    suites.insert("app".to_string(), Arc::new(app));

    let (stderr, output) = capture();
    let manager = TaskManager::new(Arc::new(suites), Settings::new().with_stderr(stderr));
    (manager, output)
}

#[test]
fn tasks_report_how_they_ended() {
    init_logging();
    let (manager, output) = manager();

    let app = manager.start_task(&["app"], "demo.App", &[]).unwrap();
    let game = manager.start_task(&["app"], "demo.Game", &[]).unwrap();
    let boom = manager.start_task(&["app"], "demo.Boom", &[]).unwrap();
    assert_eq!((app, game, boom), (1, 2, 3), "ids are handed out in order");

    assert_eq!(manager.wait(app), Some(TaskStatus::ExitedRegular));
    assert_eq!(
        manager.wait(game),
        Some(TaskStatus::ExitedFatal),
        "a non-zero exit status"
    );
    assert_eq!(
        manager.wait(boom),
        Some(TaskStatus::ExitedFatal),
        "an uncaught exception"
    );
    assert!(captured(&output).contains("java.lang.NullPointerException"));

    assert_eq!(
        manager.machine(game).unwrap().exit_status(),
        Some(4),
        "each task has its own machine"
    );
    assert_eq!(manager.machine(app).unwrap().settings.guest_depth, 1);
    assert_eq!(manager.task_status(99), None);
}

#[test]
fn entries_must_be_advertised() {
    init_logging();
    let (manager, _) = manager();

    let hidden = manager.start_task(&["app"], "demo.Hidden", &[]).unwrap_err();
    assert_eq!(hidden, TaskError::InvalidEntry("demo.Hidden".to_string()));
    assert_eq!(hidden.code(), -2);

    let missing = manager.start_task(&["nowhere", "app"], "demo.App", &[]).unwrap_err();
    assert_eq!(missing, TaskError::MissingLibrary("nowhere".to_string()));
    assert_eq!(missing.code(), -1);

    assert!(matches!(
        manager.start_task(&[], "demo.App", &[]),
        Err(TaskError::MissingLibrary(_))
    ));
    assert_eq!(manager.task_status(1), None, "failed starts use no id");
}
