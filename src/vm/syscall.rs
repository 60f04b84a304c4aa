//! Numbered system calls: the only path from guest code to host services
//!
//! Guest code reaches these through the `sysCall`/`sysCallV` intrinsics, passing a call index and
//! up to eight integer arguments. Every call produces one integer and records an error code for
//! itself in the calling thread's error table, which `ERROR_GET` reads back.

use super::{Thread, Trap};
use crate::jvm::{Name, RenderDescriptor};
use log::{debug, trace};
use std::time::{SystemTime, UNIX_EPOCH};

pub const QUERY_INDEX: usize = 0;
pub const ERROR_GET: usize = 1;
pub const ERROR_SET: usize = 2;
pub const TIME_LO_MILLI_WALL: usize = 3;
pub const TIME_HI_MILLI_WALL: usize = 4;
pub const TIME_LO_NANO_MONO: usize = 5;
pub const TIME_HI_NANO_MONO: usize = 6;
pub const VMI_MEM_FREE: usize = 7;
pub const VMI_MEM_USED: usize = 8;
pub const VMI_MEM_MAX: usize = 9;
pub const GARBAGE_COLLECT: usize = 10;
pub const EXIT: usize = 11;
pub const API_LEVEL: usize = 12;
pub const PD_OF_STDIN: usize = 13;
pub const PD_OF_STDOUT: usize = 14;
pub const PD_OF_STDERR: usize = 15;
pub const PD_WRITE_BYTE: usize = 16;
pub const LOAD_STRING: usize = 17;
pub const FATAL_TODO: usize = 18;
pub const CALL_STACK_HEIGHT: usize = 19;
pub const CALL_STACK_ITEM: usize = 20;

/// Number of call indices (all of which are supported)
pub const SYSTEM_CALL_COUNT: usize = 21;

pub const NO_ERROR: i32 = 0;
pub const UNSUPPORTED_SYSTEM_CALL: i32 = -1;
pub const PIPE_DESCRIPTOR_INVALID: i32 = -2;
pub const PIPE_DESCRIPTOR_BAD_WRITE: i32 = -3;
pub const VALUE_OUT_OF_RANGE: i32 = -4;

/// Items of a call stack frame readable through `CALL_STACK_ITEM`
pub mod call_stack_item {
    pub const CLASS_NAME: i32 = 0;
    pub const METHOD_NAME: i32 = 1;
    pub const METHOD_TYPE: i32 = 2;
    pub const SOURCE_FILE: i32 = 3;
    pub const SOURCE_LINE: i32 = 4;
    pub const PC_ADDRESS: i32 = 5;
    pub const JAVA_PC_ADDRESS: i32 = 6;
}

/// Level reported by `API_LEVEL`
pub const CURRENT_API_LEVEL: i32 = 30000;

/// Pipe descriptors
const STDIN: i32 = 0;
const STDOUT: i32 = 1;
const STDERR: i32 = 2;

/// Result of a call: a value, or an error code (the call then returns -1)
type CallResult = Result<i32, i32>;

/// Run a system call on behalf of a thread
///
/// Unknown indices return -1 and record [`UNSUPPORTED_SYSTEM_CALL`] against [`QUERY_INDEX`].
/// Guest-visible failures are reported through the error table; only machine exit and fatal
/// errors escape as traps.
pub fn system_call(thread: &mut Thread, index: i32, arguments: &[i32]) -> Result<i32, Trap> {
    let call = match usize::try_from(index) {
        Ok(call) if call < SYSTEM_CALL_COUNT => call,
        _ => {
            debug!("Unsupported system call {}", index);
            thread.shared.set_error(QUERY_INDEX, UNSUPPORTED_SYSTEM_CALL);
            return Ok(-1);
        }
    };
    let argument = |position: usize| arguments.get(position).copied().unwrap_or(0);
    trace!("System call {} with {:?}", call, arguments);

    let outcome: CallResult = match call {
        QUERY_INDEX => {
            let supported = usize::try_from(argument(0)).map_or(false, |i| i < SYSTEM_CALL_COUNT);
            Ok(i32::from(supported))
        }
        ERROR_GET => Ok(thread.shared.error(error_slot(argument(0)))),
        ERROR_SET => Ok(thread.shared.set_error(error_slot(argument(0)), argument(1))),
        TIME_LO_MILLI_WALL => Ok(wall_millis() as i32),
        TIME_HI_MILLI_WALL => Ok((wall_millis() >> 32) as i32),
        TIME_LO_NANO_MONO => Ok(monotonic_nanos(thread) as i32),
        TIME_HI_NANO_MONO => Ok((monotonic_nanos(thread) >> 32) as i32),
        VMI_MEM_FREE => {
            let max = thread.machine.settings.memory_max;
            Ok(clamp(max.saturating_sub(thread.machine.memory_used())))
        }
        VMI_MEM_USED => Ok(clamp(thread.machine.memory_used())),
        VMI_MEM_MAX => Ok(clamp(thread.machine.settings.memory_max)),
        GARBAGE_COLLECT => Ok(0),
        EXIT => {
            let code = argument(0);
            debug!("Thread {} requested exit with {}", thread.shared.name, code);
            thread.shared.set_error(EXIT, NO_ERROR);
            thread.shared.signal_exit();
            thread.machine.exit(code);
            return Err(Trap::Exit);
        }
        API_LEVEL => Ok(CURRENT_API_LEVEL),
        PD_OF_STDIN => Ok(STDIN),
        PD_OF_STDOUT => Ok(STDOUT),
        PD_OF_STDERR => Ok(STDERR),
        PD_WRITE_BYTE => write_byte(thread, argument(0), argument(1)),
        LOAD_STRING => load_string(thread, argument(0))?,
        FATAL_TODO => {
            return Err(Trap::fatal(format!(
                "guest code reached an unimplemented path (code {})",
                argument(0)
            )))
        }
        CALL_STACK_HEIGHT => Ok(guest_frames(thread).count() as i32),
        CALL_STACK_ITEM => stack_item(thread, argument(0), argument(1)),
        _ => Err(UNSUPPORTED_SYSTEM_CALL),
    };

    let (result, error) = match outcome {
        Ok(result) => (result, NO_ERROR),
        Err(error) => (-1, error),
    };
    thread.shared.set_error(call, error);
    Ok(result)
}

/// Out of range call indices share the slot of `QUERY_INDEX`
fn error_slot(call: i32) -> usize {
    usize::try_from(call)
        .ok()
        .filter(|call| *call < SYSTEM_CALL_COUNT)
        .unwrap_or(QUERY_INDEX)
}

fn clamp(bytes: u64) -> i32 {
    bytes.min(i32::MAX as u64) as i32
}

fn wall_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_millis() as u64)
}

fn monotonic_nanos(thread: &Thread) -> u64 {
    thread.machine.uptime().as_nanos() as u64
}

fn write_byte(thread: &Thread, descriptor: i32, byte: i32) -> CallResult {
    let sink = match descriptor {
        STDOUT => &thread.machine.settings.stdout,
        STDERR => &thread.machine.settings.stderr,
        _ => return Err(PIPE_DESCRIPTOR_INVALID),
    };
    let mut sink = sink.lock();
    sink.write_all(&[byte as u8])
        .and_then(|()| sink.flush())
        .map_err(|_| PIPE_DESCRIPTOR_BAD_WRITE)?;
    Ok(1)
}

fn load_string(thread: &mut Thread, id: i32) -> Result<CallResult, Trap> {
    let text = match thread.machine.string_by_id(id) {
        Some(text) => text,
        None => return Ok(Err(VALUE_OUT_OF_RANGE)),
    };
    let string = thread.new_string(&text)?;
    Ok(Ok(thread.machine.object_to_pointer(Some(&string))))
}

/// Non-blank frames, innermost (the caller of the system call) first
fn guest_frames(thread: &Thread) -> impl Iterator<Item = &super::Frame> {
    thread.frames.iter().rev().filter(|frame| !frame.is_blank())
}

fn stack_item(thread: &Thread, depth: i32, item: i32) -> CallResult {
    use self::call_stack_item::*;

    let frame = usize::try_from(depth)
        .ok()
        .and_then(|depth| guest_frames(thread).nth(depth))
        .ok_or(VALUE_OUT_OF_RANGE)?;
    let activation = frame.activation.as_ref().ok_or(VALUE_OUT_OF_RANGE)?;
    let machine = &thread.machine;
    match item {
        CLASS_NAME => Ok(machine.string_id(activation.class.name.as_str())),
        METHOD_NAME => Ok(machine.string_id(activation.method.name.as_str())),
        METHOD_TYPE => Ok(machine.string_id(&activation.method.descriptor.render())),
        SOURCE_FILE => match &activation.class.source_file {
            Some(file) => Ok(machine.string_id(file)),
            None => Err(VALUE_OUT_OF_RANGE),
        },
        SOURCE_LINE => Ok(frame.line().map_or(-1, i32::from)),
        PC_ADDRESS | JAVA_PC_ADDRESS => Ok(frame.last_pc as i32),
        _ => Err(VALUE_OUT_OF_RANGE),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::{Machine, Settings, Sink};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn query_and_error_table() {
        let machine = Machine::new(vec![], Settings::new());
        let mut thread = machine.new_thread("calls");

        let query = |thread: &mut Thread, call: usize| {
            system_call(thread, QUERY_INDEX as i32, &[call as i32]).unwrap()
        };
        assert_eq!(query(&mut thread, CALL_STACK_ITEM), 1);
        assert_eq!(system_call(&mut thread, QUERY_INDEX as i32, &[99]).unwrap(), 0);

        assert_eq!(system_call(&mut thread, 99, &[]).unwrap(), -1, "unknown call");
        assert_eq!(
            system_call(&mut thread, ERROR_GET as i32, &[QUERY_INDEX as i32]).unwrap(),
            UNSUPPORTED_SYSTEM_CALL,
            "unknown calls report against the query slot"
        );

        let previous = system_call(&mut thread, ERROR_SET as i32, &[API_LEVEL as i32, -4]).unwrap();
        assert_eq!(previous, NO_ERROR);
        assert_eq!(
            system_call(&mut thread, ERROR_GET as i32, &[API_LEVEL as i32]).unwrap(),
            -4,
            "the stored value is the second argument"
        );
        assert_eq!(system_call(&mut thread, API_LEVEL as i32, &[]).unwrap(), CURRENT_API_LEVEL);
        assert_eq!(thread.shared.error(API_LEVEL), NO_ERROR, "a successful call clears its error");
    }

    #[test]
    fn pipe_descriptors() {
        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink: Sink = buffer.clone();
        let machine = Machine::new(vec![], Settings::new().with_stdout(sink));
        let mut thread = machine.new_thread("pipes");

        let stdout = system_call(&mut thread, PD_OF_STDOUT as i32, &[]).unwrap();
        assert_eq!(system_call(&mut thread, PD_OF_STDERR as i32, &[]).unwrap(), 2);
        for byte in b"hi" {
            assert_eq!(
                system_call(&mut thread, PD_WRITE_BYTE as i32, &[stdout, i32::from(*byte)])
                    .unwrap(),
                1
            );
        }
        assert_eq!(&*buffer.lock(), b"hi");

        assert_eq!(system_call(&mut thread, PD_WRITE_BYTE as i32, &[7, 0]).unwrap(), -1);
        assert_eq!(thread.shared.error(PD_WRITE_BYTE), PIPE_DESCRIPTOR_INVALID);
    }

    #[test]
    fn introspection_without_frames() {
        let machine = Machine::new(vec![], Settings::new());
        let mut thread = machine.new_thread("empty");
        thread.enter_blank_frame();
        assert_eq!(
            system_call(&mut thread, CALL_STACK_HEIGHT as i32, &[]).unwrap(),
            0,
            "blank frames are not counted"
        );
        assert_eq!(system_call(&mut thread, CALL_STACK_ITEM as i32, &[0, 0]).unwrap(), -1);
        assert_eq!(thread.shared.error(CALL_STACK_ITEM), VALUE_OUT_OF_RANGE);
        assert_eq!(system_call(&mut thread, LOAD_STRING as i32, &[12345]).unwrap(), -1);
    }

    #[test]
    fn memory_statistics() {
        let machine = Machine::new(vec![], Settings::new().with_memory_max(1 << 20));
        let mut thread = machine.new_thread("memory");
        let max = system_call(&mut thread, VMI_MEM_MAX as i32, &[]).unwrap();
        let used = system_call(&mut thread, VMI_MEM_USED as i32, &[]).unwrap();
        let free = system_call(&mut thread, VMI_MEM_FREE as i32, &[]).unwrap();
        assert_eq!(max, 1 << 20);
        assert_eq!(free, max - used, "free is what is left of the maximum");
    }
}
