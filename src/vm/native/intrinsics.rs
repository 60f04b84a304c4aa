//! Engine intrinsics (`jmevm/runtime/Intrinsics`) and raw object access
//! (`jmevm/runtime/ObjectAccess`)
//!
//! These are the hooks the guest class library is built on: bit-level conversions, unique object
//! pointers, the system call gateway, and allocation or monitor operations that bypass the usual
//! language rules.

use super::builtins::{argument, object_argument, wait_on};
use super::{NativeRegistry, NativeValue};
use crate::jvm::BinaryName;
use crate::vm::syscall;
use crate::vm::{Condition, LinkError, Thread, Trap, WaitStatus};

/// Most arguments a system call takes after its index
pub const MAX_SYSTEM_CALL_ARGUMENTS: usize = 8;

pub fn register(registry: &mut NativeRegistry) {
    let intrinsics = BinaryName::INTRINSICS;
    registry.register(&intrinsics, "arrayLength", "(Ljava/lang/Object;)I", array_length);
    registry.register(&intrinsics, "longPack", "(II)J", long_pack);
    registry.register(&intrinsics, "longUnpackHigh", "(J)I", long_unpack_high);
    registry.register(&intrinsics, "longUnpackLow", "(J)I", long_unpack_low);
    registry.register(&intrinsics, "doublePack", "(II)D", double_pack);
    registry.register(&intrinsics, "doubleToRawLongBits", "(D)J", double_to_raw_long_bits);
    registry.register(&intrinsics, "longBitsToDouble", "(J)D", long_bits_to_double);
    registry.register(&intrinsics, "floatToRawIntBits", "(F)I", float_to_raw_int_bits);
    registry.register(&intrinsics, "intBitsToFloat", "(I)F", int_bits_to_float);
    registry.register(&intrinsics, "objectToPointer", "(Ljava/lang/Object;)I", object_to_pointer);
    registry.register(&intrinsics, "pointerToObject", "(I)Ljava/lang/Object;", pointer_to_object);
    for arity in 0..=MAX_SYSTEM_CALL_ARGUMENTS {
        let parameters = "I".repeat(arity + 1);
        registry.register(&intrinsics, "sysCall", &format!("({})I", parameters), sys_call);
        registry.register(&intrinsics, "sysCallV", &format!("({})V", parameters), sys_call_void);
    }

    let access = BinaryName::OBJECTACCESS;
    registry.register(
        &access,
        "allocateObject",
        "(Ljava/lang/String;)Ljava/lang/Object;",
        allocate_object,
    );
    registry.register(&access, "arrayNew", "(Ljava/lang/Class;I)Ljava/lang/Object;", array_new);
    registry.register(
        &access,
        "classByName",
        "(Ljava/lang/String;)Ljava/lang/Class;",
        class_by_name,
    );
    registry.register(&access, "classOf", "(Ljava/lang/Object;)Ljava/lang/Class;", class_of);
    registry.register(&access, "identityHashCode", "(Ljava/lang/Object;)I", identity_hash_code);
    registry.register(&access, "holdsLock", "(ILjava/lang/Object;)Z", holds_lock);
    registry.register(&access, "monitorNotify", "(Ljava/lang/Object;Z)I", monitor_notify);
    registry.register(&access, "monitorWait", "(Ljava/lang/Object;JI)I", monitor_wait);
}

fn int(arguments: &[NativeValue], index: usize) -> Result<i32, Trap> {
    argument(arguments, index)?.as_int()
}

/// `(hi << 32) | lo`, without sign extending the low half
fn pack(high: i32, low: i32) -> i64 {
    (i64::from(high) << 32) | (i64::from(low) & 0xffff_ffff)
}

fn array_length(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let array = object_argument(arguments, 0, "arrayLength")?;
    Ok(NativeValue::Int(array.array_length()? as i32))
}

fn long_pack(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    Ok(NativeValue::Long(pack(int(arguments, 0)?, int(arguments, 1)?)))
}

fn long_unpack_high(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let value = argument(arguments, 0)?.as_long()?;
    Ok(NativeValue::Int(((value as u64) >> 32) as i32))
}

fn long_unpack_low(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let value = argument(arguments, 0)?.as_long()?;
    Ok(NativeValue::Int(value as i32))
}

fn double_pack(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let bits = pack(int(arguments, 0)?, int(arguments, 1)?);
    Ok(NativeValue::Double(f64::from_bits(bits as u64)))
}

fn double_to_raw_long_bits(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let value = argument(arguments, 0)?.as_double()?;
    Ok(NativeValue::Long(value.to_bits() as i64))
}

fn long_bits_to_double(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let bits = argument(arguments, 0)?.as_long()?;
    Ok(NativeValue::Double(f64::from_bits(bits as u64)))
}

fn float_to_raw_int_bits(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let value = argument(arguments, 0)?.as_float()?;
    Ok(NativeValue::Int(value.to_bits() as i32))
}

fn int_bits_to_float(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let bits = int(arguments, 0)?;
    Ok(NativeValue::Float(f32::from_bits(bits as u32)))
}

fn object_to_pointer(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let object = argument(arguments, 0)?.as_object()?;
    Ok(NativeValue::Int(thread.machine.object_to_pointer(object.as_ref())))
}

fn pointer_to_object(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let pointer = int(arguments, 0)?;
    Ok(match thread.machine.pointer_to_object(pointer) {
        Some(object) => NativeValue::Object(object),
        None => NativeValue::Null,
    })
}

fn system_call_arguments(arguments: &[NativeValue]) -> Result<(i32, Vec<i32>), Trap> {
    let values = arguments
        .iter()
        .map(NativeValue::as_int)
        .collect::<Result<Vec<i32>, Trap>>()?;
    match values.split_first() {
        Some((index, rest)) => Ok((*index, rest.to_vec())),
        None => Err(Trap::fatal("system call without an index")),
    }
}

fn sys_call(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let (index, arguments) = system_call_arguments(arguments)?;
    syscall::system_call(thread, index, &arguments).map(NativeValue::Int)
}

fn sys_call_void(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let (index, arguments) = system_call_arguments(arguments)?;
    syscall::system_call(thread, index, &arguments)?;
    Ok(NativeValue::Void)
}

/// Allocate an instance by source name without running any constructor
fn allocate_object(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let name = argument(arguments, 0)?
        .as_str()?
        .ok_or_else(|| Trap::null_pointer("null class name"))?;
    let name = BinaryName::from_source_name(name)
        .map_err(|err| Trap::condition(Condition::NoClassDefFound, err))?;
    let class = thread.load_class(&name)?;
    Ok(NativeValue::Object(thread.allocate_instance(class)?))
}

/// Allocate an array given the class object of the array type
fn array_new(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let name = match argument(arguments, 0)? {
        NativeValue::Class(name) => name.clone(),
        NativeValue::Null => return Err(Trap::null_pointer("null array class")),
        other => return Err(Trap::fatal(format!("arrayNew of {:?}", other))),
    };
    let length = int(arguments, 1)?;
    if !name.is_array() {
        return Err(Trap::condition(
            Condition::IncompatibleClassChange,
            format!("{} is not an array class", name),
        ));
    }
    if length < 0 {
        return Err(Trap::condition(
            Condition::NegativeArraySize,
            length.to_string(),
        ));
    }
    let class = thread.load_class(&name)?;
    Ok(NativeValue::Object(thread.new_array(class, length as usize)?))
}

/// Class object for a (source or binary) name, or `null` if there is no such class
fn class_by_name(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let name = argument(arguments, 0)?
        .as_str()?
        .ok_or_else(|| Trap::null_pointer("null class name"))?;
    let name = match BinaryName::from_source_name(name) {
        Ok(name) => name,
        Err(_) => return Ok(NativeValue::Null),
    };
    match thread.machine.loader.load_class(&name) {
        Ok(class) => Ok(NativeValue::Class(class.name.clone())),
        Err(LinkError::ClassNotFound(_)) => Ok(NativeValue::Null),
        Err(other) => Err(other.into()),
    }
}

fn class_of(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let object = object_argument(arguments, 0, "classOf")?;
    Ok(NativeValue::Class(object.class().name.clone()))
}

fn identity_hash_code(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let hash = argument(arguments, 0)?
        .as_object()?
        .map_or(0, |object| object.identity_hash());
    Ok(NativeValue::Int(hash))
}

/// Does the given thread (by id) own the object's monitor?
fn holds_lock(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let thread_id = int(arguments, 0)?;
    let object = object_argument(arguments, 1, "holdsLock")?;
    let held = u32::try_from(thread_id).map_or(false, |id| {
        object
            .existing_monitor()
            .map_or(false, |monitor| monitor.is_held_by(id))
    });
    Ok(NativeValue::Int(i32::from(held)))
}

/// 0 on success, -1 if the caller does not own the monitor
fn monitor_notify(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let object = object_argument(arguments, 0, "monitorNotify")?;
    let all = int(arguments, 1)? != 0;
    match object.monitor().notify(thread.id(), all) {
        Ok(()) => Ok(NativeValue::Int(0)),
        Err(Trap::Condition(Condition::IllegalMonitorState, _)) => Ok(NativeValue::Int(-1)),
        Err(other) => Err(other),
    }
}

/// 0 notified, 1 interrupted, 2 timed out, -1 not the owner
fn monitor_wait(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let object = object_argument(arguments, 0, "monitorWait")?;
    let millis = argument(arguments, 1)?.as_long()?;
    let nanos = int(arguments, 2)?;
    let status = match wait_on(thread, &object, millis, nanos) {
        Ok(WaitStatus::Notified) => 0,
        Ok(WaitStatus::Interrupted) => 1,
        Ok(WaitStatus::TimedOut) => 2,
        Err(Trap::Condition(Condition::IllegalMonitorState, _)) => -1,
        Err(other) => return Err(other),
    };
    Ok(NativeValue::Int(status))
}
