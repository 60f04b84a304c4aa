//! Bindings for the `native` methods of the built-in `java/lang` classes

use super::{NativeRegistry, NativeValue};
use crate::jvm::BinaryName;
use crate::vm::{
    ArrayStorage, Assignable, ClassKind, Condition, ObjectRef, Thread, ThreadStatus, Trap,
    WaitStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Longest uninterrupted nap inside `Thread.sleep`
const SLEEP_SLICE: Duration = Duration::from_millis(10);

pub fn register(registry: &mut NativeRegistry) {
    let object = BinaryName::OBJECT;
    registry.register(&object, "getClass", "()Ljava/lang/Class;", object_get_class);
    registry.register(&object, "hashCode", "()I", object_hash_code);
    registry.register(&object, "notify", "()V", object_notify);
    registry.register(&object, "notifyAll", "()V", object_notify_all);
    registry.register(&object, "wait", "(J)V", object_wait);
    registry.register(&object, "wait", "(JI)V", object_wait);

    registry.register(&BinaryName::CLASS, "getName", "()Ljava/lang/String;", class_get_name);
    registry.register(&BinaryName::STRING, "intern", "()Ljava/lang/String;", string_intern);

    let system = BinaryName::SYSTEM;
    registry.register(
        &system,
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        system_arraycopy,
    );
    registry.register(&system, "currentTimeMillis", "()J", system_current_time_millis);
    registry.register(&system, "nanoTime", "()J", system_nano_time);
    registry.register(
        &system,
        "identityHashCode",
        "(Ljava/lang/Object;)I",
        system_identity_hash_code,
    );
    registry.register(
        &system,
        "getProperty",
        "(Ljava/lang/String;)Ljava/lang/String;",
        system_get_property,
    );

    registry.register(&BinaryName::THREAD, "sleep", "(J)V", thread_sleep);
    registry.register(&BinaryName::THREAD, "holdsLock", "(Ljava/lang/Object;)Z", thread_holds_lock);
}

/// Argument at a position, which the bridge has already checked against the descriptor
pub(super) fn argument(arguments: &[NativeValue], index: usize) -> Result<&NativeValue, Trap> {
    arguments
        .get(index)
        .ok_or_else(|| Trap::fatal(format!("native argument {} is missing", index)))
}

/// Non-null object argument
pub(super) fn object_argument(
    arguments: &[NativeValue],
    index: usize,
    context: &str,
) -> Result<ObjectRef, Trap> {
    argument(arguments, index)?
        .as_object()?
        .ok_or_else(|| Trap::null_pointer(format!("null argument to {}", context)))
}

/// Block on an object's monitor until notified, interrupted, or timed out
///
/// The thread is marked as waiting on the object for the duration, so an interrupt from another
/// thread can find the monitor to wake.
pub(super) fn wait_on(
    thread: &mut Thread,
    object: &ObjectRef,
    millis: i64,
    nanos: i32,
) -> Result<WaitStatus, Trap> {
    let shared = thread.shared.clone();
    shared.set_waiting_on(Some(object.clone()));
    shared.set_status(ThreadStatus::Waiting);
    let status = object.monitor().wait(&shared, millis, nanos);
    shared.set_waiting_on(None);
    shared.set_status(ThreadStatus::Running);
    status
}

fn object_get_class(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "getClass")?;
    Ok(NativeValue::Class(this.class().name.clone()))
}

fn object_hash_code(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "hashCode")?;
    Ok(NativeValue::Int(this.identity_hash()))
}

fn object_notify(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "notify")?;
    this.monitor().notify(thread.id(), false)?;
    Ok(NativeValue::Void)
}

fn object_notify_all(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "notifyAll")?;
    this.monitor().notify(thread.id(), true)?;
    Ok(NativeValue::Void)
}

/// `wait(J)V` and `wait(JI)V`
fn object_wait(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "wait")?;
    let millis = argument(arguments, 1)?.as_long()?;
    let nanos = match arguments.get(2) {
        Some(nanos) => nanos.as_int()?,
        None => 0,
    };
    match wait_on(thread, &this, millis, nanos)? {
        WaitStatus::Interrupted => Err(Trap::condition(
            Condition::Interrupted,
            "interrupted while waiting",
        )),
        WaitStatus::Notified | WaitStatus::TimedOut => Ok(NativeValue::Void),
    }
}

fn class_get_name(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "getName")?;
    let name = thread
        .class_name_of(&this)
        .ok_or_else(|| Trap::fatal("class object without a class name"))?;
    Ok(NativeValue::String(name.to_source_name()))
}

fn string_intern(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let this = object_argument(arguments, 0, "intern")?;
    let text = thread.string_value(&this)?;
    Ok(NativeValue::Object(thread.intern(&text)?))
}

fn system_arraycopy(_: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let source = object_argument(arguments, 0, "arraycopy")?;
    let source_pos = argument(arguments, 1)?.as_int()?;
    let dest = object_argument(arguments, 2, "arraycopy")?;
    let dest_pos = argument(arguments, 3)?.as_int()?;
    let length = argument(arguments, 4)?.as_int()?;

    if !source.is_array() || !dest.is_array() {
        return Err(Trap::condition(
            Condition::ArrayStore,
            "arraycopy between non-arrays",
        ));
    }
    let in_bounds = |pos: i32, array: &ObjectRef| -> Result<bool, Trap> {
        let end = i64::from(pos) + i64::from(length);
        Ok(pos >= 0 && end <= array.array_length()? as i64)
    };
    if length < 0 || !in_bounds(source_pos, &source)? || !in_bounds(dest_pos, &dest)? {
        return Err(Trap::condition(
            Condition::ArrayIndexOutOfBounds,
            format!(
                "arraycopy of {} elements from {} to {}",
                length, source_pos, dest_pos
            ),
        ));
    }
    let (source_pos, dest_pos, length) = (source_pos as usize, dest_pos as usize, length as usize);
    if length == 0 {
        return Ok(NativeValue::Void);
    }

    if Arc::ptr_eq(&source, &dest) {
        dest.array()?.copy_within(source_pos, dest_pos, length);
        return Ok(NativeValue::Void);
    }

    // Snapshot the source so only one array is locked at a time
    let elements = ArrayStorage::clone(&*source.array()?);
    if let (ArrayStorage::Reference(references), ClassKind::Array { component_class, .. }) =
        (&elements, &dest.class().kind)
    {
        let component = component_class
            .as_ref()
            .ok_or_else(|| {
                Trap::condition(Condition::ArrayStore, "reference into primitive array")
            })?;
        let mismatch = references[source_pos..source_pos + length]
            .iter()
            .flatten()
            .find(|element| !element.class().is_assignable(component));
        if let Some(element) = mismatch {
            return Err(Trap::condition(
                Condition::ArrayStore,
                format!(
                    "{} stored into {}",
                    element.class().name.to_source_name(),
                    dest.class().name
                ),
            ));
        }
    }
    dest.array()?
        .copy_from(&elements, source_pos, dest_pos, length)?;
    Ok(NativeValue::Void)
}

fn system_current_time_millis(_: &mut Thread, _: &[NativeValue]) -> Result<NativeValue, Trap> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_millis() as i64);
    Ok(NativeValue::Long(millis))
}

fn system_nano_time(thread: &mut Thread, _: &[NativeValue]) -> Result<NativeValue, Trap> {
    Ok(NativeValue::Long(thread.machine.uptime().as_nanos() as i64))
}

fn system_identity_hash_code(
    _: &mut Thread,
    arguments: &[NativeValue],
) -> Result<NativeValue, Trap> {
    let hash = argument(arguments, 0)?
        .as_object()?
        .map_or(0, |object| object.identity_hash());
    Ok(NativeValue::Int(hash))
}

fn system_get_property(
    thread: &mut Thread,
    arguments: &[NativeValue],
) -> Result<NativeValue, Trap> {
    let name = argument(arguments, 0)?
        .as_str()?
        .ok_or_else(|| Trap::null_pointer("null property name"))?;
    Ok(match thread.machine.settings.system_properties.get(name) {
        Some(value) => NativeValue::String(value.clone()),
        None => NativeValue::Null,
    })
}

/// `Thread.sleep(J)V`, sliced so interrupts and exit requests are noticed promptly
fn thread_sleep(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let millis = argument(arguments, 0)?.as_long()?.max(0) as u64;
    let deadline = Instant::now() + Duration::from_millis(millis);
    let shared = thread.shared.clone();

    shared.set_status(ThreadStatus::Waiting);
    let outcome = loop {
        if shared.should_terminate() {
            break Err(Trap::Exit);
        }
        if shared.take_interrupt() {
            break Err(Trap::condition(
                Condition::Interrupted,
                "interrupted while sleeping",
            ));
        }
        let now = Instant::now();
        if now >= deadline {
            break Ok(NativeValue::Void);
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    };
    shared.set_status(ThreadStatus::Running);
    outcome
}

fn thread_holds_lock(thread: &mut Thread, arguments: &[NativeValue]) -> Result<NativeValue, Trap> {
    let object = object_argument(arguments, 0, "holdsLock")?;
    let held = object
        .existing_monitor()
        .map_or(false, |monitor| monitor.is_held_by(thread.id()));
    Ok(NativeValue::Int(i32::from(held)))
}
