use crate::jvm::{CompareMode, Instruction, ShiftType};
use crate::vm::{Condition, Frame, Trap, Value};
use std::cmp::Ordering;

fn division_by_zero() -> Trap {
    Trap::condition(Condition::Arithmetic, "/ by zero")
}

/// Result of a floating comparison, with NaN ordered according to the instruction variant
fn compare_floating<T: PartialOrd>(left: T, right: T, mode: CompareMode) -> i32 {
    match left.partial_cmp(&right) {
        Some(ordering) => ordering as i32,
        None => match mode {
            CompareMode::L => -1,
            CompareMode::G => 1,
        },
    }
}

/// Arithmetic, bitwise, conversion, and comparison instructions
///
/// Float to integer conversions rely on `as` casts saturating (and mapping NaN to zero), which is
/// exactly what the guest expects.
pub fn execute(frame: &mut Frame, instruction: &Instruction) -> Result<(), Trap> {
    use Instruction::*;
    let result = match instruction {
        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor => {
            let right = frame.pop_int()?;
            let left = frame.pop_int()?;
            Value::Int(match instruction {
                IAdd => left.wrapping_add(right),
                ISub => left.wrapping_sub(right),
                IMul => left.wrapping_mul(right),
                IDiv if right == 0 => return Err(division_by_zero()),
                IDiv => left.wrapping_div(right),
                IRem if right == 0 => return Err(division_by_zero()),
                IRem => left.wrapping_rem(right),
                IAnd => left & right,
                IOr => left | right,
                _ => left ^ right,
            })
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
            let right = frame.pop_long()?;
            let left = frame.pop_long()?;
            Value::Long(match instruction {
                LAdd => left.wrapping_add(right),
                LSub => left.wrapping_sub(right),
                LMul => left.wrapping_mul(right),
                LDiv if right == 0 => return Err(division_by_zero()),
                LDiv => left.wrapping_div(right),
                LRem if right == 0 => return Err(division_by_zero()),
                LRem => left.wrapping_rem(right),
                LAnd => left & right,
                LOr => left | right,
                _ => left ^ right,
            })
        }
        FAdd | FSub | FMul | FDiv | FRem => {
            let right = frame.pop_float()?;
            let left = frame.pop_float()?;
            Value::Float(match instruction {
                FAdd => left + right,
                FSub => left - right,
                FMul => left * right,
                FDiv => left / right,
                _ => left % right,
            })
        }
        DAdd | DSub | DMul | DDiv | DRem => {
            let right = frame.pop_double()?;
            let left = frame.pop_double()?;
            Value::Double(match instruction {
                DAdd => left + right,
                DSub => left - right,
                DMul => left * right,
                DDiv => left / right,
                _ => left % right,
            })
        }

        INeg => Value::Int(frame.pop_int()?.wrapping_neg()),
        LNeg => Value::Long(frame.pop_long()?.wrapping_neg()),
        FNeg => Value::Float(-frame.pop_float()?),
        DNeg => Value::Double(-frame.pop_double()?),

        ISh(shift) => {
            let amount = (frame.pop_int()? & 0x1f) as u32;
            let value = frame.pop_int()?;
            Value::Int(match shift {
                ShiftType::Left => value << amount,
                ShiftType::ArithmeticRight => value >> amount,
                ShiftType::LogicalRight => ((value as u32) >> amount) as i32,
            })
        }
        LSh(shift) => {
            let amount = (frame.pop_int()? & 0x3f) as u32;
            let value = frame.pop_long()?;
            Value::Long(match shift {
                ShiftType::Left => value << amount,
                ShiftType::ArithmeticRight => value >> amount,
                ShiftType::LogicalRight => ((value as u64) >> amount) as i64,
            })
        }

        I2L => Value::Long(i64::from(frame.pop_int()?)),
        I2F => Value::Float(frame.pop_int()? as f32),
        I2D => Value::Double(f64::from(frame.pop_int()?)),
        L2I => Value::Int(frame.pop_long()? as i32),
        L2F => Value::Float(frame.pop_long()? as f32),
        L2D => Value::Double(frame.pop_long()? as f64),
        F2I => Value::Int(frame.pop_float()? as i32),
        F2L => Value::Long(frame.pop_float()? as i64),
        F2D => Value::Double(f64::from(frame.pop_float()?)),
        D2I => Value::Int(frame.pop_double()? as i32),
        D2L => Value::Long(frame.pop_double()? as i64),
        D2F => Value::Float(frame.pop_double()? as f32),
        I2B => Value::Int(i32::from(frame.pop_int()? as i8)),
        I2C => Value::Int(i32::from(frame.pop_int()? as u16)),
        I2S => Value::Int(i32::from(frame.pop_int()? as i16)),

        LCmp => {
            let right = frame.pop_long()?;
            let left = frame.pop_long()?;
            let ordering: Ordering = left.cmp(&right);
            Value::Int(ordering as i32)
        }
        FCmp(mode) => {
            let right = frame.pop_float()?;
            let left = frame.pop_float()?;
            Value::Int(compare_floating(left, right, *mode))
        }
        DCmp(mode) => {
            let right = frame.pop_double()?;
            let left = frame.pop_double()?;
            Value::Int(compare_floating(left, right, *mode))
        }

        other => {
            return Err(Trap::fatal(format!(
                "{:?} reached the arithmetic unit",
                other
            )))
        }
    };
    frame.push(result);
    Ok(())
}
