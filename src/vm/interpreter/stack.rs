use crate::jvm::Instruction;
use crate::util::Width;
use crate::vm::{Frame, Trap, Value};

fn pop_any(stack: &mut Vec<Value>) -> Result<Value, Trap> {
    stack
        .pop()
        .ok_or_else(|| Trap::fatal("operand stack underflow"))
}

fn pop_expecting_width(stack: &mut Vec<Value>, width: usize) -> Result<Value, Trap> {
    let value = pop_any(stack)?;
    if value.width() == width {
        Ok(value)
    } else {
        Err(invalid_width(value.width()))
    }
}

fn invalid_width(width: usize) -> Trap {
    Trap::fatal(format!("stack shuffle would split a value of width {}", width))
}

/// Stack manipulation instructions, which are sensitive to the width of the values involved
pub fn shuffle(frame: &mut Frame, instruction: &Instruction) -> Result<(), Trap> {
    use Instruction::*;
    let stack = &mut frame.stack;
    match instruction {
        Pop => {
            pop_expecting_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop_any(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_expecting_width(stack, 1)?;
                }

                // Form 2
                2 => (),

                other => return Err(invalid_width(other)),
            }
        }

        Dup => {
            let arg1 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_any(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(invalid_width(other)),
            }
        }

        Dup2 => {
            let arg1 = pop_any(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }

                other => return Err(invalid_width(other)),
            }
        }

        Dup2X1 => {
            let arg1 = pop_any(stack)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(invalid_width(other)),
            }
        }

        Dup2X2 => {
            let arg1 = pop_any(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    let arg3 = pop_any(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        2 => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(invalid_width(other)),
                    }
                }

                2 => {
                    let arg2 = pop_any(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        2 => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(invalid_width(other)),
                    }
                }

                other => return Err(invalid_width(other)),
            }
        }

        Swap => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        other => return Err(Trap::fatal(format!("{:?} is not a stack shuffle", other))),
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(instruction: Instruction, stack: Vec<Value>) -> Result<Vec<Value>, Trap> {
        let mut frame = Frame::blank();
        frame.stack = stack;
        shuffle(&mut frame, &instruction)?;
        Ok(frame.stack)
    }

    #[test]
    fn dup_forms() {
        let (a, b, c) = (Value::Int(1), Value::Int(2), Value::Int(3));
        assert_eq!(
            run(Instruction::DupX1, vec![a.clone(), b.clone()]).unwrap(),
            vec![b.clone(), a.clone(), b.clone()]
        );
        assert_eq!(
            run(Instruction::DupX2, vec![a.clone(), b.clone(), c.clone()]).unwrap(),
            vec![c.clone(), a.clone(), b.clone(), c.clone()]
        );
        assert_eq!(
            run(Instruction::Dup2, vec![a.clone(), b.clone()]).unwrap(),
            vec![a.clone(), b.clone(), a.clone(), b.clone()]
        );

        let long = Value::Long(9);
        assert_eq!(
            run(Instruction::Dup2, vec![long.clone()]).unwrap(),
            vec![long.clone(), long.clone()],
            "a long is duplicated whole"
        );
        assert_eq!(
            run(Instruction::Dup2X1, vec![a.clone(), long.clone()]).unwrap(),
            vec![long.clone(), a.clone(), long.clone()]
        );
        assert_eq!(
            run(Instruction::Dup2X2, vec![long.clone(), Value::Double(0.5)]).unwrap(),
            vec![Value::Double(0.5), long, Value::Double(0.5)],
            "form 4"
        );
    }

    #[test]
    fn wide_values_are_not_split() {
        assert!(matches!(
            run(Instruction::Dup, vec![Value::Long(1)]),
            Err(Trap::Fatal(_))
        ));
        assert!(matches!(
            run(Instruction::Swap, vec![Value::Int(1), Value::Double(1.0)]),
            Err(Trap::Fatal(_))
        ));
        assert!(matches!(
            run(Instruction::Pop2, vec![Value::Long(1), Value::Int(2)]),
            Err(Trap::Fatal(_))
        ));
        assert_eq!(
            run(Instruction::Pop2, vec![Value::Int(1), Value::Long(2)]).unwrap(),
            vec![Value::Int(1)]
        );
    }
}
