use crate::jvm::{BinaryName, Instruction, MethodAccessFlags, MethodDescriptor, Pc};
use crate::jvm::UnqualifiedName;

/// Decoded method
#[derive(Clone, Debug)]
pub struct MethodData {
    pub access_flags: MethodAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Body (absent for `native` and `abstract` methods)
    pub code: Option<Code>,
}

impl MethodData {
    pub fn new(
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> MethodData {
        MethodData {
            access_flags,
            name,
            descriptor,
            code: None,
        }
    }

    pub fn with_code(mut self, code: Code) -> MethodData {
        self.code = Some(code);
        self
    }
}

/// Method body
#[derive(Clone, Debug, Default)]
pub struct Code {
    /// Number of local variable slots (category-2 values take up two)
    pub max_locals: u16,

    /// Maximum operand stack depth in slots
    pub max_stack: u16,

    pub instructions: Vec<Instruction>,

    /// Exception handlers, in the order they should be tried
    pub exception_table: Vec<ExceptionHandler>,

    /// Line number table, sorted by `start`
    pub line_numbers: Vec<LineNumber>,
}

impl Code {
    pub fn new(max_locals: u16, max_stack: u16, instructions: Vec<Instruction>) -> Code {
        Code {
            max_locals,
            max_stack,
            instructions,
            exception_table: vec![],
            line_numbers: vec![],
        }
    }

    pub fn with_handler(mut self, handler: ExceptionHandler) -> Code {
        self.exception_table.push(handler);
        self
    }

    pub fn with_line(mut self, start: Pc, line: u16) -> Code {
        self.line_numbers.push(LineNumber { start, line });
        self
    }

    /// Handlers whose range covers an instruction, in table order
    pub fn handlers_at(&self, pc: Pc) -> impl Iterator<Item = &ExceptionHandler> {
        self.exception_table
            .iter()
            .filter(move |handler| handler.start <= pc && pc < handler.end)
    }

    /// Source line of an instruction, if the line table covers it
    pub fn line_at(&self, pc: Pc) -> Option<u16> {
        self.line_numbers
            .iter()
            .take_while(|entry| entry.start <= pc)
            .last()
            .map(|entry| entry.line)
    }
}

/// Entry in the exception table: the range `[start, end)` jumps to `handler` when a throwable
/// assignable to `catch_type` is raised (`None` catches everything)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: Pc,
    pub end: Pc,
    pub handler: Pc,
    pub catch_type: Option<BinaryName>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start: Pc,
    pub line: u16,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handler_ranges() {
        let code = Code::new(1, 1, vec![Instruction::Nop; 6])
            .with_handler(ExceptionHandler {
                start: 1,
                end: 3,
                handler: 4,
                catch_type: None,
            })
            .with_line(0, 10)
            .with_line(2, 11);
        assert_eq!(code.handlers_at(0).count(), 0);
        assert_eq!(code.handlers_at(2).count(), 1);
        assert_eq!(code.handlers_at(3).count(), 0, "end is exclusive");
        assert_eq!(code.line_at(1), Some(10));
        assert_eq!(code.line_at(5), Some(11));
    }
}
