//! This module contains the decoded form of JVM bytecode handed to the engine. The representation
//! is slightly different from the class file encoding to keep the interpreter's dispatch small:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify. Likewise the compact `iload_0`..`iload_3` forms are
//!     merged into `ILoad(0)`..`ILoad(3)`
//!
//!   - Branch targets and switch targets are indices into the method's instruction vector rather
//!     than byte offsets
//!
//!   - Constant pool references are resolved into their symbolic form (names and descriptors)
//!

use super::{BaseType, BinaryName, FieldType, MethodDescriptor, UnqualifiedName};
use std::ops::Not;

/// Index of an instruction within a method body
pub type Pc = usize;

/// Decoded JVM instruction
#[derive(Clone, Debug)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32), // covers `iconst_m1` through `iconst_5`, `bipush`, and `sipush`
    LConst(i64),
    FConst(f32),
    DConst(f64),
    Ldc(Constant), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),    // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    If(OrdComparison, Pc),
    IfICmp(OrdComparison, Pc),
    IfACmp(EqComparison, Pc),
    IfNull(EqComparison, Pc), // covers `ifnull` and `ifnonnull`
    Goto(Pc),                 // covers `goto` and `goto_w`
    TableSwitch {
        default: Pc,
        low: i32,
        targets: Vec<Pc>,
    },
    LookupSwitch {
        default: Pc,
        targets: Vec<(i32, Pc)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(BinaryName), // component class name
    MultiANewArray(BinaryName, u8),
    ArrayLength,
    AThrow,
    CheckCast(BinaryName),
    InstanceOf(BinaryName),
    MonitorEnter,
    MonitorExit,
}

/// Loadable constant
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(BinaryName),
}

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Symbolic reference to a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftType {
    Left,
    ArithmeticRight,
    LogicalRight,
}

/// How NaN is ordered by a floating comparison
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareMode {
    /// NaN compares as less than everything (`fcmpl`, `dcmpl`)
    L,

    /// NaN compares as greater than everything (`fcmpg`, `dcmpg`)
    G,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrdComparison {
    EQ,
    NE,
    LT,
    GE,
    GT,
    LE,
}

impl OrdComparison {
    /// Decide the comparison given the ordering of the left operand relative to the right
    pub fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            OrdComparison::EQ => left == right,
            OrdComparison::NE => left != right,
            OrdComparison::LT => left < right,
            OrdComparison::GE => left >= right,
            OrdComparison::GT => left > right,
            OrdComparison::LE => left <= right,
        }
    }
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::NE => OrdComparison::EQ,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EqComparison {
    EQ,
    NE,
}

impl EqComparison {
    pub fn holds(self, equal: bool) -> bool {
        match self {
            EqComparison::EQ => equal,
            EqComparison::NE => !equal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}
