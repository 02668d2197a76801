use std::fmt;

/// Everything the compiler can reject, as a kind rather than a bare string,
/// so tests can match on structure while the display layer keeps the exact
/// surface wording.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// "Expect <what>" consume failures, e.g. `Expected("')' after expression.")`.
    Expected(&'static str),
    ExpectExpression,
    InvalidAssignmentTarget,
    TooManyConstants,
    TooManyLocals,
    TooManyUpvalues,
    TooManyParams,
    TooManyArgs,
    SameVariableInScope,
    ReadOwnInitializer,
    ReturnFromScript,
    JumpTooLarge,
    LoopTooLarge,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected(what) => write!(f, "Expect {what}"),
            Self::ExpectExpression => write!(f, "Expect expression."),
            Self::InvalidAssignmentTarget => write!(f, "Invalid assignment target."),
            Self::TooManyConstants => write!(f, "Too many constants in one chunk."),
            Self::TooManyLocals => write!(f, "Too many local variables in function."),
            Self::TooManyUpvalues => write!(f, "Too many closure variables in function."),
            Self::TooManyParams => write!(f, "Cannot have more than 255 parameters."),
            Self::TooManyArgs => write!(f, "Cannot have more than 255 arguments."),
            Self::SameVariableInScope => write!(
                f,
                "There already exists a variable with the same name in this scope."
            ),
            Self::ReadOwnInitializer => {
                write!(f, "Cannot read local variable in its own initializer.")
            }
            Self::ReturnFromScript => write!(f, "Cannot return from global scope."),
            Self::JumpTooLarge => write!(f, "Too much code to jump over."),
            Self::LoopTooLarge => write!(f, "Loop body too long."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    OperandMustBeNumber,
    OperandsMustBeNumbers,
    OperandsMustBeNumbersOrStrings,
    UndefinedVariable(String),
    NotCallable,
    ArityMismatch { expected: u8, got: usize },
    StackOverflow,
    Native(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperandMustBeNumber => write!(f, "Operand must be a number."),
            Self::OperandsMustBeNumbers => write!(f, "Operands must be numbers."),
            Self::OperandsMustBeNumbersOrStrings => {
                write!(f, "Operands must be two numbers or two strings.")
            }
            Self::UndefinedVariable(name) => write!(f, "Undefined variable '{name}'."),
            Self::NotCallable => write!(f, "Can only call functions and classes."),
            Self::ArityMismatch { expected, got } => {
                write!(f, "Expected {expected} arguments but got {got}.")
            }
            Self::StackOverflow => write!(f, "Stack overflow."),
            Self::Native(msg) => write!(f, "{msg}"),
        }
    }
}
