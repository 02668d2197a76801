use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, Copy)]
enum Flag {
    Version,
    Help,
}

const VERSION: &str = "--version";
const HELP: &str = "--help";

impl TryFrom<&str> for Flag {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            VERSION => Ok(Self::Version),
            HELP => Ok(Self::Help),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Repl,
    File(PathBuf),
    Version,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    UnknownFlag(String),
    UnexpectedArg(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFlag(flag) => write!(f, "there is no flag named {flag}"),
            Self::UnexpectedArg(arg) => write!(f, "unexpected argument {arg}"),
        }
    }
}

/// Turns the command line (program name already skipped) into an action.
pub fn parse(mut args: impl Iterator<Item = String>) -> Result<Action, Error> {
    let first = match args.next() {
        None => return Ok(Action::Repl),
        Some(first) => first,
    };
    let action = if first.starts_with("--") {
        match Flag::try_from(first.as_str()) {
            Ok(Flag::Version) => Action::Version,
            Ok(Flag::Help) => Action::Help,
            Err(()) => return Err(Error::UnknownFlag(first)),
        }
    } else {
        Action::File(PathBuf::from(first))
    };
    match args.next() {
        Some(extra) => Err(Error::UnexpectedArg(extra)),
        None => Ok(action),
    }
}
