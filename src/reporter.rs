use super::token::TokenType;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Scanning,
    Compiling,
}

/// One diagnostic, carrying enough of the offending token that a reporter
/// can decide how to point at it.
#[derive(Debug, Clone)]
pub struct Report {
    pub phase: Phase,
    pub line: u32,
    pub token_type: TokenType,
    pub lexeme: String,
    pub msg: String,
}

impl Report {
    pub fn new(phase: Phase, line: u32, token_type: TokenType, lexeme: String, msg: String) -> Self {
        Self {
            phase,
            line,
            token_type,
            lexeme,
            msg,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match self.token_type {
            TokenType::Eof => write!(f, " at end")?,
            // scan errors already point at themselves
            TokenType::Error => {}
            _ => write!(f, " at '{}'", self.lexeme)?,
        }
        write!(f, ": {}", self.msg)
    }
}

pub trait Reporter {
    fn error(&mut self, report: Report);
}

pub struct CliReporter {
    errors_count: usize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self { errors_count: 0 }
    }
}

impl Reporter for CliReporter {
    fn error(&mut self, report: Report) {
        self.errors_count += 1;
        eprintln!("{report}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_point_at_the_offending_lexeme() {
        let report = Report::new(
            Phase::Compiling,
            3,
            TokenType::Identifier,
            "answer".to_string(),
            "Expect ';' after expression.".to_string(),
        );
        assert_eq!(
            report.to_string(),
            "[line 3] Error at 'answer': Expect ';' after expression."
        );
    }

    #[test]
    fn eof_and_scan_errors_format_their_location_differently() {
        let at_end = Report::new(
            Phase::Compiling,
            1,
            TokenType::Eof,
            String::new(),
            "Expect expression.".to_string(),
        );
        assert_eq!(at_end.to_string(), "[line 1] Error at end: Expect expression.");

        let lexical = Report::new(
            Phase::Scanning,
            2,
            TokenType::Error,
            String::new(),
            "Unterminated string.".to_string(),
        );
        assert_eq!(lexical.to_string(), "[line 2] Error: Unterminated string.");
    }
}
