use super::chunk::{Chunk, Instruction};
use super::error::CompileError;
use super::heap::Heap;
use super::object::{Function, ObjKind, ObjRef};
use super::reporter::{Phase, Report, Reporter};
use super::scanner::Scanner;
use super::token::{Token, TokenType};
use super::value::Value;

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
const MAX_CONSTANTS: usize = 1 << 24;
const MAX_JUMP: usize = u16::MAX as usize;

/// Compiles a whole source text into its top-level script function, or
/// `None` if anything was reported along the way.
pub fn compile(source: &str, heap: &mut Heap, reporter: &mut dyn Reporter) -> Option<ObjRef> {
    let mut compiler = Compiler::new(source, heap, reporter);
    compiler.advance();
    while !compiler.matches(TokenType::Eof) {
        compiler.declaration();
    }
    compiler.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary => Self::Call,
            Self::Call => Self::Primary,
            Self::Primary => unreachable!("no precedence above primary"),
        }
    }
}

type ParseFn = fn(&mut Compiler, bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

macro_rules! rule {
    ($prefix:expr, $infix:expr, $precedence:expr) => {
        ParseRule {
            prefix: $prefix,
            infix: $infix,
            precedence: $precedence,
        }
    };
}

#[rustfmt::skip]
fn get_rule(typ: TokenType) -> ParseRule {
    use TokenType::*;

    match typ {
        //                  Prefix          Infix         Precedence
        OParen      => rule!(Some(grouping), Some(call),   Precedence::Call),
        Minus       => rule!(Some(unary),    Some(binary), Precedence::Term),
        Plus        => rule!(None,           Some(binary), Precedence::Term),
        Slash       => rule!(None,           Some(binary), Precedence::Factor),
        Star        => rule!(None,           Some(binary), Precedence::Factor),
        Bang        => rule!(Some(unary),    None,         Precedence::None),
        BangEqual   => rule!(None,           Some(binary), Precedence::Equality),
        DEqual      => rule!(None,           Some(binary), Precedence::Equality),
        Greater     => rule!(None,           Some(binary), Precedence::Comparison),
        GreaterEqual => rule!(None,          Some(binary), Precedence::Comparison),
        Less        => rule!(None,           Some(binary), Precedence::Comparison),
        LessEqual   => rule!(None,           Some(binary), Precedence::Comparison),
        Identifier  => rule!(Some(variable), None,         Precedence::None),
        String      => rule!(Some(string),   None,         Precedence::None),
        Number      => rule!(Some(number),   None,         Precedence::None),
        And         => rule!(None,           Some(and),    Precedence::And),
        Or          => rule!(None,           Some(or),     Precedence::Or),
        False       => rule!(Some(literal),  None,         Precedence::None),
        Nil         => rule!(Some(literal),  None,         Precedence::None),
        True        => rule!(Some(literal),  None,         Precedence::None),
        _           => rule!(None,           None,         Precedence::None),
    }
}

struct Local<'a> {
    name: &'a str,
    /// `None` until the initializer finishes, so reads inside it can be
    /// rejected.
    depth: Option<usize>,
    is_captured: bool,
}

#[derive(Clone, Copy, PartialEq)]
struct Upvalue {
    index: u8,
    is_local: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum FunctionKind {
    Script,
    Function,
}

/// Per-function compilation state; nested function declarations stack these.
struct FnState<'a> {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local<'a>>,
    upvalues: Vec<Upvalue>,
    scope_depth: usize,
}

impl<'a> FnState<'a> {
    fn new(kind: FunctionKind, name: Option<ObjRef>) -> Self {
        let mut locals = Vec::with_capacity(MAX_LOCALS);
        // slot zero belongs to the callee itself
        locals.push(Local {
            name: "",
            depth: Some(0),
            is_captured: false,
        });
        Self {
            function: Function::new(name),
            kind,
            locals,
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

pub struct Compiler<'a> {
    scanner: Scanner<'a>,
    current: Token<'a>,
    previous: Token<'a>,
    had_error: bool,
    panic_mode: bool,
    states: Vec<FnState<'a>>,
    heap: &'a mut Heap,
    reporter: &'a mut dyn Reporter,
}

impl<'a> Compiler<'a> {
    fn new(source: &'a str, heap: &'a mut Heap, reporter: &'a mut dyn Reporter) -> Self {
        Self {
            scanner: Scanner::new(source),
            current: Token::empty(),
            previous: Token::empty(),
            had_error: false,
            panic_mode: false,
            states: vec![FnState::new(FunctionKind::Script, None)],
            heap,
            reporter,
        }
    }

    fn state(&self) -> &FnState<'a> {
        self.states.last().unwrap()
    }

    fn state_mut(&mut self) -> &mut FnState<'a> {
        self.states.last_mut().unwrap()
    }

    fn chunk(&self) -> &Chunk {
        &self.state().function.chunk
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.state_mut().function.chunk
    }

    //>> Error reporting

    fn error_at(&mut self, token: Token<'a>, err: CompileError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.reporter.error(Report::new(
            Phase::Compiling,
            token.line,
            token.typ,
            token.lexeme.to_string(),
            err.to_string(),
        ));
    }

    fn error(&mut self, err: CompileError) {
        self.error_at(self.previous, err);
    }

    fn error_at_current(&mut self, err: CompileError) {
        self.error_at(self.current, err);
    }

    fn lexical_error(&mut self, token: Token<'a>) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.reporter.error(Report::new(
            Phase::Scanning,
            token.line,
            token.typ,
            String::new(),
            token.lexeme.to_string(),
        ));
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.typ != TokenType::Eof {
            if self.previous.typ == TokenType::Semicolon {
                return;
            }
            match self.current.typ {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Let
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    //>> Token cursor

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.next_token();
            if self.current.typ != TokenType::Error {
                break;
            }
            let token = self.current;
            self.lexical_error(token);
        }
    }

    fn consume(&mut self, typ: TokenType, err: CompileError) {
        if self.current.typ == typ {
            self.advance();
            return;
        }
        self.error_at_current(err);
    }

    fn check(&self, typ: TokenType) -> bool {
        self.current.typ == typ
    }

    fn matches(&mut self, typ: TokenType) -> bool {
        if !self.check(typ) {
            return false;
        }
        self.advance();
        true
    }

    //>> Emission

    fn emit(&mut self, instr: Instruction) {
        let line = self.previous.line;
        self.chunk_mut().write_instr(instr, line);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk_mut().write(byte, line);
    }

    fn emit_return(&mut self) {
        self.emit(Instruction::Nil);
        self.emit(Instruction::Return);
    }

    fn make_constant(&mut self, value: Value) -> usize {
        let idx = self.chunk_mut().add_constant(value);
        if idx >= MAX_CONSTANTS {
            self.error(CompileError::TooManyConstants);
            return 0;
        }
        idx
    }

    fn emit_index(&mut self, idx: usize) {
        self.emit_byte((idx & 0xff) as u8);
        self.emit_byte(((idx >> 8) & 0xff) as u8);
        self.emit_byte(((idx >> 16) & 0xff) as u8);
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit(Instruction::ConstantLong);
        self.emit_index(idx);
    }

    /// Emits a jump with a placeholder offset and returns where to patch it.
    fn emit_jump(&mut self, instr: Instruction) -> usize {
        self.emit(instr);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // the ip will already have consumed the two offset bytes
        let jump = self.chunk().len() - offset - 2;
        if jump > MAX_JUMP {
            self.error(CompileError::JumpTooLarge);
        }
        self.chunk_mut().patch(offset, ((jump >> 8) & 0xff) as u8);
        self.chunk_mut().patch(offset + 1, (jump & 0xff) as u8);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit(Instruction::Loop);
        let offset = self.chunk().len() - loop_start + 2;
        if offset > MAX_JUMP {
            self.error(CompileError::LoopTooLarge);
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    //>> Declarations

    fn declaration(&mut self) {
        if self.matches(TokenType::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenType::Let) {
            self.let_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn let_declaration(&mut self) {
        let global = self.parse_variable(CompileError::Expected("variable name."));
        if self.matches(TokenType::Equal) {
            self.expression();
        } else {
            self.emit(Instruction::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            CompileError::Expected("';' after variable declaration."),
        );
        self.define_variable(global);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable(CompileError::Expected("function name."));
        // initialized before the body so the function can recurse
        self.mark_initialized();
        self.function();
        self.define_variable(global);
    }

    fn function(&mut self) {
        let name = self.intern(self.previous.lexeme);
        self.states
            .push(FnState::new(FunctionKind::Function, Some(name)));
        self.begin_scope();

        self.consume(
            TokenType::OParen,
            CompileError::Expected("'(' after function name."),
        );
        if !self.check(TokenType::CParen) {
            loop {
                if self.state().function.arity == u8::MAX {
                    self.error_at_current(CompileError::TooManyParams);
                } else {
                    self.state_mut().function.arity += 1;
                }
                let constant = self.parse_variable(CompileError::Expected("parameter name."));
                self.define_variable(constant);
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(
            TokenType::CParen,
            CompileError::Expected("')' after parameters."),
        );
        self.consume(
            TokenType::OBrace,
            CompileError::Expected("'{' before function body."),
        );
        self.block();

        let (function, upvalues) = self.end_state();
        let function = self.heap.alloc(ObjKind::Function(function));
        let idx = self.make_constant(Value::Obj(function));
        self.emit(Instruction::Closure);
        self.emit_index(idx);
        for upvalue in upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    /// Seals the innermost function and pops its state.
    fn end_state(&mut self) -> (Function, Vec<Upvalue>) {
        self.emit_return();
        if cfg!(feature = "debug-bytecode") && !self.had_error {
            let state = self.state();
            let name = match state.function.name {
                Some(name) => self.heap.objects().string(name).chars.clone(),
                None => "<script>".to_string(),
            };
            print!(
                "{}",
                state.function.chunk.disassemble(self.heap.objects(), &name)
            );
        }
        let state = self.states.pop().unwrap();
        (state.function, state.upvalues)
    }

    fn finish(mut self) -> Option<ObjRef> {
        let (function, _) = self.end_state();
        let function = self.heap.alloc(ObjKind::Function(function));
        if self.had_error {
            None
        } else {
            Some(function)
        }
    }

    //>> Variables

    fn intern(&mut self, chars: &str) -> ObjRef {
        self.heap.intern(chars)
    }

    fn identifier_constant(&mut self, name: Token<'a>) -> usize {
        let name = self.intern(name.lexeme);
        self.make_constant(Value::Obj(name))
    }

    fn parse_variable(&mut self, err: CompileError) -> usize {
        self.consume(TokenType::Identifier, err);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous)
    }

    fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.previous;
        let scope_depth = self.state().scope_depth;
        let mut duplicate = false;
        for local in self.state().locals.iter().rev() {
            if local.depth.map_or(false, |depth| depth < scope_depth) {
                break;
            }
            if local.name == name.lexeme {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error(CompileError::SameVariableInScope);
        }
        self.add_local(name.lexeme);
    }

    fn add_local(&mut self, name: &'a str) {
        if self.state().locals.len() == MAX_LOCALS {
            self.error(CompileError::TooManyLocals);
            return;
        }
        self.state_mut().locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let depth = self.state().scope_depth;
        self.state_mut().locals.last_mut().unwrap().depth = Some(depth);
    }

    fn define_variable(&mut self, global: usize) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit(Instruction::DefineGlobal);
        self.emit_index(global);
    }

    fn resolve_local(&mut self, state_idx: usize, name: &str) -> Option<u8> {
        let mut uninitialized = false;
        let mut found = None;
        for (idx, local) in self.states[state_idx].locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    uninitialized = true;
                }
                found = Some(idx as u8);
                break;
            }
        }
        if uninitialized {
            self.error(CompileError::ReadOwnInitializer);
        }
        found
    }

    fn add_upvalue(&mut self, state_idx: usize, index: u8, is_local: bool) -> usize {
        let upvalue = Upvalue { index, is_local };
        for (idx, existing) in self.states[state_idx].upvalues.iter().enumerate() {
            if *existing == upvalue {
                return idx;
            }
        }
        if self.states[state_idx].upvalues.len() == MAX_UPVALUES {
            self.error(CompileError::TooManyUpvalues);
            return 0;
        }
        self.states[state_idx].upvalues.push(upvalue);
        let count = self.states[state_idx].upvalues.len();
        self.states[state_idx].function.upvalue_count = count;
        count - 1
    }

    /// Resolves `name` against the enclosing function, capturing it as an
    /// upvalue chain down to this one.
    fn resolve_upvalue(&mut self, state_idx: usize, name: &str) -> Option<u8> {
        if state_idx == 0 {
            return None;
        }
        let enclosing = state_idx - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(state_idx, local, true) as u8);
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(state_idx, upvalue, false) as u8);
        }
        None
    }

    fn named_variable(&mut self, name: Token<'a>, can_assign: bool) {
        let top = self.states.len() - 1;
        if let Some(slot) = self.resolve_local(top, name.lexeme) {
            if can_assign && self.matches(TokenType::Equal) {
                self.expression();
                self.emit(Instruction::SetLocal);
                self.emit_byte(slot);
            } else {
                self.emit(Instruction::GetLocal);
                self.emit_byte(slot);
            }
        } else if let Some(slot) = self.resolve_upvalue(top, name.lexeme) {
            if can_assign && self.matches(TokenType::Equal) {
                self.expression();
                self.emit(Instruction::SetUpvalue);
                self.emit_byte(slot);
            } else {
                self.emit(Instruction::GetUpvalue);
                self.emit_byte(slot);
            }
        } else {
            let arg = self.identifier_constant(name);
            if can_assign && self.matches(TokenType::Equal) {
                self.expression();
                self.emit(Instruction::SetGlobal);
                self.emit_index(arg);
            } else {
                self.emit(Instruction::GetGlobal);
                self.emit_index(arg);
            }
        }
    }

    //>> Statements

    fn statement(&mut self) {
        if self.matches(TokenType::Print) {
            self.print_statement();
        } else if self.matches(TokenType::If) {
            self.if_statement();
        } else if self.matches(TokenType::OBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.matches(TokenType::While) {
            self.while_statement();
        } else if self.matches(TokenType::For) {
            self.for_statement();
        } else if self.matches(TokenType::Return) {
            self.return_statement();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(
            TokenType::Semicolon,
            CompileError::Expected("';' after value."),
        );
        self.emit(Instruction::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(
            TokenType::Semicolon,
            CompileError::Expected("';' after expression."),
        );
        self.emit(Instruction::Pop);
    }

    fn block(&mut self) {
        while !self.check(TokenType::CBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::CBrace, CompileError::Expected("'}' after block."));
    }

    fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        loop {
            let state = self.state();
            let local = match state.locals.last() {
                Some(local) => local,
                None => break,
            };
            if local.depth.map_or(true, |depth| depth <= state.scope_depth) {
                break;
            }
            // captured locals move to the heap instead of dying with the slot
            let instr = if local.is_captured {
                Instruction::CloseUpvalue
            } else {
                Instruction::Pop
            };
            self.emit(instr);
            self.state_mut().locals.pop();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::OParen, CompileError::Expected("'(' after 'if'."));
        self.expression();
        self.consume(
            TokenType::CParen,
            CompileError::Expected("')' after condition."),
        );

        let then_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit(Instruction::Pop);
        self.statement();
        let else_jump = self.emit_jump(Instruction::Jump);
        self.patch_jump(then_jump);
        self.emit(Instruction::Pop);
        if self.matches(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.consume(
            TokenType::OParen,
            CompileError::Expected("'(' after 'while'."),
        );
        self.expression();
        self.consume(
            TokenType::CParen,
            CompileError::Expected("')' after condition."),
        );

        let exit_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit(Instruction::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(Instruction::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::OParen, CompileError::Expected("'(' after 'for'."));
        if self.matches(TokenType::Semicolon) {
            // no initializer
        } else if self.matches(TokenType::Let) {
            self.let_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().len();
        let mut exit_jump = None;
        if !self.matches(TokenType::Semicolon) {
            self.expression();
            self.consume(
                TokenType::Semicolon,
                CompileError::Expected("';' after loop condition."),
            );
            exit_jump = Some(self.emit_jump(Instruction::JumpIfFalse));
            self.emit(Instruction::Pop);
        }

        if !self.matches(TokenType::CParen) {
            // run the body first, the increment after it, then re-test
            let body_jump = self.emit_jump(Instruction::Jump);
            let increment_start = self.chunk().len();
            self.expression();
            self.emit(Instruction::Pop);
            self.consume(
                TokenType::CParen,
                CompileError::Expected("')' after for clauses."),
            );
            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);
        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(Instruction::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.state().kind == FunctionKind::Script {
            self.error(CompileError::ReturnFromScript);
        }
        if self.matches(TokenType::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(
                TokenType::Semicolon,
                CompileError::Expected("';' after return value."),
            );
            self.emit(Instruction::Return);
        }
    }

    //>> Expressions

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix_rule = match get_rule(self.previous.typ).prefix {
            Some(rule) => rule,
            None => {
                self.error(CompileError::ExpectExpression);
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= get_rule(self.current.typ).precedence {
            self.advance();
            let infix_rule = get_rule(self.previous.typ).infix.unwrap();
            infix_rule(self, can_assign);
        }

        if can_assign && self.matches(TokenType::Equal) {
            self.error(CompileError::InvalidAssignmentTarget);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut argc: usize = 0;
        if !self.check(TokenType::CParen) {
            loop {
                self.expression();
                if argc == 255 {
                    self.error(CompileError::TooManyArgs);
                }
                argc += 1;
                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(
            TokenType::CParen,
            CompileError::Expected("')' after arguments."),
        );
        argc as u8
    }
}

//>> Parse rules

fn grouping(compiler: &mut Compiler, _can_assign: bool) {
    compiler.expression();
    compiler.consume(
        TokenType::CParen,
        CompileError::Expected("')' after expression."),
    );
}

fn number(compiler: &mut Compiler, _can_assign: bool) {
    let value: f64 = compiler.previous.lexeme.parse().unwrap();
    compiler.emit_constant(Value::Number(value));
}

fn string(compiler: &mut Compiler, _can_assign: bool) {
    let lexeme = compiler.previous.lexeme;
    let contents = &lexeme[1..lexeme.len() - 1];
    let contents = compiler.intern(contents);
    compiler.emit_constant(Value::Obj(contents));
}

fn literal(compiler: &mut Compiler, _can_assign: bool) {
    match compiler.previous.typ {
        TokenType::False => compiler.emit(Instruction::False),
        TokenType::Nil => compiler.emit(Instruction::Nil),
        TokenType::True => compiler.emit(Instruction::True),
        _ => unreachable!(),
    }
}

fn variable(compiler: &mut Compiler, can_assign: bool) {
    compiler.named_variable(compiler.previous, can_assign);
}

fn unary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous.typ;
    compiler.parse_precedence(Precedence::Unary);
    match operator {
        TokenType::Minus => compiler.emit(Instruction::Negate),
        TokenType::Bang => compiler.emit(Instruction::Not),
        _ => unreachable!(),
    }
}

fn binary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous.typ;
    compiler.parse_precedence(get_rule(operator).precedence.next());
    match operator {
        TokenType::Plus => compiler.emit(Instruction::Add),
        TokenType::Minus => compiler.emit(Instruction::Subtract),
        TokenType::Star => compiler.emit(Instruction::Multiply),
        TokenType::Slash => compiler.emit(Instruction::Divide),
        TokenType::DEqual => compiler.emit(Instruction::Equal),
        TokenType::BangEqual => {
            compiler.emit(Instruction::Equal);
            compiler.emit(Instruction::Not);
        }
        TokenType::Greater => compiler.emit(Instruction::Greater),
        TokenType::GreaterEqual => {
            compiler.emit(Instruction::Less);
            compiler.emit(Instruction::Not);
        }
        TokenType::Less => compiler.emit(Instruction::Less),
        TokenType::LessEqual => {
            compiler.emit(Instruction::Greater);
            compiler.emit(Instruction::Not);
        }
        _ => unreachable!(),
    }
}

fn and(compiler: &mut Compiler, _can_assign: bool) {
    let end_jump = compiler.emit_jump(Instruction::JumpIfFalse);
    compiler.emit(Instruction::Pop);
    compiler.parse_precedence(Precedence::And);
    compiler.patch_jump(end_jump);
}

fn or(compiler: &mut Compiler, _can_assign: bool) {
    let else_jump = compiler.emit_jump(Instruction::JumpIfFalse);
    let end_jump = compiler.emit_jump(Instruction::Jump);
    compiler.patch_jump(else_jump);
    compiler.emit(Instruction::Pop);
    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}

fn call(compiler: &mut Compiler, _can_assign: bool) {
    let argc = compiler.argument_list();
    compiler.emit(Instruction::Call);
    compiler.emit_byte(argc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Report;

    struct ErrorsTracker {
        errors: Vec<Report>,
    }

    impl ErrorsTracker {
        fn new() -> Self {
            Self { errors: Vec::new() }
        }
    }

    impl Reporter for ErrorsTracker {
        fn error(&mut self, report: Report) {
            self.errors.push(report);
        }
    }

    fn compile_ok(source: &str) -> bool {
        let mut heap = Heap::new();
        let mut tracker = ErrorsTracker::new();
        compile(source, &mut heap, &mut tracker).is_some()
    }

    fn compile_errors(source: &str) -> Vec<String> {
        let mut heap = Heap::new();
        let mut tracker = ErrorsTracker::new();
        assert!(
            compile(source, &mut heap, &mut tracker).is_none(),
            "expected {source:?} to fail"
        );
        tracker.errors.iter().map(|report| report.msg.clone()).collect()
    }

    #[test]
    fn accepts_the_statement_forms() {
        assert!(compile_ok("let a = 1; a = a + 1; print a;"));
        assert!(compile_ok("if (1 < 2) print \"yes\"; else print \"no\";"));
        assert!(compile_ok("while (false) {}"));
        assert!(compile_ok("for (let i = 0; i < 3; i = i + 1) print i;"));
        assert!(compile_ok("for (;;) {}"));
        assert!(compile_ok("fun f(a, b) { return a; } f(1, 2);"));
        assert!(compile_ok("true and false or nil == !1;"));
    }

    #[test]
    fn rejects_return_at_top_level() {
        assert_eq!(
            compile_errors("return 1;"),
            vec!["Cannot return from global scope."]
        );
    }

    #[test]
    fn rejects_invalid_assignment_targets() {
        assert_eq!(
            compile_errors("1 + 2 = 3;"),
            vec!["Invalid assignment target."]
        );
        assert_eq!(
            compile_errors("let a = 1; a + 1 = 2;"),
            vec!["Invalid assignment target."]
        );
    }

    #[test]
    fn rejects_reading_a_local_in_its_own_initializer() {
        assert_eq!(
            compile_errors("{ let a = a; }"),
            vec!["Cannot read local variable in its own initializer."]
        );
    }

    #[test]
    fn rejects_redeclaration_in_the_same_scope() {
        assert_eq!(
            compile_errors("{ let a = 1; let a = 2; }"),
            vec!["There already exists a variable with the same name in this scope."]
        );
        // shadowing an outer scope is fine
        assert!(compile_ok("{ let a = 1; { let a = 2; } }"));
    }

    #[test]
    fn rejects_too_many_locals() {
        let mut source = String::from("fun f() {\n");
        for idx in 0..256 {
            source += &format!("let x{idx} = 0;\n");
        }
        source += "}";
        assert!(compile_errors(&source)
            .contains(&"Too many local variables in function.".to_string()));
    }

    #[test]
    fn keywords_without_rules_are_not_expressions() {
        assert_eq!(compile_errors("class;"), vec!["Expect expression."]);
        assert_eq!(compile_errors("super;"), vec!["Expect expression."]);
        assert_eq!(compile_errors("this;"), vec!["Expect expression."]);
    }

    #[test]
    fn panic_mode_synchronizes_at_statement_boundaries() {
        // one error per broken statement, not a cascade from the first
        let errors = compile_errors("let = 1;\nlet b = 2;\nprint +;\n");
        assert_eq!(
            errors,
            vec!["Expect variable name.", "Expect expression."]
        );
    }

    #[test]
    fn scan_errors_flow_through_the_reporter() {
        let mut heap = Heap::new();
        let mut tracker = ErrorsTracker::new();
        assert!(compile("let a = \"unfinished\n;", &mut heap, &mut tracker).is_none());
        let report = &tracker.errors[0];
        assert_eq!(report.phase, Phase::Scanning);
        assert_eq!(report.msg, "Unterminated string.");
        assert_eq!(report.line, 1);
    }

    #[test]
    fn reports_carry_the_offending_token() {
        let mut heap = Heap::new();
        let mut tracker = ErrorsTracker::new();
        assert!(compile("let 1 = 2;", &mut heap, &mut tracker).is_none());
        let report = &tracker.errors[0];
        assert_eq!(report.phase, Phase::Compiling);
        assert_eq!(report.lexeme, "1");
        assert_eq!(report.to_string(), "[line 1] Error at '1': Expect variable name.");
    }
}
