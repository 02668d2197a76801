use super::chunk::{Chunk, Instruction};
use super::compiler;
use super::error::RuntimeError;
use super::heap::Heap;
use super::natives;
use super::object::{Closure, Native, NativeContext, ObjKind, ObjRef, Upvalue};
use super::reporter::Reporter;
use super::table::Table;
use super::value::Value;
use std::io::{self, Write};
use std::time::Instant;

pub const FRAMES_MAX: usize = 64;
pub const STACK_MAX: usize = FRAMES_MAX * 256;

#[derive(Debug, PartialEq)]
pub enum InterpretError {
    Compile,
    Runtime(RuntimeError),
}

/// One active call: the closure being run, its instruction cursor, and the
/// stack index of its window (slot zero holds the callee, then arguments,
/// then locals).
struct CallFrame {
    closure: ObjRef,
    ip: usize,
    slots: usize,
}

pub struct Vm<W: Write> {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    /// Upvalues still pointing into the stack, sorted by slot.
    open_upvalues: Vec<ObjRef>,
    created_at: Instant,
    out: W,
}

impl Vm<io::Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl<W: Write> Vm<W> {
    pub fn with_output(out: W) -> Self {
        let mut vm = Self {
            heap: Heap::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            created_at: Instant::now(),
            out,
        };
        for (name, function) in natives::NATIVES {
            let name = vm.heap.intern(name);
            let native = vm.heap.alloc(ObjKind::Native(Native { function }));
            vm.globals.set(vm.heap.objects(), name, Value::Obj(native));
        }
        vm
    }

    pub fn interpret(
        &mut self,
        source: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<(), InterpretError> {
        let function = match compiler::compile(source, &mut self.heap, reporter) {
            Some(function) => function,
            None => return Err(InterpretError::Compile),
        };

        // the function stays rooted while its closure is allocated
        self.push(Value::Obj(function));
        let closure = self.alloc(ObjKind::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure));

        let result = self
            .call_value(Value::Obj(closure), 0)
            .and_then(|()| self.run());
        if let Err(err) = result {
            self.report_runtime_error(&err);
            self.reset_stack();
            return Err(InterpretError::Runtime(err));
        }
        Ok(())
    }

    //>> Stack manipulation

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap()
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    //>> Allocation and collection

    fn alloc(&mut self, kind: ObjKind) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(kind)
    }

    fn intern(&mut self, chars: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(chars)
    }

    fn collect_garbage(&mut self) {
        if cfg!(feature = "debug-gc") {
            eprintln!("-- gc begin ({} objects)", self.heap.objects().live());
        }

        for value in &self.stack {
            self.heap.mark_value(*value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for upvalue in &self.open_upvalues {
            self.heap.mark_object(*upvalue);
        }
        self.globals.mark(&mut self.heap);

        self.heap.trace();
        let freed = self.heap.sweep();

        if cfg!(feature = "debug-gc") {
            eprintln!(
                "-- gc end (freed {freed}, {} live)",
                self.heap.objects().live()
            );
        }
    }

    //>> Frames and operand reading

    fn frame(&self) -> &CallFrame {
        self.frames.last().unwrap()
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().unwrap()
    }

    fn current_chunk(&self) -> &Chunk {
        let closure = self.heap.objects().closure(self.frame().closure);
        &self.heap.objects().function(closure.function).chunk
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.current_chunk().byte(self.frame().ip);
        self.frame_mut().ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        hi << 8 | lo
    }

    fn read_constant(&mut self) -> Value {
        let b0 = self.read_byte() as usize;
        let b1 = self.read_byte() as usize;
        let b2 = self.read_byte() as usize;
        self.current_chunk().constant(b0 | b1 << 8 | b2 << 16)
    }

    fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            _ => unreachable!("name constants are interned strings"),
        }
    }

    //>> Calls

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), RuntimeError> {
        let callee = match callee {
            Value::Obj(r) => r,
            _ => return Err(RuntimeError::NotCallable),
        };
        let native = match self.heap.objects().kind(callee) {
            ObjKind::Closure(_) => None,
            ObjKind::Native(native) => Some(native.function),
            _ => return Err(RuntimeError::NotCallable),
        };
        match native {
            None => self.call(callee, argc),
            Some(function) => {
                let context = NativeContext {
                    created_at: self.created_at,
                };
                let args_start = self.stack.len() - argc;
                let result = function(&context, &self.stack[args_start..])
                    .map_err(RuntimeError::Native)?;
                self.stack.truncate(args_start - 1);
                self.push(result);
                Ok(())
            }
        }
    }

    fn call(&mut self, closure: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let function = self.heap.objects().closure(closure).function;
        let arity = self.heap.objects().function(function).arity;
        if argc != arity as usize {
            return Err(RuntimeError::ArityMismatch {
                expected: arity,
                got: argc,
            });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots: self.stack.len() - argc - 1,
        });
        Ok(())
    }

    //>> Upvalues

    /// Returns the open upvalue for `slot`, reusing an existing one so every
    /// closure over the same variable shares a cell.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (idx, upvalue) in self.open_upvalues.iter().enumerate().rev() {
            match self.heap.objects().upvalue(*upvalue) {
                Upvalue::Open(existing) => {
                    if *existing == slot {
                        return *upvalue;
                    }
                    if *existing < slot {
                        break;
                    }
                    insert_at = idx;
                }
                Upvalue::Closed(_) => unreachable!("closed upvalue in the open list"),
            }
        }
        let upvalue = self.alloc(ObjKind::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, upvalue);
        upvalue
    }

    /// Closes every open upvalue at or above `last`: the slot's value moves
    /// into the cell and the cell leaves the open list.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(&upvalue) = self.open_upvalues.last() {
            let slot = match self.heap.objects().upvalue(upvalue) {
                Upvalue::Open(slot) => *slot,
                Upvalue::Closed(_) => unreachable!("closed upvalue in the open list"),
            };
            if slot < last {
                break;
            }
            let value = self.stack[slot];
            *self.heap.objects_mut().upvalue_mut(upvalue) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }

    //>> Dispatch

    fn run(&mut self) -> Result<(), RuntimeError> {
        while !self.frames.is_empty() {
            if cfg!(feature = "debug-execution") {
                let (text, _) = self
                    .current_chunk()
                    .disassemble_instr_at(self.heap.objects(), self.frame().ip);
                eprint!("{text}");
            }
            let instr = Instruction::from(self.read_byte());
            self.execute(instr)?;
        }
        Ok(())
    }

    fn execute(&mut self, instr: Instruction) -> Result<(), RuntimeError> {
        match instr {
            Instruction::ConstantLong => {
                let value = self.read_constant();
                self.push(value);
            }
            Instruction::Nil => self.push(Value::Nil),
            Instruction::True => self.push(Value::Bool(true)),
            Instruction::False => self.push(Value::Bool(false)),
            Instruction::Pop => {
                self.pop();
            }
            Instruction::GetLocal => {
                let slot = self.read_byte() as usize;
                let value = self.stack[self.frame().slots + slot];
                self.push(value);
            }
            Instruction::SetLocal => {
                let slot = self.read_byte() as usize;
                let idx = self.frame().slots + slot;
                self.stack[idx] = self.peek(0);
            }
            Instruction::GetGlobal => {
                let name = self.read_string();
                match self.globals.get(self.heap.objects(), name) {
                    Some(value) => self.push(value),
                    None => return Err(self.undefined_variable(name)),
                }
            }
            Instruction::DefineGlobal => {
                let name = self.read_string();
                let value = self.peek(0);
                self.globals.set(self.heap.objects(), name, value);
                self.pop();
            }
            Instruction::SetGlobal => {
                let name = self.read_string();
                let value = self.peek(0);
                // setting may not create: undo the insert and report
                if self.globals.set(self.heap.objects(), name, value) {
                    self.globals.delete(self.heap.objects(), name);
                    return Err(self.undefined_variable(name));
                }
            }
            Instruction::GetUpvalue => {
                let slot = self.read_byte() as usize;
                let upvalue = self.heap.objects().closure(self.frame().closure).upvalues[slot];
                let value = match self.heap.objects().upvalue(upvalue) {
                    Upvalue::Open(idx) => self.stack[*idx],
                    Upvalue::Closed(value) => *value,
                };
                self.push(value);
            }
            Instruction::SetUpvalue => {
                let slot = self.read_byte() as usize;
                let upvalue = self.heap.objects().closure(self.frame().closure).upvalues[slot];
                let value = self.peek(0);
                match self.heap.objects_mut().upvalue_mut(upvalue) {
                    Upvalue::Open(idx) => {
                        let idx = *idx;
                        self.stack[idx] = value;
                    }
                    Upvalue::Closed(closed) => *closed = value,
                }
            }
            Instruction::CloseUpvalue => {
                self.close_upvalues(self.stack.len() - 1);
                self.pop();
            }
            Instruction::Equal => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a == b));
            }
            Instruction::Greater => {
                let (a, b) = self.pop_numbers()?;
                self.push(Value::Bool(a > b));
            }
            Instruction::Less => {
                let (a, b) = self.pop_numbers()?;
                self.push(Value::Bool(a < b));
            }
            Instruction::Add => match (self.peek(1), self.peek(0)) {
                (Value::Number(a), Value::Number(b)) => {
                    self.pop();
                    self.pop();
                    self.push(Value::Number(a + b));
                }
                (Value::Obj(a), Value::Obj(b)) if self.both_strings(a, b) => {
                    // operands stay rooted until the result exists
                    let chars = format!(
                        "{}{}",
                        self.heap.objects().string(a).chars,
                        self.heap.objects().string(b).chars
                    );
                    let result = self.intern(&chars);
                    self.pop();
                    self.pop();
                    self.push(Value::Obj(result));
                }
                _ => return Err(RuntimeError::OperandsMustBeNumbersOrStrings),
            },
            Instruction::Subtract => {
                let (a, b) = self.pop_numbers()?;
                self.push(Value::Number(a - b));
            }
            Instruction::Multiply => {
                let (a, b) = self.pop_numbers()?;
                self.push(Value::Number(a * b));
            }
            Instruction::Divide => {
                let (a, b) = self.pop_numbers()?;
                self.push(Value::Number(a / b));
            }
            Instruction::Not => {
                let value = self.pop();
                self.push(Value::Bool(value.is_falsey()));
            }
            Instruction::Negate => match self.peek(0) {
                Value::Number(n) => {
                    self.pop();
                    self.push(Value::Number(-n));
                }
                _ => return Err(RuntimeError::OperandMustBeNumber),
            },
            Instruction::Print => {
                let value = self.pop();
                let text = value.display(self.heap.objects()).to_string();
                let _ = writeln!(self.out, "{text}");
            }
            Instruction::Jump => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip += offset;
            }
            Instruction::JumpIfFalse => {
                let offset = self.read_short() as usize;
                if self.peek(0).is_falsey() {
                    self.frame_mut().ip += offset;
                }
            }
            Instruction::Loop => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip -= offset;
            }
            Instruction::Call => {
                let argc = self.read_byte() as usize;
                self.call_value(self.peek(argc), argc)?;
            }
            Instruction::Closure => {
                let function = match self.read_constant() {
                    Value::Obj(r) => r,
                    _ => unreachable!("closure operand is a function constant"),
                };
                let upvalue_count = self.heap.objects().function(function).upvalue_count;
                let closure = self.alloc(ObjKind::Closure(Closure {
                    function,
                    upvalues: Vec::with_capacity(upvalue_count),
                }));
                // on the stack before capturing, so a collection mid-capture
                // sees both the closure and its upvalues so far
                self.push(Value::Obj(closure));
                for _ in 0..upvalue_count {
                    let is_local = self.read_byte() != 0;
                    let index = self.read_byte() as usize;
                    let upvalue = if is_local {
                        let slot = self.frame().slots + index;
                        self.capture_upvalue(slot)
                    } else {
                        self.heap.objects().closure(self.frame().closure).upvalues[index]
                    };
                    self.heap.objects_mut().closure_mut(closure).upvalues.push(upvalue);
                }
            }
            Instruction::Return => {
                let result = self.pop();
                let frame = self.frames.pop().unwrap();
                self.close_upvalues(frame.slots);
                self.stack.truncate(frame.slots);
                if !self.frames.is_empty() {
                    self.push(result);
                }
            }
            Instruction::Unknown => unreachable!("unknown opcode"),
        }
        Ok(())
    }

    fn both_strings(&self, a: ObjRef, b: ObjRef) -> bool {
        matches!(self.heap.objects().kind(a), ObjKind::Str(_))
            && matches!(self.heap.objects().kind(b), ObjKind::Str(_))
    }

    fn pop_numbers(&mut self) -> Result<(f64, f64), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                Ok((a, b))
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers),
        }
    }

    fn undefined_variable(&self, name: ObjRef) -> RuntimeError {
        RuntimeError::UndefinedVariable(self.heap.objects().string(name).chars.clone())
    }

    //>> Runtime error reporting

    fn report_runtime_error(&mut self, error: &RuntimeError) {
        eprintln!("{error}");
        for frame in self.frames.iter().rev() {
            let closure = self.heap.objects().closure(frame.closure);
            let function = self.heap.objects().function(closure.function);
            // the cursor has already moved past the failing byte
            let line = function.chunk.line(frame.ip - 1);
            match function.name {
                Some(name) => eprintln!(
                    "[line {}] in {}()",
                    line,
                    self.heap.objects().string(name).chars
                ),
                None => eprintln!("[line {}] in script", line),
            }
        }
    }
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

    fn run_source(source: &str) -> (String, Result<(), InterpretError>) {
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        let result = vm.interpret(source, &mut tracker);
        (String::from_utf8(vm.out).unwrap(), result)
    }

    fn output_of(source: &str) -> String {
        let (output, result) = run_source(source);
        assert_eq!(result, Ok(()), "{source:?} should run cleanly");
        output
    }

    fn runtime_error_of(source: &str) -> RuntimeError {
        match run_source(source).1 {
            Err(InterpretError::Runtime(err)) => err,
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(output_of("print 1 + 2 * 3;"), "7\n");
        assert_eq!(output_of("print (1 + 2) * 3;"), "9\n");
        assert_eq!(output_of("print -2 * 3;"), "-6\n");
        assert_eq!(output_of("print 7 / 2;"), "3.5\n");
    }

    #[test]
    fn results_print_to_six_significant_digits() {
        assert_eq!(output_of("print 0.1 + 0.2;"), "0.3\n");
        assert_eq!(output_of("print 100000000000000000000;"), "1e+20\n");
        assert_eq!(output_of("print 2 / 3;"), "0.666667\n");
        assert_eq!(output_of("print 1 / 0;"), "inf\n");
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            output_of("let a = \"foo\"; let b = \"bar\"; print a + b;"),
            "foobar\n"
        );
    }

    #[test]
    fn comparison_equality_and_logic() {
        assert_eq!(output_of("print 1 < 2;"), "true\n");
        assert_eq!(output_of("print 2 <= 1;"), "false\n");
        assert_eq!(output_of("print \"a\" + \"b\" == \"ab\";"), "true\n");
        assert_eq!(output_of("print 1 != nil;"), "true\n");
        assert_eq!(output_of("print nil == nil;"), "true\n");
        assert_eq!(output_of("print !nil;"), "true\n");
        assert_eq!(output_of("print true and 3;"), "3\n");
        assert_eq!(output_of("print false and 3;"), "false\n");
        assert_eq!(output_of("print false or \"fallback\";"), "fallback\n");
        assert_eq!(output_of("print 1 or 2;"), "1\n");
    }

    #[test]
    fn recursive_functions() {
        assert_eq!(
            output_of(
                "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } \
                 print fib(10);"
            ),
            "55\n"
        );
    }

    #[test]
    fn closures_share_a_counter_cell() {
        assert_eq!(
            output_of(
                "fun makeCounter() { let c = 0; fun inc() { c = c + 1; return c; } return inc; } \
                 let k = makeCounter(); print k(); print k(); print k();"
            ),
            "1\n2\n3\n"
        );
    }

    #[test]
    fn independent_counters_do_not_interfere() {
        assert_eq!(
            output_of(
                "fun makeCounter() { let c = 0; fun inc() { c = c + 1; return c; } return inc; } \
                 let a = makeCounter(); let b = makeCounter(); \
                 print a(); print a(); print b();"
            ),
            "1\n2\n1\n"
        );
    }

    #[test]
    fn closures_capture_block_locals() {
        assert_eq!(
            output_of(
                "let get; { let x = \"inside\"; fun f() { return x; } get = f; } print get();"
            ),
            "inside\n"
        );
    }

    #[test]
    fn closures_capture_through_intermediate_functions() {
        // `inner` reaches `x` through `middle`, which never uses it itself
        assert_eq!(
            output_of(
                "fun outer() { let x = \"captured\"; \
                 fun middle() { fun inner() { return x; } return inner; } \
                 return middle; } \
                 print outer()()();"
            ),
            "captured\n"
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(
            output_of(
                "let touched = false; \
                 fun touch() { touched = true; return true; } \
                 false and touch(); \
                 print touched; \
                 true or touch(); \
                 print touched; \
                 true and touch(); \
                 print touched;"
            ),
            "false\nfalse\ntrue\n"
        );
    }

    #[test]
    fn sibling_closures_share_the_same_variable() {
        assert_eq!(
            output_of(
                "fun pair() { let n = 0; fun set(v) { n = v; } fun get() { return n; } \
                 set(41); n = n + 1; return get; } \
                 print pair()();"
            ),
            "42\n"
        );
    }

    #[test]
    fn for_loops() {
        assert_eq!(
            output_of("for (let i = 0; i < 3; i = i + 1) print i;"),
            "0\n1\n2\n"
        );
        assert_eq!(
            output_of("let i = 10; for (i = 0; i < 2; i = i + 1) print i; print i;"),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn while_loops() {
        assert_eq!(
            output_of("let n = 3; while (n > 0) { print n; n = n - 1; }"),
            "3\n2\n1\n"
        );
    }

    #[test]
    fn block_scoping_shadows_and_restores() {
        assert_eq!(
            output_of("let a = \"x\"; { let a = \"y\"; print a; } print a;"),
            "y\nx\n"
        );
    }

    #[test]
    fn if_else_branches() {
        assert_eq!(
            output_of("if (1 > 2) print \"then\"; else print \"else\";"),
            "else\n"
        );
        assert_eq!(output_of("if (true) print \"then\";"), "then\n");
        assert_eq!(output_of("if (false) print \"then\";"), "");
    }

    #[test]
    fn printing_values() {
        assert_eq!(output_of("print nil;"), "nil\n");
        assert_eq!(output_of("print true;"), "true\n");
        assert_eq!(output_of("fun f() {} print f;"), "<fn f>\n");
        assert_eq!(output_of("print clock;"), "<native fn>\n");
    }

    #[test]
    fn same_source_is_deterministic() {
        let source = "let total = 0; \
                      for (let i = 1; i < 5; i = i + 1) total = total + i * i; \
                      print total;";
        assert_eq!(output_of(source), output_of(source));
    }

    #[test]
    fn globals_persist_across_interprets() {
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        vm.interpret("let counter = 1;", &mut tracker).unwrap();
        vm.interpret("counter = counter + 1;", &mut tracker).unwrap();
        vm.interpret("print counter;", &mut tracker).unwrap();
        assert_eq!(String::from_utf8(vm.out).unwrap(), "2\n");
    }

    #[test]
    fn natives_are_callable() {
        // clock measures seconds since the interpreter started, so a fresh
        // one reads close to zero
        let (output, result) = run_source("let t = clock(); print 0 <= t and t < 60;");
        assert_eq!(result, Ok(()));
        assert_eq!(output, "true\n");

        let (output, result) = run_source("let r = random(); print 0 <= r and r < 1;");
        assert_eq!(result, Ok(()));
        assert_eq!(output, "true\n");
    }

    #[test]
    fn the_stack_nets_to_empty_after_a_script() {
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        vm.interpret(
            "let a = 1; { let b = a + 1; print b; } fun f(x) { return x; } f(a);",
            &mut tracker,
        )
        .unwrap();
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        assert!(vm.open_upvalues.is_empty());
    }

    //>> Runtime errors

    #[test]
    fn type_errors() {
        assert_eq!(
            runtime_error_of("print 1 + \"one\";"),
            RuntimeError::OperandsMustBeNumbersOrStrings
        );
        assert_eq!(
            runtime_error_of("print 1 < \"two\";"),
            RuntimeError::OperandsMustBeNumbers
        );
        assert_eq!(
            runtime_error_of("print -\"three\";"),
            RuntimeError::OperandMustBeNumber
        );
    }

    #[test]
    fn undefined_globals() {
        assert_eq!(
            runtime_error_of("print missing;"),
            RuntimeError::UndefinedVariable("missing".to_string())
        );
        assert_eq!(
            runtime_error_of("missing = 1;"),
            RuntimeError::UndefinedVariable("missing".to_string())
        );

        // the failed set must not have created the global
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        assert!(vm.interpret("ghost = 1;", &mut tracker).is_err());
        assert_eq!(
            vm.interpret("print ghost;", &mut tracker),
            Err(InterpretError::Runtime(RuntimeError::UndefinedVariable(
                "ghost".to_string()
            )))
        );
    }

    #[test]
    fn calling_a_non_callable_is_an_error() {
        assert_eq!(runtime_error_of("let x = 7; x();"), RuntimeError::NotCallable);
        assert_eq!(runtime_error_of("\"s\"();"), RuntimeError::NotCallable);
    }

    #[test]
    fn arity_is_checked() {
        assert_eq!(
            runtime_error_of("fun f(a, b) {} f(1);"),
            RuntimeError::ArityMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn runaway_recursion_overflows_the_frame_stack() {
        assert_eq!(
            runtime_error_of("fun f() { f(); } f();"),
            RuntimeError::StackOverflow
        );
    }

    #[test]
    fn the_stack_resets_after_a_runtime_error() {
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        assert!(vm.interpret("fun f() { return 1 + nil; } f();", &mut tracker).is_err());
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        // the VM is still usable afterwards
        vm.interpret("print \"recovered\";", &mut tracker).unwrap();
        assert_eq!(String::from_utf8(vm.out).unwrap(), "recovered\n");
    }

    //>> Collection

    #[test]
    fn collection_keeps_everything_the_program_can_still_reach() {
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        vm.interpret(
            "let kept = \"kept\"; \
             fun makeCounter() { let c = 0; fun inc() { c = c + 1; return c; } return inc; } \
             let k = makeCounter(); k();",
            &mut tracker,
        )
        .unwrap();

        let live_before = vm.heap.objects().live();
        vm.collect_garbage();
        // dead compile artifacts go away, roots survive
        assert!(vm.heap.objects().live() <= live_before);

        vm.collect_garbage();
        vm.interpret("print kept; print k();", &mut tracker).unwrap();
        assert_eq!(String::from_utf8(vm.out).unwrap(), "kept\n2\n");
    }

    #[test]
    fn collection_frees_objects_no_longer_reachable() {
        let mut vm = Vm::with_output(Vec::new());
        let mut tracker = ErrorsTracker::new();
        vm.interpret("let a = \"gone\" + \"soon\";", &mut tracker).unwrap();
        vm.interpret("a = nil;", &mut tracker).unwrap();

        vm.collect_garbage();
        let after_first = vm.heap.objects().live();
        // a second collection with unchanged roots frees nothing more
        vm.collect_garbage();
        assert_eq!(vm.heap.objects().live(), after_first);

        // the swept concatenation is gone from the intern table as well, so
        // rebuilding it works from scratch
        vm.interpret("print \"gone\" + \"soon\";", &mut tracker).unwrap();
        assert_eq!(String::from_utf8(vm.out).unwrap(), "gonesoon\n");
    }
}
