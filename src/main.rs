mod args;
mod chunk;
mod compiler;
mod error;
mod heap;
mod natives;
mod object;
mod reporter;
mod scanner;
mod table;
mod token;
mod value;
mod vm;

use args::Action;
use reporter::CliReporter;
use rustyline::Editor;
use std::{env, fs, path::PathBuf, process::exit};
use vm::{InterpretError, Vm};

fn main() {
    match args::parse(env::args().skip(1)) {
        Ok(Action::Version) => println!("{}", env!("CARGO_PKG_VERSION")),
        Ok(Action::Help) => print!("{}", include_str!("../help.md")),
        Ok(Action::Repl) => run_repl(),
        Ok(Action::File(path)) => run_file(path),
        Err(err) => {
            eprintln!("{err}");
            eprintln!("Usage: murk [path]");
            exit(exitcode::USAGE);
        }
    }
}

fn run_repl() {
    let mut vm = Vm::new();
    let mut reporter = CliReporter::new();
    let mut rl = Editor::<()>::new();
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                rl.add_history_entry(&line);
                vm.interpret(&line, &mut reporter).ok();
            }
            Err(_) => break,
        }
    }
}

fn run_file(path: PathBuf) {
    let source = fs::read_to_string(&path).unwrap_or_else(|err| {
        eprintln!("Could not read file \"{}\": {}", path.display(), err);
        exit(exitcode::IOERR);
    });
    let mut vm = Vm::new();
    let mut reporter = CliReporter::new();
    match vm.interpret(&source, &mut reporter) {
        Ok(()) => {}
        Err(InterpretError::Compile) => exit(exitcode::DATAERR),
        Err(InterpretError::Runtime(_)) => exit(exitcode::SOFTWARE),
    }
}
