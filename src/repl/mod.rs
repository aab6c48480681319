//! Interactive expression evaluation
//!
//! The REPL and `--eval` wrap each input expression in a scratch function
//! compiled under `/.repl`, so the expression runs inside a real object
//! and the whole efun surface is available.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::errors::RuntimeError;
use crate::interp;
use crate::value::Value;
use crate::world::World;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Evaluate one expression in a fresh scratch object.
pub fn eval_expression(world: &mut World, src: &str) -> Result<Value, RuntimeError> {
    let wrapped = format!("mixed ___eval() {{ return ({}); }}", src);
    let mut ctx = world.fresh_ctx();
    let scratch = world.load_from_source(&mut ctx, "/.repl", &wrapped)?;
    interp::call_function(world, &mut ctx, scratch, "___eval", Vec::new(), None)
}

pub fn run_repl(world: &mut World) {
    println!("Mudlark REPL v{}", VERSION);
    println!("Enter expressions. Type 'exit' or 'quit' to leave.\n");

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("cannot start line editor: {}", e);
            return;
        }
    };
    let history = dirs::home_dir().map(|d| d.join(".mudlark_history"));
    if let Some(h) = &history {
        let _ = rl.load_history(h);
    }

    loop {
        match rl.readline("lpc> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                let _ = rl.add_history_entry(&line);
                match eval_expression(world, &line) {
                    Ok(v) => {
                        if let Some(out) = world.take_output(0) {
                            print!("{}", out);
                        }
                        println!("{}", v);
                    }
                    Err(e) => {
                        if let Some(out) = world.take_output(0) {
                            print!("{}", out);
                        }
                        eprintln!("{}", e.render());
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {}", e);
                break;
            }
        }
    }

    if let Some(h) = &history {
        let _ = rl.save_history(h);
    }
}
