//! The `screen` command: process creation, attachment, and listing.

use std::sync::Arc;

use osprey_rt::generator::InstructionGenerator;
use osprey_rt::process::Pcb;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::{red, yellow, Shell};

/// Instruction-count range for manually created processes: long enough to
/// watch in a screen session, short enough to finish while attached.
const MANUAL_MIN_INSTRUCTIONS: u32 = 20;
const MANUAL_MAX_INSTRUCTIONS: u32 = 50;

/// Entry point for `screen …` invocations.
pub fn run(shell: &mut Shell, args: &[&str], editor: &mut DefaultEditor) {
    match args {
        ["-ls"] => list(shell),
        ["-s", name] => create(shell, name, editor),
        ["-r", name] => attach(shell, name, editor),
        _ => {
            eprintln!(
                "{}",
                yellow("usage: screen -s <name> | screen -r <name> | screen -ls")
            );
        }
    }
}

/// `screen -ls`: the status report, framed for the console.
fn list(shell: &Shell) {
    let separator = "-".repeat(64);
    println!("{}", separator);
    print!("{}", shell.scheduler.status_report());
    println!("{}", separator);
}

/// `screen -s`: generate a fresh process, submit it, and attach.
fn create(shell: &mut Shell, name: &str, editor: &mut DefaultEditor) {
    if !shell.scheduler.is_running() {
        eprintln!("{}", red("The scheduler is not initialized. Run `initialize` first."));
        return;
    }
    if shell.scheduler.find_by_name(name).is_some() {
        eprintln!("{}", red(&format!("Process '{}' already exists.", name)));
        return;
    }

    let program = InstructionGenerator::new()
        .random_program(MANUAL_MIN_INSTRUCTIONS, MANUAL_MAX_INSTRUCTIONS);
    let pcb = Arc::new(Pcb::new(name, program));
    println!(
        "Created process '{}' with {} ticks of work.",
        name,
        pcb.total_ticks()
    );
    shell.scheduler.submit_process(Arc::clone(&pcb));

    view(&pcb, editor);
}

/// `screen -r`: attach to an existing process.
fn attach(shell: &Shell, name: &str, editor: &mut DefaultEditor) {
    match shell.scheduler.find_by_name(name) {
        Some(pcb) => view(&pcb, editor),
        None => eprintln!("{}", red(&format!("Process '{}' not found.", name))),
    }
}

/// The attached view: a cleared screen with the process's log and
/// progress, refreshed by `process-smi`, left with `exit`.
fn view(pcb: &Arc<Pcb>, editor: &mut DefaultEditor) {
    loop {
        print!("\x1b[2J\x1b[H");
        println!("Process name: {}", pcb.name());
        println!("ID: {}", pcb.pid());
        println!("Logs:");
        let logs = pcb.log_lines();
        if logs.is_empty() {
            println!("(No logs yet)");
        } else {
            for line in logs {
                println!("{}", line);
            }
        }
        println!();
        if pcb.is_complete() {
            println!("Finished!");
        } else {
            println!("Current instruction line: {}", pcb.cursor());
            println!("Lines of code: {}", pcb.total_ticks());
        }
        println!();

        let line = match editor.readline("root:\\> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(_) => break,
        };
        match line.trim() {
            "exit" => break,
            // Loop around and re-render.
            "process-smi" => continue,
            "" => continue,
            other => {
                println!("Unknown command: {}", other);
                println!("Available commands: process-smi, exit");
                // Leave the message readable before the next redraw.
                let _ = editor.readline("press enter to continue> ");
            }
        }
    }
    print!("\x1b[2J\x1b[H");
    crate::banner();
}
