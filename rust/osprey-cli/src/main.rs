//! Osprey shell — the interactive front end of the OS emulator.
//!
//! The shell owns a single [`Scheduler`] across its lifetime. `initialize`
//! loads a configuration file and starts the engine (workers, clock,
//! dispatcher); `scheduler-start` / `scheduler-stop` toggle batch process
//! generation on top of it; `exit` tears everything down and leaves with
//! status 0.

mod commands;
mod screen;

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser as ClapParser;
use osprey_core::config::Config;
use osprey_rt::scheduler::Scheduler;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use commands::Command;

// ANSI color helpers
pub(crate) fn green(s: &str) -> String {
    format!("\x1b[1;32m{}\x1b[0m", s)
}
pub(crate) fn yellow(s: &str) -> String {
    format!("\x1b[3;33m{}\x1b[0m", s)
}
pub(crate) fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

#[derive(ClapParser)]
#[command(
    name = "osprey",
    version,
    about = "A tick-driven multi-core operating-system emulator",
    long_about = "Osprey multiplexes virtual CPU cores across generated user \
                  processes under an FCFS or round-robin scheduler, with a \
                  contiguous first-fit memory manager gating admission."
)]
struct Cli {
    /// Load this configuration file and start the engine immediately.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Shell state: the engine plus the configuration it was started with.
pub(crate) struct Shell {
    pub(crate) scheduler: Scheduler,
    pub(crate) config: Option<Config>,
}

pub(crate) fn banner() {
    println!(
        r"
  ___  ___ _ __  _ __ ___ _   _
 / _ \/ __| '_ \| '__/ _ \ | | |
| (_) \__ \ |_) | | |  __/ |_| |
 \___/|___/ .__/|_|  \___|\__, |
          |_|             |___/
"
    );
    println!("{}", green("Welcome to the osprey command line!"));
    println!("{}", yellow("Type 'exit' to quit, 'clear' to clear the screen."));
}

fn main() {
    let cli = Cli::parse();
    let mut shell = Shell {
        scheduler: Scheduler::new(),
        config: None,
    };

    banner();

    if let Some(path) = &cli.config {
        shell.initialize(&path.to_string_lossy());
    }

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("{}", red(&format!("cannot open terminal: {}", err)));
            return;
        }
    };

    loop {
        match editor.readline("~ ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                let mut tokens = line.split_whitespace();
                let head = tokens.next().unwrap_or_default();
                let args: Vec<&str> = tokens.collect();

                match Command::from_str(head) {
                    Ok(Command::Exit) => break,
                    Ok(cmd) => shell.dispatch(cmd, &args, &mut editor),
                    Err(_) => eprintln!("{}", red(&format!("Unknown command: {}", head))),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", red(&format!("input error: {}", err)));
                break;
            }
        }
    }

    shell.scheduler.stop();
    println!(
        "Number of cycles from this run: {}",
        shell.scheduler.ticks()
    );
    println!("{}", green("Emulator has shut down cleanly."));
}

impl Shell {
    fn dispatch(&mut self, cmd: Command, args: &[&str], editor: &mut DefaultEditor) {
        match cmd {
            Command::Initialize => {
                let path = args.first().copied().unwrap_or("config.txt");
                self.initialize(path);
            }
            Command::Screen => screen::run(self, args, editor),
            Command::SchedulerStart => self.scheduler_start(),
            Command::SchedulerStop => self.scheduler_stop(),
            Command::ReportUtil => self.report_util(),
            Command::Clear => {
                print!("\x1b[2J\x1b[H");
                banner();
            }
            // Handled by the main loop.
            Command::Exit => {}
        }
    }

    fn initialize(&mut self, path: &str) {
        if self.scheduler.is_running() {
            println!("The scheduler is already initialized.");
            return;
        }
        match Config::from_file(path) {
            Ok(config) => {
                self.scheduler.start(&config);
                println!(
                    "Scheduler started with {} cores ({} scheduling).",
                    self.scheduler.worker_count(),
                    config.scheduler
                );
                self.config = Some(config);
            }
            Err(err) => eprintln!("{}", red(&format!("Error initializing config: {}", err))),
        }
    }

    fn scheduler_start(&mut self) {
        let Some(config) = self.config.clone() else {
            eprintln!("{}", red("The scheduler is not initialized. Run `initialize` first."));
            return;
        };
        if self.scheduler.is_batch_generating() {
            println!("Batch process generation is already running.");
            return;
        }
        self.scheduler.start_batch_generation(&config);
        println!("Started batch process generation.");
    }

    fn scheduler_stop(&mut self) {
        if !self.scheduler.is_batch_generating() {
            println!("Batch process generation is not running.");
            return;
        }
        self.scheduler.stop_batch_generation();
        println!("Stopped batch process generation.");
    }

    fn report_util(&self) {
        const REPORT_PATH: &str = "csopesy-log.txt";
        match self.scheduler.generate_report(REPORT_PATH) {
            Ok(()) => println!("Report generated at {}!", REPORT_PATH),
            Err(err) => eprintln!("{}", red(&format!("Failed to write report: {}", err))),
        }
    }
}
