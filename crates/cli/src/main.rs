//! The interactive console front-end (spec §6).

mod commands;
mod report;
mod view;

use std::io::{self, Write};

use commands::ControlFlow;
use engine::facade::System;

fn main() {
    env_logger::init();
    println!("coresim - type `initialize` to load config.txt, `exit` to quit.");

    let mut system: Option<System> = None;
    loop {
        print!("coresim> ");
        if io::stdout().flush().is_err() {
            break;
        }
        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF
        }
        let cmd = match commands::parse(&line) {
            Ok(cmd) => cmd,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if let ControlFlow::Exit = commands::execute(cmd, &mut system) {
            break;
        }
    }
}
