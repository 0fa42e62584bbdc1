use colored::Colorize;
use std::process;

fn main() {
    match rplay::cli::run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(rplay::exit_codes::INVALID);
        }
    }
}
