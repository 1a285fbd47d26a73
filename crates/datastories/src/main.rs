//! `datastories` - record, annotate and time-travel through the history of a
//! JSON document from the command line.

/// CLI module - command-line interface for datastories
mod cli;

fn main() {
    env_logger::init();
    cli::run_cli();
}
