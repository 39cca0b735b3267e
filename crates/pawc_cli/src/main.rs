//! The `pawc` binary: a thin shell around [`cli::run`].

mod cli;
mod config;

fn main() {
    std::process::exit(cli::run());
}
