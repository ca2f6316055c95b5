use std::io::Write;
use std::process;

use tikl::{cli, runner};

fn main() {
    let (parsed, substs) = match cli::parse_runner_args() {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("tikl: {}", e);
            process::exit(2);
        }
    };
    let (settings, files) = cli::resolve(parsed, substs);

    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted!");
        if let Err(e) = std::io::stderr().flush() {
            eprintln!("Warning: failed to flush stderr: {}", e);
        }
        process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    process::exit(runner::run_files(&files, &settings));
}
