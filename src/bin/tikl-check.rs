use std::process;

use clap::Parser;

use tikl::check;
use tikl::cli::CheckerCli;

fn main() {
    let args = CheckerCli::parse();
    let opts = check::Options {
        prefixes: args.prefixes,
        print_output_on_fail: args.print_output_on_fail,
    };
    match check::run(&args.test_file, &opts) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("tikl-check: {}", e);
            process::exit(2);
        }
    }
}
