// tfpart: partition graph declarations from a file or piped stdin
//
// Usage: tfpart [--dump] [--no-hoist] [--list-ops] [FILE]

use std::io::{self, Read};
use std::process;
use tfpartition::ir::registry::op_names;
use tfpartition::{compile_program, PartitionOptions};

fn usage() -> ! {
    eprintln!("usage: tfpart [--dump] [--no-hoist] [--list-ops] [FILE]");
    eprintln!("reads graph declarations from FILE or piped stdin");
    process::exit(2);
}

fn main() {
    let mut options = PartitionOptions::new();
    let mut path = None;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dump" => options = options.with_dump_intermediates(true),
            "--no-hoist" => options = options.with_hoist_constants(false),
            "--list-ops" => {
                for name in op_names() {
                    println!("{}", name);
                }
                return;
            }
            "-h" | "--help" => usage(),
            flag if flag.starts_with('-') => {
                eprintln!("unknown flag '{}'", flag);
                usage();
            }
            file => path = Some(file.to_string()),
        }
    }

    let source = match path {
        Some(path) => std::fs::read_to_string(&path).unwrap_or_else(|e| {
            eprintln!("Error reading {}: {}", path, e);
            process::exit(1);
        }),
        None => {
            // Nothing piped in and no file: nothing to do
            if atty::is(atty::Stream::Stdin) {
                usage();
            }
            let mut input = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut input) {
                eprintln!("Error reading input: {}", e);
                process::exit(1);
            }
            input
        }
    };

    let results = match compile_program(&source, options) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut failed = false;
    for result in results {
        match result {
            Ok(partition) => {
                for (pass, dump) in &partition.intermediates {
                    eprintln!("--- After {}: {}", pass, partition.name);
                    eprintln!("{}", dump);
                }
                for remark in &partition.remarks {
                    eprintln!("{}", remark);
                }
                print!("{}", partition.text);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                failed = true;
            }
        }
    }

    if failed {
        process::exit(1);
    }
}
