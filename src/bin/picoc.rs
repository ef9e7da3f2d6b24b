//! `picoc FILE...`: scans each file at global scope, then calls `main`.
//! Exit code 0 on clean return, 1 on any fatal `InterpError`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use picoc_rs::config::InterpreterConfig;
use picoc_rs::driver::run_files;
use picoc_rs::intrinsics::register_defaults;
use picoc_rs::interp::Interpreter;

/// Run one or more C source files through the embedded interpreter.
#[derive(Clone, Debug, Parser)]
struct Args {
    /// source files to scan, in order; `main` is called once all are scanned
    files: Vec<PathBuf>,

    /// byte size of the combined stack-side/free-list-side arena
    #[arg(long, default_value_t = InterpreterConfig::default().heap_size)]
    heap_size: usize,

    /// capacity of the global symbol table
    #[arg(long, default_value_t = InterpreterConfig::default().global_table_size)]
    global_table_size: usize,

    /// capacity of each call frame's local symbol table
    #[arg(long, default_value_t = InterpreterConfig::default().local_table_size)]
    local_table_size: usize,

    /// maximum nested call depth
    #[arg(long, default_value_t = InterpreterConfig::default().stack_depth)]
    stack_depth: usize,

    /// increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "picoc_rs=info",
        1 => "picoc_rs=debug",
        _ => "picoc_rs=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = InterpreterConfig {
        heap_size: args.heap_size,
        global_table_size: args.global_table_size,
        local_table_size: args.local_table_size,
        stack_depth: args.stack_depth,
        ..InterpreterConfig::default()
    };

    let mut interp = Interpreter::new(config, Box::new(|bytes: &[u8]| {
        use std::io::Write;
        let _ = std::io::stdout().write_all(bytes);
    }));
    register_defaults(&mut interp)?;

    match run_files(&mut interp, &args.files) {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}
