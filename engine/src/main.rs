use clap::Parser;
use indexmap::IndexMap;
use std::path::PathBuf;

use kargs::diag::ErrorClass;
use kargs::{Signature, Value};

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    Args,
    Graph,
    Fingerprint,
}

#[derive(Parser, Debug)]
#[command(
    name = "kargs",
    version,
    about = "Derives the runtime arguments of a stencil kernel from its signature and partial input"
)]
struct Cli {
    /// Operator signature (.json)
    signature: PathBuf,

    /// Supplied argument value, `name=value` (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Request autotuning of tile sizes
    #[arg(long)]
    autotune: bool,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Args)]
    emit: EmitStage,

    /// Print phases and debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if cli.verbose {
        eprintln!("kargs: signature = {}", cli.signature.display());
        eprintln!("kargs: emit      = {:?}", cli.emit);
    }

    // ── Load signature ──
    let signature = match Signature::load(&cli.signature) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("kargs: error: {}", e);
            std::process::exit(2);
        }
    };

    if let EmitStage::Fingerprint = cli.emit {
        match signature.fingerprint_hex() {
            Ok(hex) => println!("{}", hex),
            Err(e) => {
                eprintln!("kargs: error: {}", e);
                std::process::exit(2);
            }
        }
        return;
    }

    let engine = signature.into_engine();
    if cli.verbose {
        eprintln!(
            "kargs: {} arguments, {} dimensions",
            engine.graph().arguments.len(),
            engine.graph().dims.len()
        );
    }

    if let EmitStage::Graph = cli.emit {
        print!("{}", engine.graph());
        return;
    }

    // ── Parse supplied values ──
    let mut values: IndexMap<String, Value> = IndexMap::new();
    let mut had_errors = false;
    for entry in &cli.set {
        match kargs::parser::parse_assignment(entry) {
            Ok((name, value)) => {
                values.insert(name, value);
            }
            Err(errors) => {
                for err in errors {
                    eprintln!("kargs: parse error in '{}': {}", entry, err);
                }
                had_errors = true;
            }
        }
    }
    if had_errors {
        std::process::exit(1);
    }

    // ── Derive ──
    let invocation = match engine.handle(values, cli.autotune) {
        Ok(inv) => inv,
        Err(e) => {
            eprintln!("kargs: {}", e.render());
            let code = match e.class() {
                ErrorClass::User => 1,
                ErrorClass::Internal => 2,
            };
            std::process::exit(code);
        }
    };
    kargs::log_arguments(&invocation);

    match serde_json::to_string_pretty(&invocation) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("kargs: error: {}", e);
            std::process::exit(2);
        }
    }
}
