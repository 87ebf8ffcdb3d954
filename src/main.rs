use log::{debug, info};
use stackmill::config::MachineConfig;
use stackmill::interpreter::run_program;
use std::env;
use std::fs;
use std::path::Path;

/// Optional machine configuration, picked up from the working directory.
const CONFIG_FILE: &str = "stackmill.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    // Usage hint when no bytecode file is given; exit with success since the
    // user asked for help rather than hit an error.
    if args.len() < 2 {
        println!("stackmill - bytecode virtual machine");
        println!();
        println!("Usage: {} <program.bin>", args[0]);
        println!();
        println!(
            "Machine settings (RAM size, stack capacity, step limit) are read \
             from {} when present.",
            CONFIG_FILE
        );
        return Ok(());
    }

    let program_path = &args[1];

    let config = if Path::new(CONFIG_FILE).exists() {
        let config = MachineConfig::load(Path::new(CONFIG_FILE))?;
        info!("loaded configuration from {}", CONFIG_FILE);
        config
    } else {
        MachineConfig::default()
    };

    debug!("loading bytecode: {}", program_path);
    let program = match fs::read(program_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            match e.kind() {
                std::io::ErrorKind::NotFound => {
                    eprintln!("Error: bytecode file not found: {}", program_path);
                    eprintln!();
                    eprintln!("Assemble a source file first:");
                    eprintln!("  smasm <source.sasm> {}", program_path);
                }
                _ => {
                    eprintln!("Error: cannot read '{}': {}", program_path, e);
                }
            }
            std::process::exit(1);
        }
    };

    debug!("program is {} byte(s)", program.len());
    match run_program(program, &config) {
        Ok(()) => {
            debug!("program halted normally");
            Ok(())
        }
        Err(e) => {
            eprintln!("\nError during execution: {e}");
            Err(Box::new(e))
        }
    }
}
