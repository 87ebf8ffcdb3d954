use log::{debug, info};
use stackmill::assembler::assemble;
use std::env;
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        println!("smasm - stackmill assembler");
        println!();
        println!("Usage: {} <source_file> <output_file>", args[0]);
        return Ok(());
    }

    let source_path = &args[1];
    let output_path = &args[2];

    debug!("reading source: {}", source_path);
    let source = match fs::read_to_string(source_path) {
        Ok(text) => text,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                eprintln!("Error: source file not found: {}", source_path);
            } else {
                eprintln!("Error: cannot read '{}': {}", source_path, e);
            }
            std::process::exit(1);
        }
    };

    // The whole program is assembled and patched in memory; the output file
    // is written once, only on success.
    let program = match assemble(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Assembly failed: {e}");
            std::process::exit(1);
        }
    };

    fs::write(output_path, &program)
        .map_err(|e| format!("cannot write '{}': {}", output_path, e))?;
    info!("wrote {} byte(s) to {}", program.len(), output_path);
    Ok(())
}
