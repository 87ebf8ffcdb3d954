use stackmill::disassembler::disassemble;
use std::env;
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("smdasm - stackmill bytecode listing");
        println!();
        println!("Usage: {} <program.bin>", args[0]);
        return Ok(());
    }

    let program = fs::read(&args[1]).map_err(|e| format!("cannot read '{}': {}", args[1], e))?;

    match disassemble(&program) {
        Ok(listing) => {
            print!("{listing}");
            Ok(())
        }
        Err(e) => {
            eprintln!("Disassembly failed: {e}");
            std::process::exit(1);
        }
    }
}
