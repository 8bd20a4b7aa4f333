//! Reference command-line driver: assembles a source file, runs it to
//! completion on a fresh `Simulator`, and prints the final register file
//! and exit state. This is the only piece of the workspace that is
//! allowed to log - the core crate is a library and stays silent.

#[macro_use]
extern crate clap;

use std::fs;
use std::process;

use clap::{Arg, ArgGroup};
use edumips64::config::Config;
use edumips64::error::SimError;
use edumips64::simulator::Simulator;

#[derive(Debug)]
enum Error {
    Io(std::io::Error),
    Parse(edumips64::error::ParseReport),
    Config(toml::de::Error),
    Sim(SimError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

fn read_file(path: &str) -> Result<String, Error> {
    Ok(fs::read_to_string(path)?)
}

fn load_config(path: Option<&str>) -> Result<Config, Error> {
    match path {
        Some(path) => {
            let text = read_file(path)?;
            Config::from_toml_str(&text).map_err(Error::Config)
        }
        None => Ok(Config::default()),
    }
}

fn log_snapshot(snapshot: &edumips64::cycle::CycleSnapshot) {
    for stall in &snapshot.stalls {
        log::debug!("cycle {}: stall {:?}", snapshot.cycle, stall);
    }
    if let Some(exception) = snapshot.exception {
        log::debug!("cycle {}: exception {:?}", snapshot.cycle, exception);
    }
    if let Some(target) = snapshot.jumped_to {
        log::debug!("cycle {}: jumped to {:#x}", snapshot.cycle, target);
    }
}

fn run(assembly_path: &str, memory_size: usize, config_path: Option<&str>) -> Result<(), Error> {
    let source = read_file(assembly_path)?;
    let config = load_config(config_path)?;

    let program = asm::assemble(&source, memory_size).map_err(Error::Parse)?;
    let mut simulator = Simulator::new(config, program.code, program.data, program.symbols);
    simulator.start();

    loop {
        let snapshot = simulator.step().map_err(Error::Sim)?;
        log_snapshot(&snapshot);
        if snapshot.halted {
            break;
        }
    }

    log::info!(
        "halted after {} cycles, {} instructions retired",
        simulator.cycle(),
        simulator.instructions_retired()
    );

    let registers = simulator.registers();
    for id in 0..edumips64::constants::GPR_COUNT {
        let value = registers.gpr(id).i();
        if value != 0 {
            println!("r{:<2} = {}", id, value);
        }
    }

    Ok(())
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            Arg::with_name("ASSEMBLY")
                .help("Sets the assembly source file to run")
                .index(1)
                .required(true),
        )
        .arg(
            Arg::with_name("memory")
                .short("m")
                .long("memory")
                .takes_value(true)
                .value_name("BYTES")
                .default_value("65536")
                .help("Sets the size, in bytes, of the data memory"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("TOML")
                .help("Loads simulator configuration from a TOML file"),
        )
        .group(ArgGroup::with_name("input").args(&["ASSEMBLY"]).required(true))
        .get_matches();

    let memory_size = match value_t!(matches.value_of("memory"), usize) {
        Ok(size) => size,
        Err(err) => err.exit(),
    };

    let assembly_path = matches.value_of("ASSEMBLY").unwrap();
    let config_path = matches.value_of("config");

    if let Err(err) = run(assembly_path, memory_size, config_path) {
        match err {
            Error::Parse(report) => {
                for error in &report.0 {
                    eprintln!("error: {}", error);
                }
            }
            other => eprintln!("error: {:?}", other),
        }
        process::exit(1);
    }
}
