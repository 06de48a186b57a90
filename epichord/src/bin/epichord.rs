//! Process entry point: parses command-line flags, opens the MIDI output
//! port, and serves commands from stdin until `exit`, `crash`, or EOF.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use epichord::clock::RealClock;
use epichord::control::parse_command;
use epichord::engine::{CommandOutcome, ControlError, Engine};
use epichord::{EngineConfig, MidiPort, MidirPort};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let port_name = args
        .iter()
        .position(|a| a == "--port")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str);

    let config = EngineConfig::load();
    epichord::logging::init_logging(config.log_level);

    let port: Arc<Mutex<dyn MidiPort>> = match MidirPort::open("epichord", port_name) {
        Ok(port) => Arc::new(Mutex::new(port)),
        Err(e) => {
            eprintln!("** SOUND unable to open midi output: {e}");
            log::error!("{e}");
            std::process::exit(-1);
        }
    };

    let clock = Arc::new(RealClock::new());
    let mut engine = Engine::new(config, port, clock);

    run_command_loop(&mut engine);
}

fn run_command_loop(engine: &mut Engine) {
    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("** SOUND stdin read error: {e}");
                log::error!("stdin read error: {e}");
                std::process::exit(-1);
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("SOUND {e}");
                log::warn!("{e}");
                continue;
            }
        };

        match engine.apply(command) {
            Ok(CommandOutcome::Continue) => {}
            Ok(CommandOutcome::Tell(beat)) => {
                let mut out = stdout.lock();
                let _ = writeln!(out, "{beat}");
                let _ = out.flush();
            }
            Ok(CommandOutcome::Exit) => {
                let _ = engine.apply(epichord::Command::Stop);
                std::process::exit(0);
            }
            Ok(CommandOutcome::Crash) => {
                eprintln!("** SOUND crash requested");
                std::process::abort();
            }
            Err(ControlError::Command(e)) => {
                eprintln!("SOUND {e}");
                log::warn!("{e}");
            }
            Err(e @ ControlError::Fatal(_)) | Err(e @ ControlError::Port(_)) => {
                eprintln!("** SOUND {e}");
                log::error!("{e}");
                std::process::exit(-1);
            }
        }
    }

    // Clean EOF: stop if still playing, then exit 0.
    let _ = engine.apply(epichord::Command::Stop);
    std::process::exit(0);
}
