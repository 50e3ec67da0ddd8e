//! matbridge CLI
//!
//! Drives a local Octave through the bridge: send host literals in, read
//! values back out, print the session banner.

use clap::{CommandFactory, Parser as ClapParser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use matbridge::{
    BridgeConfig, HostKernel, MatlabBridge, MessageKind, OctaveSession, VariableStore,
};
use matbridge_core::Value;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Target variable used by `roundtrip`
const ROUNDTRIP_VAR: &str = "matbridge_roundtrip";

#[derive(ClapParser)]
#[command(name = "matbridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Exchange variables with Octave through host literals", long_about = None)]
struct Cli {
    /// Bridge configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Command that starts Octave (overrides config and MATBRIDGE_OCTAVE)
    #[arg(long, global = true, value_name = "COMMAND")]
    octave: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Octave version banner
    Info,

    /// Assign a host literal to an Octave variable and show what Octave sees
    Send {
        /// Target variable name
        name: String,

        /// Host literal, e.g. "{'a': [1, 2.5], 'b': 'text'}"
        literal: String,
    },

    /// Send a host literal to Octave and read it back
    Roundtrip {
        /// Host literal to send
        literal: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matbridge=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        run_completions(shell);
        return;
    }

    let config = load_config(&cli);
    let (bridge, mut octave) = start(&config);

    let result = match cli.command {
        Commands::Info => run_info(&bridge, &mut octave),
        Commands::Send { name, literal } => run_send(&bridge, &mut octave, &name, &literal),
        Commands::Roundtrip { literal, format } => {
            run_roundtrip(&bridge, &mut octave, &literal, format)
        }
        Commands::Completions { .. } => Ok(()),
    };

    for warning in octave.take_warnings() {
        eprintln!("Warning: {}", warning);
    }
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "matbridge", &mut io::stdout());
}

fn load_config(cli: &Cli) -> BridgeConfig {
    let config = match &cli.config {
        Some(path) => match BridgeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => BridgeConfig::new(),
    };
    let mut config = config.with_env_overrides().with_kernel("octave");
    if let Some(command) = &cli.octave {
        config = config.with_octave_command(command.clone());
    }
    config
}

/// Create the bridge, start Octave and run the init statements
fn start(config: &BridgeConfig) -> (MatlabBridge, OctaveSession) {
    let bridge = match MatlabBridge::new(config) {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let mut octave = match OctaveSession::spawn(&config.octave_command) {
        Ok(octave) => octave,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    info!("Started {}", octave.command());

    let init = matbridge::CellRequest::new(bridge.init_statements()).with_silent(true);
    if let Err(e) = octave.run_cell(&init) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    (bridge, octave)
}

fn run_info(bridge: &MatlabBridge, octave: &mut OctaveSession) -> Result<(), String> {
    let banner = bridge.sessioninfo(octave).map_err(|e| e.to_string())?;
    print!("{}", banner);
    Ok(())
}

fn run_send(
    bridge: &MatlabBridge,
    octave: &mut OctaveSession,
    name: &str,
    literal: &str,
) -> Result<(), String> {
    let value = parse_literal(literal)?;
    let mut store = VariableStore::new();
    store.insert(name, value);
    bridge
        .get_vars(octave, &store, &[name], None)
        .map_err(|e| e.to_string())?;

    let shown = octave
        .get_response(&format!("disp({})", name), &[MessageKind::Stream], "stdout")
        .map_err(|e| e.to_string())?;
    for message in shown {
        print!("{}", message.text);
    }
    Ok(())
}

fn run_roundtrip(
    bridge: &MatlabBridge,
    octave: &mut OctaveSession,
    literal: &str,
    format: OutputFormat,
) -> Result<(), String> {
    let value = parse_literal(literal)?;
    let mut store = VariableStore::new();
    store.insert(ROUNDTRIP_VAR, value);
    bridge
        .get_vars(octave, &store, &[ROUNDTRIP_VAR], None)
        .map_err(|e| e.to_string())?;

    let mut back = bridge
        .put_vars(octave, &[ROUNDTRIP_VAR], None)
        .map_err(|e| e.to_string())?;
    let value = back
        .remove(ROUNDTRIP_VAR)
        .ok_or_else(|| format!("{} did not come back", ROUNDTRIP_VAR))?;

    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn parse_literal(literal: &str) -> Result<Value, String> {
    matbridge_codec::parse(literal).map_err(|e| format!("Invalid literal: {}", e))
}
