//! numass-client command line.
//!
//! ```bash
//! numass-client --address 127.0.0.1 run start run-42
//! numass-client state set hv.voltage 18500
//! numass-client push run-42/set_1 ./data/set_1
//! numass-client note list --limit 5
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use numass_client::{config, ClientConfig, NumassClient};
use numass_core::meta::{json, Meta, Value};
use numass_core::protocol::message::{self, error_meta};

#[derive(Parser)]
#[command(name = "numass-client")]
#[command(about = "Remote control client for the numass envelope server", long_about = None)]
struct Cli {
    /// YAML client config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server address (overrides config)
    #[arg(long)]
    address: Option<String>,

    /// Server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run control
    Run {
        #[command(subcommand)]
        action: RunAction,
    },
    /// Device state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Push a directory or .nm.zip archive
    Push {
        /// Remote path inside the current run
        path: String,
        /// Local directory or archive
        source: PathBuf,
    },
    /// Run notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },
}

#[derive(Subcommand)]
enum RunAction {
    Get,
    Start { name: String },
    Reset,
}

#[derive(Subcommand)]
enum StateAction {
    /// Read states; all of them when no names are given
    Get { names: Vec<String> },
    Set { name: String, value: String },
}

#[derive(Subcommand)]
enum NoteAction {
    Add { text: String },
    List {
        #[arg(long, default_value = "0")]
        limit: u32,
    },
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut client = NumassClient::new(cfg);
    let response = run(&mut client, cli.command);
    client.close();

    match json::encode(&response) {
        Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
        Err(e) => eprintln!("{e}"),
    }
    if message::is_success(&response) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_config(cli: &Cli) -> numass_core::Result<ClientConfig> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(address) = &cli.address {
        cfg.address = address.clone();
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run(client: &mut NumassClient, command: Commands) -> Meta {
    match command {
        Commands::Run { action } => match action {
            RunAction::Get => client.get_current_run(),
            RunAction::Start { name } => client.start_run(&name),
            RunAction::Reset => client.reset_run(),
        },
        Commands::State { action } => match action {
            StateAction::Get { names } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                match client.get_states(&names) {
                    Ok(states) => states.into_iter().fold(Meta::new(), |meta, (name, value)| {
                        meta.with_node("state", Meta::new().with_value("name", name).with_value("value", value))
                    }),
                    Err(e) => error_meta(&e),
                }
            }
            StateAction::Set { name, value } => client.set_state(&name, parse_value(&value)),
        },
        Commands::Push { path, source } => client.send_data(&path, &source),
        Commands::Note { action } => match action {
            NoteAction::Add { text } => client.add_note(&text, None),
            NoteAction::List { limit } => client.get_notes(limit),
        },
    }
}

/// Command-line literal to the narrowest matching value.
fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Str(raw.to_string()),
    }
}
