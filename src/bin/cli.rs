//! crosskv CLI
//!
//! Command-line interface for inspecting and mutating a store on disk.
//! Every invocation is its own process, so running it against a directory a
//! long-lived application also uses exercises the full cross-process path.

use std::collections::BTreeSet;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use crosskv::{StoreConfig, StoreRegistry, Value};

/// crosskv CLI
#[derive(Parser, Debug)]
#[command(name = "crosskv-cli")]
#[command(about = "Crash-safe multi-process key-value store")]
#[command(version)]
struct Args {
    /// Data directory holding the store files
    #[arg(short, long, default_value = "./crosskv_data")]
    data_dir: String,

    /// Store name
    #[arg(short, long, default_value = "default")]
    store: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key to a value
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// How to interpret the value
        #[arg(short, long, value_enum, default_value_t = Kind::String)]
        kind: Kind,
    },

    /// Remove a key
    Remove {
        /// The key to remove
        key: String,
    },

    /// List all entries
    List,

    /// Remove all entries
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    String,
    Bool,
    Int,
    Long,
    Float,
    /// Comma-separated set of strings
    Set,
}

fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,crosskv=info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let config = StoreConfig::builder().data_dir(&args.data_dir).build();
    let registry = match StoreRegistry::new(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let store = match registry.open(&args.store) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match args.command {
        Commands::Get { key } => match store.get(&key) {
            Some(value) => {
                println!("{}", render(&value));
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("(not found)");
                ExitCode::FAILURE
            }
        },
        Commands::Set { key, value, kind } => {
            let parsed = match parse_value(&value, kind) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let mut editor = store.edit();
            editor.put(key, parsed);
            commit_code(editor.commit())
        }
        Commands::Remove { key } => {
            let mut editor = store.edit();
            editor.remove(key);
            commit_code(editor.commit())
        }
        Commands::List => {
            let mut entries: Vec<_> = store.get_all().into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in entries {
                println!("{key} = {}", render(&value));
            }
            ExitCode::SUCCESS
        }
        Commands::Clear => {
            let mut editor = store.edit();
            editor.clear();
            commit_code(editor.commit())
        }
    };

    registry.shutdown();
    code
}

fn commit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        eprintln!("error: commit failed");
        ExitCode::FAILURE
    }
}

fn parse_value(raw: &str, kind: Kind) -> Result<Value, String> {
    match kind {
        Kind::String => Ok(Value::String(raw.to_string())),
        Kind::Bool => raw
            .parse()
            .map(Value::Bool)
            .map_err(|_| format!("not a boolean: {raw:?}")),
        Kind::Int => raw
            .parse()
            .map(Value::Int)
            .map_err(|_| format!("not a 32-bit integer: {raw:?}")),
        Kind::Long => raw
            .parse()
            .map(Value::Long)
            .map_err(|_| format!("not a 64-bit integer: {raw:?}")),
        Kind::Float => raw
            .parse()
            .map(Value::Float)
            .map_err(|_| format!("not a float: {raw:?}")),
        Kind::Set => Ok(Value::StringSet(
            raw.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<String>>(),
        )),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(v) => v.clone(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::StringSet(v) => v.iter().cloned().collect::<Vec<_>>().join(","),
    }
}
