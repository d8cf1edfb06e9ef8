//! chatmem - batch front end for the chat memory store.
//!
//! ```text
//! stdin (JSON array | object | JSON lines) -> Dispatcher::run -> stdout (JSON array)
//! ```
//!
//! Stdout carries only the result document. Logs go to a file under the data
//! directory, or nowhere.

use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use chatmem_config::MemoryConfig;
use chatmem_core::{Dispatcher, open_store};

const USAGE: &str = "\
Usage: chatmem [--continue-on-fail]

Reads request items from stdin and writes one JSON result per item to stdout.
Input may be a JSON array, a single JSON object, or one object per line.

Each item is an object with an `operation` (default getMessages) and a
`sessionKey` (generated when missing):
  getMessages    windowSize (10)
  addMessage     role (user), content, metadata
  autoStoreUser  payload (defaults to the item)
  autoStoreAI    payload (defaults to the item)
  formatForAI    tokenLimit (4000), model (gpt-3.5-turbo)
  smartContext   tokenLimit (4000), model (gpt-3.5-turbo)
  clearMemory

Options:
  --continue-on-fail  Record {\"error\": ...} for a failing item and keep going
  -h, --help          Print this help

Environment:
  CHATMEM_DATA_DIR    Directory holding chat-memory.sqlite (default: cwd)
  RUST_LOG            Log filter (default: info)
";

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    continue_on_fail: bool,
    help: bool,
}

impl Args {
    fn parse(raw: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = Args::default();
        for arg in raw {
            match arg.as_str() {
                "--continue-on-fail" => args.continue_on_fail = true,
                "-h" | "--help" => args.help = true,
                other => bail!("unknown argument '{other}'\n\n{USAGE}"),
            }
        }
        Ok(args)
    }
}

fn init_tracing(config: &MemoryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file(config);

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, drop logs rather than mix them into the JSON on stdout.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file(config: &MemoryConfig) -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates(config) {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates(config: &MemoryConfig) -> Vec<PathBuf> {
    vec![
        config.log_dir().join("chatmem.log"),
        PathBuf::from(".chatmem").join("logs").join("chatmem.log"),
    ]
}

/// Accepts a JSON array of items, a single item, or whitespace-separated items.
fn parse_items(input: &str) -> Result<Vec<Value>> {
    let mut values = serde_json::Deserializer::from_str(input)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()
        .context("stdin is not valid JSON")?;

    if values.len() == 1
        && let Some(Value::Array(items)) = values.pop_if(|value| value.is_array())
    {
        return Ok(items);
    }
    Ok(values)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse(env::args().skip(1))?;
    if args.help {
        print!("{USAGE}");
        return Ok(());
    }

    let config = MemoryConfig::load().context("failed to load configuration")?;
    init_tracing(&config);

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read stdin")?;
    let items = parse_items(&input)?;

    let store = open_store(&config)
        .await
        .with_context(|| format!("failed to open {}", config.db_path().display()))?;
    let dispatcher = Dispatcher::new(Arc::new(store));

    tracing::info!(
        items = items.len(),
        continue_on_fail = args.continue_on_fail,
        "Processing request items"
    );
    let results = dispatcher.run(&items, args.continue_on_fail).await?;

    let mut output = serde_json::to_string_pretty(&results)?;
    output.push('\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(output.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Args, log_file_candidates, parse_items};
    use chatmem_config::MemoryConfig;

    fn args(raw: &[&str]) -> anyhow::Result<Args> {
        Args::parse(raw.iter().map(ToString::to_string))
    }

    #[test]
    fn parses_flags() {
        assert_eq!(args(&[]).unwrap(), Args::default());
        assert!(args(&["--continue-on-fail"]).unwrap().continue_on_fail);
        assert!(args(&["-h"]).unwrap().help);
        assert!(args(&["--verbose"]).is_err());
    }

    #[test]
    fn items_from_array() {
        let items = parse_items(r#"[{"operation":"getMessages"},{"operation":"clearMemory"}]"#)
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn items_from_single_object() {
        let items = parse_items(r#"{"operation":"getMessages","sessionKey":"s"}"#).unwrap();
        assert_eq!(items, vec![json!({"operation": "getMessages", "sessionKey": "s"})]);
    }

    #[test]
    fn items_from_json_lines() {
        let input = "{\"sessionKey\":\"a\"}\n{\"sessionKey\":\"b\"}\n";
        let items = parse_items(input).unwrap();
        assert_eq!(items, vec![json!({"sessionKey": "a"}), json!({"sessionKey": "b"})]);
    }

    #[test]
    fn empty_input_is_no_items() {
        assert!(parse_items("").unwrap().is_empty());
        assert!(parse_items("  \n").unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(parse_items("{not json").is_err());
    }

    #[test]
    fn log_file_prefers_data_dir() {
        let candidates = log_file_candidates(&MemoryConfig::at("/data"));
        assert_eq!(candidates[0], std::path::PathBuf::from("/data/logs/chatmem.log"));
    }
}
