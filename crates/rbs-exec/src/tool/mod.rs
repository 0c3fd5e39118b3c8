//! Benchmark tools the client sandbox can run.
//!
//! The coordinator does not speak any tool's protocol. A tool only turns a
//! suite's client configuration into a command line and, where the tool
//! cannot write the JSON result file itself, converts its stdout into one.
use std::path::Path;

use rbs_model::ClientConfig;
use thiserror::Error;

mod memtier;
pub use memtier::MemtierBenchmark;

mod redis_benchmark;
pub use redis_benchmark::RedisBenchmark;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("benchmark produced no parsable results")]
    EmptyOutput,
    #[error("failed to write results to {path}: {reason}")]
    WriteResults { path: String, reason: String },
}

/// A prepared client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    /// Flattened, shell-quoted form, for logs.
    pub line: String,
}

impl Invocation {
    pub fn new(argv: Vec<String>) -> Self {
        let line = argv
            .iter()
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ");
        Self { argv, line }
    }
}

pub trait BenchmarkTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Binary path inside the default client image.
    fn default_binary(&self) -> &'static str;

    fn default_image(&self) -> &'static str;

    /// Build the client command. `output_file` is the in-sandbox path the
    /// JSON result must end up at.
    fn prepare(
        &self,
        cfg: &ClientConfig,
        binary: &str,
        host: &str,
        port: u16,
        output_file: &str,
    ) -> Result<Invocation, ToolError>;

    /// Produce the JSON result at `output_path` (host side) from the captured stdout.
    fn post_process(&self, _stdout: &str, _output_path: &Path) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Look up a tool by the name used in `clientconfig.tool`.
pub fn tool_for(name: &str) -> Option<Box<dyn BenchmarkTool>> {
    match name.trim() {
        "redis-benchmark" => Some(Box::new(RedisBenchmark)),
        "memtier_benchmark" | "memtier-benchmark" => Some(Box::new(MemtierBenchmark)),
        _ => None,
    }
}

/// Split a shell-like argument string, honouring single/double quotes and backslash escapes.
pub fn split_args(raw: &str) -> Result<Vec<String>, ToolError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(raw)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch) => current.push(ch),
                            None => return Err(dangling(raw)),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated(raw)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err(dangling(raw)),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

fn unterminated(raw: &str) -> ToolError {
    ToolError::InvalidArguments(format!("unterminated quote in {raw:?}"))
}

fn dangling(raw: &str) -> ToolError {
    ToolError::InvalidArguments(format!("dangling escape in {raw:?}"))
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_and_quoted_words() {
        let args = split_args(r#"-d 100 --key-prefix "memtier key" 'a b' c\ d """#).unwrap();
        assert_eq!(args, vec!["-d", "100", "--key-prefix", "memtier key", "a b", "c d", ""]);
    }

    #[test]
    fn empty_string_yields_no_arguments() {
        assert!(split_args("   ").unwrap().is_empty());
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(matches!(
            split_args("-t 'set,get"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn invocation_line_quotes_when_needed() {
        let inv = Invocation::new(
            vec!["redis-benchmark".into(), "-t".into(), "set get".into(), "".into()],
        );
        assert_eq!(inv.line, "redis-benchmark -t 'set get' ''");
    }

    #[test]
    fn tool_lookup() {
        assert_eq!(tool_for("redis-benchmark").unwrap().name(), "redis-benchmark");
        assert_eq!(tool_for("memtier_benchmark").unwrap().name(), "memtier_benchmark");
        assert!(tool_for("ycsb").is_none());
    }
}
