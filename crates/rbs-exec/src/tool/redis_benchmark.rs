use std::path::Path;

use rbs_model::ClientConfig;
use serde_json::{Map, Number, Value, json};

use crate::tool::{BenchmarkTool, Invocation, ToolError, split_args};

/// `redis-benchmark` in CSV mode; results are converted from stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisBenchmark;

impl BenchmarkTool for RedisBenchmark {
    fn name(&self) -> &'static str {
        "redis-benchmark"
    }

    fn default_binary(&self) -> &'static str {
        "/usr/local/bin/redis-benchmark"
    }

    fn default_image(&self) -> &'static str {
        "redis:6.2.4"
    }

    fn prepare(
        &self,
        cfg: &ClientConfig,
        binary: &str,
        host: &str,
        port: u16,
        _output_file: &str,
    ) -> Result<Invocation, ToolError> {
        let mut argv = vec![
            binary.to_string(),
            "-h".to_string(),
            host.to_string(),
            "-p".to_string(),
            port.to_string(),
            "--csv".to_string(),
        ];
        argv.extend(split_args(&cfg.arguments)?);
        Ok(Invocation::new(argv))
    }

    fn post_process(&self, stdout: &str, output_path: &Path) -> Result<(), ToolError> {
        let results = csv_to_json(stdout)?;
        let body = serde_json::to_vec_pretty(&results).map_err(|e| ToolError::WriteResults {
            path: output_path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(output_path, body).map_err(|e| ToolError::WriteResults {
            path: output_path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Convert `--csv` output into `{"Tests": {"<TEST>": {"<column>": value, ..}}}`.
///
/// Releases before 6.2 print only `"TEST","rps"` rows without a header line.
fn csv_to_json(stdout: &str) -> Result<Value, ToolError> {
    let mut header: Vec<String> = vec!["test".to_string(), "rps".to_string()];
    let mut tests = Map::new();

    for line in stdout.lines().map(str::trim).filter(|l| l.starts_with('"')) {
        let cells: Vec<String> = line
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_string())
            .collect();
        if cells.first().is_some_and(|c| c == "test") {
            header = cells;
            continue;
        }
        let Some((name, values)) = cells.split_first() else {
            continue;
        };

        let mut row = Map::new();
        for (column, raw) in header.iter().skip(1).zip(values) {
            row.insert(column.clone(), cell_value(raw));
        }
        tests.insert(name.clone(), Value::Object(row));
    }

    if tests.is_empty() {
        return Err(ToolError::EmptyOutput);
    }
    Ok(json!({ "Tests": tests }))
}

fn cell_value(raw: &str) -> Value {
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}
