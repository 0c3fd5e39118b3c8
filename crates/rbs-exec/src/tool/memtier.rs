use rbs_model::ClientConfig;

use crate::tool::{BenchmarkTool, Invocation, ToolError, split_args};

/// `memtier_benchmark`; writes its own JSON report via `--json-out-file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemtierBenchmark;

impl BenchmarkTool for MemtierBenchmark {
    fn name(&self) -> &'static str {
        "memtier_benchmark"
    }

    fn default_binary(&self) -> &'static str {
        "/usr/local/bin/memtier_benchmark"
    }

    fn default_image(&self) -> &'static str {
        "redislabs/memtier_benchmark:edge"
    }

    fn prepare(
        &self,
        cfg: &ClientConfig,
        binary: &str,
        host: &str,
        port: u16,
        output_file: &str,
    ) -> Result<Invocation, ToolError> {
        let mut argv = vec![
            binary.to_string(),
            "--server".to_string(),
            host.to_string(),
            "--port".to_string(),
            port.to_string(),
            format!("--json-out-file={output_file}"),
            "--hide-histogram".to_string(),
        ];
        argv.extend(split_args(&cfg.arguments)?);
        Ok(Invocation::new(argv))
    }
}
