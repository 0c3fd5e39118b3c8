mod error;
pub use error::{ExecError, ExecResult};

mod util;

pub mod sandbox;
pub use sandbox::{
    BindMount, ClientOutput, DockerCli, SandboxHandle, SandboxRuntime, SandboxSpec,
    standalone_server_args,
};

pub mod tool;
pub use tool::{BenchmarkTool, Invocation, MemtierBenchmark, RedisBenchmark, ToolError, tool_for};
