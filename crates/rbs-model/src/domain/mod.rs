mod entry;
pub use entry::{ConsumerCursor, EntryId};

mod work_item;
pub use work_item::{
    DEFAULT_ARTIFACT, FIELD_BUILD_ARTIFACTS, FIELD_BUILD_IMAGE, FIELD_GIT_HASH, FIELD_RUN_IMAGE,
    WorkItem,
};

mod resources;
pub use resources::{CpuRequest, ResourceRequests, Resources};

mod topology;
pub use topology::{TopologyCatalog, TopologySpec};

mod suite;
pub use suite::{ClientConfig, DbConfig, TestSuiteDefinition, yaml_files};

mod cpu;
pub use cpu::CpuSlice;

/// Raw binary field map of one queue entry.
pub type EntryFields = std::collections::HashMap<String, Vec<u8>>;
