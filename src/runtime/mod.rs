//! Runtime Driver (C1) and Runtime Adapter (C6): the layer that turns plan
//! operations into external CLI invocations and parses their output.

pub mod adapter;
pub mod driver;
pub mod parse;

pub use adapter::{container_name, infer_stack_name, ContainerStatus, ExecInvocation, ImageRecord, RuntimeAdapter};
pub use driver::{FakeRuntimeDriver, ProcessRuntimeDriver, RunOutput, RuntimeDriver};
