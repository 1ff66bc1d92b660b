//! 研究会话生命周期编排：轮询注册表 + 门面

mod orchestrator;
mod registry;

pub use orchestrator::Orchestrator;
pub use registry::{PollRegistry, PollSettings, TIMEOUT_REASON};
