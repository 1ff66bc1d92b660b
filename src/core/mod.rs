//! 核心层：错误类型、时钟抽象、优雅关闭

pub mod clock;
pub mod error;
pub mod shutdown;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AgentServiceError, IntakeError, OrchestratorError, StoreError};
pub use shutdown::{ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
