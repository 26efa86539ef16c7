pub mod clock;
pub mod errors;
pub mod ocpp_frame;
pub mod shutdown;

pub use clock::{system_clock, Clock, SharedClock, SystemClock};
pub use errors::{DomainError, DomainResult};
pub use ocpp_frame::{OcppErrorCode, OcppFrame, OcppFrameError};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
