pub mod clock;
pub mod signature;
pub mod sink;
pub mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use signature::{sign_payload, verify_signature, SIGNATURE_HEADER};
pub use sink::{BestEffort, ErrorSink, TracingErrorSink};
