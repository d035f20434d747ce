mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{ChannelOrder, DetectorBackend, InputSpec};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{BackendConstructor, BackendRegistry};
pub use result::{BoundingBox, Detection, FrameResult, RawDetection};
