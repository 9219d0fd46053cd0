#[macro_use]
extern crate tracing;

mod backend;
mod error;
mod metadata;
mod probe;

pub use backend::{
    BackendKind,
    CaptureBackend,
    CaptureOutcome,
    RawCopyBackend,
    ReencodeBackend,
};
pub use error::{
    CaptureError,
    ProbeError,
};
pub use metadata::MediaProbe;
pub use probe::probe;
