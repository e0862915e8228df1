// ── Reactive device store ──
//
// Concurrent device storage with push-based change notification, plus the
// field-level merge that reconciles it against the backend.

mod merge;
mod registry;

pub use merge::{DeviceField, FieldAuthority, MergeReport};
pub use registry::DeviceRegistry;
