//! Boundaries to the systems the scheduler drives but does not own.

mod traits;

pub use traits::*;
