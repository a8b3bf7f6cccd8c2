pub mod debounce;
pub mod format;

pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
