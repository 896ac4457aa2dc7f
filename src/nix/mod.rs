pub mod editor;
pub mod errors;
pub mod locator;
pub mod prober;

pub use editor::{Layout, NixEditor, UpsertOutcome, DEFAULT_CONTAINER};
pub use errors::NixError;
pub use locator::{SectionEnd, SectionSpan};
pub use prober::EntryState;
