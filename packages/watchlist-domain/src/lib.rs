pub mod anchors;
pub mod fold;
pub mod language;
pub mod tokens;

pub use fold::{fold, same_name};
pub use language::Language;
