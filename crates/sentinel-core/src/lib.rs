pub mod error;
pub mod markdown;
pub mod traits;
pub mod types;

pub use error::*;
pub use markdown::{contains_term, escape_markdown, has_unescaped_markdown, sanitize_text};
pub use traits::*;
pub use types::*;
