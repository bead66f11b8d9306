pub mod html;
pub mod keywords;

pub use html::extract;
pub use keywords::{KeywordExtractor, TermFilter};
