use once_cell::sync::Lazy;
use regex::Regex;

mod audience;
mod event;
mod status;
mod window;

pub mod cache;
pub mod fetch;
pub mod parse;
pub mod validate;

pub use audience::*;
pub use event::*;
pub use parse::*;
pub use status::*;
pub use validate::*;
pub use window::*;

/// HTML-ish tags as they show up in feed descriptions.
pub(crate) static MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("markup regex"));
