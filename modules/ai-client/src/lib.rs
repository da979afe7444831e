pub mod claude;
pub mod error;
pub mod util;

pub use claude::{Claude, ImageInput};
pub use error::{AiError, Result};
pub use util::parse_json_object;
