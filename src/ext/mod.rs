mod async_conversion;
mod path_display_ext;

pub use async_conversion::{AsyncTryFrom, AsyncTryInto};
pub use path_display_ext::PathDisplayExt;
