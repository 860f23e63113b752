mod application;
mod deserialize;

pub use application::*;
pub use deserialize::deserialize_non_empty_string;
