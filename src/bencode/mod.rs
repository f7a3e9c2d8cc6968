mod decoder;
mod value;

pub use decoder::{decode, raw_entry};
pub use value::Value;
