mod decoder;
mod dict;
mod encoder;
mod value;

pub use decoder::{decode, decode_all};
pub use dict::BencodeDict;
pub use encoder::encode;
pub use value::BencodeValue;
