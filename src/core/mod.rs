pub mod codec;
pub mod error;
pub mod key;

pub use codec::{Codec, Compression};
pub use error::{CacheError, Result};
pub use key::{CacheKey, ToCacheKey};
