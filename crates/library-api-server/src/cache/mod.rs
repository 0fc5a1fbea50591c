pub mod cover;
pub mod fetcher;
pub mod key;

pub use cover::{CachedCover, CoverCache, CoverError, CoverResponse};
pub use fetcher::{ByteStream, CoverFetcher, FetchError, HttpFetcher};
pub use key::{cache_key, cache_path};
