//! Concrete adapters for every provider role.

pub mod gemini;
pub mod realdebrid;
pub mod tmdb;
pub mod torbox;
pub mod torrent_files;
pub mod trakt;
pub mod zilean;

pub use gemini::GeminiClient;
pub use realdebrid::RealDebridClient;
pub use tmdb::TmdbClient;
pub use torbox::TorBoxClient;
pub use trakt::TraktClient;
pub use zilean::ZileanClient;
