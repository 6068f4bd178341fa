pub mod error;
pub mod fanout;
pub mod reddit;
pub mod snapshot;
pub mod traits;

pub use error::SourceError;
pub use fanout::fetch_all;
pub use reddit::RedditFetcher;
pub use traits::SourceFetcher;
