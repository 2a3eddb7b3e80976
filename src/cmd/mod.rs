mod backends;
mod details;
mod download;
mod search;

pub use backends::cmd_backends;
pub use details::cmd_details;
pub use download::{cmd_download, DownloadOptions};
pub use search::cmd_search;
