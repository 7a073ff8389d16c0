//! URL handling module for pagesift
//!
//! This module derives page URLs from a listing URL, reads page numbers back
//! out of pagination links, and joins row links onto the link base.

mod pagination;
mod resolve;

// Re-export main functions
pub use pagination::{page_number, page_url};
pub use resolve::{join_link, parse_http_url};
