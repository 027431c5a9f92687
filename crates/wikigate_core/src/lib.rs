//! Page-title transcoding and article-link helpers for MediaWiki clients.
//!
//! [`title`] holds the pure string functions every request path goes
//! through; [`links`], [`config`] and [`runtime`] are the glue the CLI uses
//! to turn titles into page URLs for a configured wiki.

pub mod config;
pub mod links;
pub mod runtime;
pub mod title;
