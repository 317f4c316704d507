//! Terminal request handlers: static serving, reverse proxy, the
//! download index, the metrics page, and shared error rendering.

pub mod download;
pub mod error_page;
pub mod headers;
pub mod metrics_page;
pub mod path_safety;
pub mod proxy;
pub mod serve;
