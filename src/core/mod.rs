// src/core/mod.rs

pub mod html;
pub mod net;
pub mod ratelimit;
pub mod sanitize;

pub use html::{Cell, HtmlTableParser, Row, TableParser};
pub use net::{HttpFetcher, PageFetcher, fetch_page};
pub use ratelimit::RequestQuota;
