//! Transport layer for the Harvest SDK.

pub mod http;

pub use http::{encode_path_segment, HttpTransport, UpstreamRequest, UpstreamResponse};
