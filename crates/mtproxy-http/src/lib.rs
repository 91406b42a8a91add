//! HTTP header codec: request-line/header parsing, `Range` parsing,
//! transfer-header filtering, and response synthesis. Grounded in
//! `utils.py`'s `decode_header`/`filter_transfer_headers` and
//! `http_handler.py`'s response framing.

mod errors;
mod filter;
mod headers;
mod parse;
mod range;
mod response;

pub use errors::{HttpError, Result};
pub use filter::filter_transfer_headers;
pub use headers::{canonicalize_name, HeaderMap};
pub use parse::{decode_header_bytes, find_header_boundary, parse_request, ParsedRequest};
pub use range::{parse_range_header, resolve_end, RangeRequest};
pub use response::{
    canonical_header_digest, content_range_header, synthesize_headers, synthesize_status_line,
};
