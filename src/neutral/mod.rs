//! The neutral request/response records handed across the bundle boundary
//! (`spec.md` §3).

mod conversions;
mod request;
mod response;

pub use conversions::{
    connection_details_from_parts, into_hyper_response, join_headers, neutral_request_from_hyper,
    parse_cookies, parse_query,
};
pub use request::{ConnectionDetails, HttpMethod, NeutralRequest};
pub use response::NeutralResponse;
