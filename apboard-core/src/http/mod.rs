//! Just enough HTTP/1.x for the control panel.
//!
//! One request per connection, no chunked bodies, no keep-alive. A request
//! that does not fit the configured buffer, or arrives incomplete, is
//! malformed.

mod request;
mod response;

pub use request::{frame_len, MalformedRequest, Method, Request};
pub use response::{Response, StatusCode};
