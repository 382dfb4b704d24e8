mod client;
mod error;
mod transport;

pub use client::{as_list, ApiClient};
pub use error::{extract_detail, ApiError};
pub use transport::{join_url, Body, HttpRequest, HttpResponse, HttpTransport, Method, Transport};
