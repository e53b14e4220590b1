mod client;

pub use client::{take_basic_auth, BasicAuth, HttpClient, HttpClientConfig};
