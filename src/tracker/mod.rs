mod client;
mod request;
mod response;

pub use client::TrackerClient;
pub use request::AnnounceRequest;
pub use response::AnnounceResponse;
