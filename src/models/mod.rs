pub mod request;
pub mod response;

pub use request::{Callback, Completion, Request, RequestFrame};
pub use response::{ErrorPayload, Reply, Response, ResponseFrame};
