//! Public request types.

mod context;
mod request;

pub use context::Context;
pub use request::ScoreRequest;
