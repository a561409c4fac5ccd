//! Client library for connecting to recsys-proxyd.
//!
//! Provides [`ScoreClient`], which forwards [`ScoreRequest`](crate::ScoreRequest)s
//! to a remote daemon over gRPC.

mod score_client;

pub use score_client::ScoreClient;
