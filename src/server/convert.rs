//! Conversions between native request types and protobuf types.
//!
//! Both directions live here so the server and the client share one mapping.

use crate::types::{Context, ScoreRequest};

use super::proto;

// =============================================================================
// From Proto → Native (incoming requests)
// =============================================================================

impl From<proto::Context> for Context {
    fn from(p: proto::Context) -> Self {
        Context {
            fields: p
                .fields
                .into_iter()
                .map(|(name, values)| (name, values.values))
                .collect(),
        }
    }
}

impl From<proto::ScoreRequest> for ScoreRequest {
    fn from(p: proto::ScoreRequest) -> Self {
        ScoreRequest {
            model_name: p.model_name,
            context: p.context.map(Into::into).unwrap_or_default(),
            items: p.items,
        }
    }
}

// =============================================================================
// From Native → Proto (outgoing requests)
// =============================================================================

impl From<&Context> for proto::Context {
    fn from(context: &Context) -> Self {
        proto::Context {
            fields: context
                .fields
                .iter()
                .map(|(name, values)| {
                    (
                        name.clone(),
                        proto::Values {
                            values: values.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl From<&ScoreRequest> for proto::ScoreRequest {
    fn from(request: &ScoreRequest) -> Self {
        proto::ScoreRequest {
            model_name: request.model_name.clone(),
            context: Some((&request.context).into()),
            items: request.items.clone(),
        }
    }
}
