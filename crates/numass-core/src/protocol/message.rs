//! Canonical request/response/error/terminator envelopes.
//!
//! Every action speaks the same minimal contract: requests carry `type` and
//! `action`, responses carry `success` (absent means true) and failures carry
//! `error.message` and `error.class`.

use super::envelope::{Envelope, EnvelopeBuilder};
use crate::error::NumassError;
use crate::meta::Meta;

pub const TYPE_KEY: &str = "type";
pub const ACTION_KEY: &str = "action";
pub const SUCCESS_KEY: &str = "success";
pub const ERROR_MESSAGE_KEY: &str = "error.message";
pub const ERROR_CLASS_KEY: &str = "error.class";

/// Reserved type marking orderly session end.
pub const TERMINATOR_TYPE: &str = "@terminator";

/// Request seeded with `meta.type`.
pub fn request_base(ty: &str) -> EnvelopeBuilder {
    Envelope::builder().set_meta_value(TYPE_KEY, ty)
}

/// Request seeded with `meta.type` and `meta.action`.
pub fn request_action(ty: &str, action: &str) -> EnvelopeBuilder {
    request_base(ty).set_meta_value(ACTION_KEY, action)
}

/// Successful response of the given type.
pub fn response_base(ty: &str) -> EnvelopeBuilder {
    Envelope::builder()
        .set_meta_value(TYPE_KEY, ty)
        .set_meta_value(SUCCESS_KEY, true)
}

/// Successful response answering `request`.
pub fn ok_response(request: &Envelope) -> EnvelopeBuilder {
    response_base(&request.ty().unwrap_or_default()).meta_type(request.meta_type)
}

/// Failed response answering `request`.
pub fn error_response_base(request: &Envelope, error: &NumassError) -> EnvelopeBuilder {
    error_response(&request.ty().unwrap_or_default(), error).meta_type(request.meta_type)
}

/// Failed response without an originating request.
pub fn error_response(ty: &str, error: &NumassError) -> EnvelopeBuilder {
    Envelope::builder().meta(error_meta(error).with_value(TYPE_KEY, ty))
}

/// The `success=false` shape for an error.
pub fn error_meta(error: &NumassError) -> Meta {
    let message = match error {
        NumassError::Remote { message, .. } => message.clone(),
        other => other.to_string(),
    };
    Meta::new()
        .with_value(SUCCESS_KEY, false)
        .with_value(ERROR_MESSAGE_KEY, message)
        .with_value(ERROR_CLASS_KEY, error.class_name())
}

/// Zero-payload envelope announcing that no more requests follow.
pub fn terminator() -> Envelope {
    request_base(TERMINATOR_TYPE).build()
}

pub fn is_terminator(envelope: &Envelope) -> bool {
    envelope.ty().as_deref() == Some(TERMINATOR_TYPE)
}

/// Response success flag; a missing flag counts as success.
pub fn is_success(meta: &Meta) -> bool {
    meta.get_bool(SUCCESS_KEY).unwrap_or(true)
}

/// Turn a failed response back into an error; `None` for successful ones.
pub fn remote_error(meta: &Meta) -> Option<NumassError> {
    if is_success(meta) {
        return None;
    }
    Some(NumassError::Remote {
        class: meta
            .get_string(ERROR_CLASS_KEY)
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        message: meta
            .get_string(ERROR_MESSAGE_KEY)
            .unwrap_or_else(|| "remote side reported failure".to_string()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::MetaType;

    #[test]
    fn request_shape() {
        let env = request_action("numass.run", "start")
            .set_meta_value("path", "run-42")
            .build();
        assert_eq!(env.ty().as_deref(), Some("numass.run"));
        assert_eq!(env.meta.get_string(ACTION_KEY).as_deref(), Some("start"));
        assert!(!env.has_data());
    }

    #[test]
    fn error_response_copies_type() {
        let req = request_action("numass.state", "set")
            .meta_type(MetaType::Binary)
            .build();
        let err = NumassError::Storage("state loader closed".into());
        let resp = error_response_base(&req, &err).build();

        assert_eq!(resp.ty().as_deref(), Some("numass.state"));
        assert_eq!(resp.meta_type, MetaType::Binary);
        assert!(!is_success(&resp.meta));
        assert_eq!(resp.meta.get_string(ERROR_CLASS_KEY).as_deref(), Some("STORAGE"));
        assert_eq!(
            resp.meta.get_string(ERROR_MESSAGE_KEY).as_deref(),
            Some("storage: state loader closed")
        );
    }

    #[test]
    fn missing_success_flag_is_success() {
        assert!(is_success(&Meta::new().with_value("type", "numass.run")));
        assert!(remote_error(&Meta::new()).is_none());
    }

    #[test]
    fn remote_error_round_trips_class_and_message() {
        let meta = error_meta(&NumassError::UnsupportedSource("/tmp/x.txt".into()));
        match remote_error(&meta).unwrap() {
            NumassError::Remote { class, message } => {
                assert_eq!(class, "UNSUPPORTED_SOURCE");
                assert!(message.contains("/tmp/x.txt"));
                // and back again without nesting the prefix
                let again = error_meta(&NumassError::Remote { class, message: message.clone() });
                assert_eq!(again.get_string(ERROR_MESSAGE_KEY), Some(message));
            }
            other => unreachable!("{other:?}"),
        }
    }

    #[test]
    fn terminator_is_recognized() {
        let t = terminator();
        assert!(is_terminator(&t));
        assert!(!t.has_data());
        assert!(!is_terminator(&request_base("numass.run").build()));
    }
}
