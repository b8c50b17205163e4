//! Classification of transport failures into [`ColumnarError`]s.
//!
//! Translation happens once, where a [`TransportError`] first crosses into the
//! query client. The first matching rule wins:
//!
//! 1. HTTP 401 or an authentication cause is an invalid credential.
//! 2. Server error descriptors are classified by the first code: 20000 is an
//!    invalid credential, 21002 a timeout, anything else a [`QueryError`].
//! 3. Otherwise the cause decides. Timeouts, cancellations and deadlines keep
//!    their kind and, when the request never left the client, say so.
//! 4. Failures the transport could not describe pass through unchanged.
//!
//! A closed transport is reported as [`ColumnarError::Closed`].

use crate::error::{ColumnarError, ErrorKind, QueryError, ServiceError};
use crate::transport::{FailureCause, RequestFailure, TransportError};

/// Server code for rejected credentials.
pub const CODE_INVALID_CREDENTIAL: u32 = 20000;

/// Server code for a query that exceeded its timeout.
pub const CODE_TIMEOUT: u32 = 21002;

/// Message for a request abandoned because its timeout would be exceeded.
pub const NOT_SENT_TIMEOUT: &str = "operation not sent to server, as timeout would be exceeded";

/// Message for a request abandoned because it was cancelled.
pub const NOT_SENT_CANCELLED: &str = "operation not sent to server, as the request was cancelled";

/// Message for a request abandoned because its deadline would be exceeded.
pub const NOT_SENT_DEADLINE: &str = "operation not sent to server, as the deadline would be exceeded";

const STATUS_UNAUTHORIZED: u16 = 401;

/// Translate a transport failure into the error taxonomy.
pub fn translate_error(err: TransportError) -> ColumnarError {
    match err {
        TransportError::Request(failure) => translate_failure(failure),
        TransportError::Closed => ColumnarError::Closed,
        other @ TransportError::Other(_) => ColumnarError::Transport(other),
    }
}

fn translate_failure(failure: RequestFailure) -> ColumnarError {
    let RequestFailure {
        cause,
        statement,
        endpoint,
        status_code,
        errors,
        was_not_dispatched,
    } = failure;

    if status_code == STATUS_UNAUTHORIZED || cause == FailureCause::Authentication {
        let mut ctx =
            ServiceError::new(ErrorKind::InvalidCredential, statement, endpoint, status_code)
                .with_errors(errors);
        if let FailureCause::Other(text) = cause {
            ctx = ctx.with_message(text);
        }
        return ctx.into();
    }

    if let Some(first) = errors.first() {
        let code = first.code;
        return match code {
            CODE_INVALID_CREDENTIAL => {
                ServiceError::new(ErrorKind::InvalidCredential, statement, endpoint, status_code)
                    .with_errors(errors)
                    .into()
            }
            CODE_TIMEOUT => ServiceError::new(ErrorKind::Timeout, statement, endpoint, status_code)
                .with_errors(errors)
                .into(),
            _ => {
                let message = first.message.clone();
                QueryError::new(statement, endpoint, status_code, code, message)
                    .with_errors(errors)
                    .into()
            }
        };
    }

    let (kind, not_sent) = match cause {
        FailureCause::Timeout => (ErrorKind::Timeout, NOT_SENT_TIMEOUT),
        FailureCause::Cancelled => (ErrorKind::Cancelled, NOT_SENT_CANCELLED),
        FailureCause::DeadlineExceeded => (ErrorKind::DeadlineExceeded, NOT_SENT_DEADLINE),
        FailureCause::Authentication => (ErrorKind::InvalidCredential, ""),
        FailureCause::Other(text) => {
            return ServiceError::new(ErrorKind::Columnar, statement, endpoint, status_code)
                .with_cause(text)
                .into();
        }
    };

    let mut ctx = ServiceError::new(kind, statement, endpoint, status_code);
    if was_not_dispatched {
        ctx = ctx.with_message(not_sent);
    }
    ctx.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDescriptor;

    fn failure(cause: FailureCause) -> RequestFailure {
        RequestFailure::new(cause, "SELECT 1", "db1:18095")
    }

    #[test]
    fn test_unauthorized_status() {
        let failure = failure(FailureCause::Other("nope".into())).with_status(401);
        let err = translate_error(failure.into());
        assert!(err.is_invalid_credential());
        let ctx = err.context().unwrap();
        assert_eq!(ctx.status_code(), 401);
        assert_eq!(ctx.message(), "nope");
        assert_eq!(ctx.statement(), "SELECT 1");
    }

    #[test]
    fn test_authentication_cause() {
        let err = translate_error(failure(FailureCause::Authentication).into());
        assert!(err.is_invalid_credential());
    }

    #[test]
    fn test_descriptor_codes() {
        let err = translate_error(
            failure(FailureCause::Other("x".into()))
                .with_errors(vec![ErrorDescriptor::new(20000, "Unauthorized user")])
                .into(),
        );
        assert!(err.is_invalid_credential());

        let err = translate_error(
            failure(FailureCause::Other("x".into()))
                .with_errors(vec![ErrorDescriptor::new(21002, "Request timed out")])
                .into(),
        );
        assert!(err.is_timeout());
        assert!(!err.to_string().contains("operation not sent to server"));
    }

    #[test]
    fn test_query_error_carries_all_descriptors() {
        let err = translate_error(
            failure(FailureCause::Other("x".into()))
                .with_status(400)
                .with_errors(vec![
                    ErrorDescriptor::new(24000, "Syntax error"),
                    ErrorDescriptor::new(24001, "Another"),
                ])
                .into(),
        );

        let query_err = err.as_query_error().unwrap();
        assert_eq!(query_err.code(), 24000);
        assert_eq!(query_err.message(), "Syntax error");
        assert_eq!(query_err.context().errors().len(), 2);
        assert_eq!(query_err.context().status_code(), 400);
    }

    #[test]
    fn test_not_dispatched_annotations() {
        let err = translate_error(failure(FailureCause::Timeout).not_dispatched().into());
        assert!(err.is_timeout());
        assert!(err.to_string().contains(NOT_SENT_TIMEOUT));

        let err = translate_error(failure(FailureCause::Cancelled).not_dispatched().into());
        assert!(err.is_cancelled());
        assert!(err.to_string().contains(NOT_SENT_CANCELLED));

        let err = translate_error(failure(FailureCause::DeadlineExceeded).not_dispatched().into());
        assert!(err.is_deadline_exceeded());
        assert!(err.to_string().contains(NOT_SENT_DEADLINE));
    }

    #[test]
    fn test_dispatched_timeout_has_no_annotation() {
        let err = translate_error(failure(FailureCause::Timeout).into());
        assert!(err.is_timeout());
        assert!(!err.to_string().contains("operation not sent to server"));
    }

    #[test]
    fn test_generic_cause_keeps_raw_text() {
        let err = translate_error(failure(FailureCause::Other("connection reset".into())).into());
        assert_eq!(err.kind(), ErrorKind::Columnar);
        assert!(err.to_string().starts_with("connection reset | "));
    }

    #[test]
    fn test_unrecognized_failure_passes_through() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err = translate_error(TransportError::other(io));

        assert!(matches!(err, ColumnarError::Transport(_)));
        assert_eq!(err.to_string(), "broken pipe");
    }

    #[test]
    fn test_closed_transport() {
        let err = translate_error(TransportError::Closed);
        assert!(err.is_closed());
        assert_eq!(err.kind(), ErrorKind::Closed);
    }
}
