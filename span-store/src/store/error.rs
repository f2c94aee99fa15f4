use crate::codec::CodecError;
use backtraced_error::SqlxError;
use span_model::TraceId;

/// Every failure names the step or read that produced it. Store failures are
/// never retried here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to upsert service {service_name:?}")]
    ServiceUpsert {
        service_name: String,
        #[source]
        source: SqlxError,
    },
    #[error("failed to upsert operation {operation_name:?} of service {service_name:?}")]
    OperationUpsert {
        service_name: String,
        operation_name: String,
        #[source]
        source: SqlxError,
    },
    #[error("failed to encode span {field}")]
    Encoding {
        field: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("failed to decode span {field}")]
    Decoding {
        field: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("failed to insert span")]
    SpanInsert {
        #[source]
        source: SqlxError,
    },
    #[error("{operation} query failed")]
    Query {
        operation: &'static str,
        #[source]
        source: SqlxError,
    },
    #[error("trace {trace_id} not found")]
    TraceNotFound { trace_id: TraceId },
}

impl StoreError {
    pub(crate) fn query(operation: &'static str) -> impl FnOnce(SqlxError) -> Self {
        move |source| StoreError::Query { operation, source }
    }

    pub(crate) fn encoding(field: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |source| StoreError::Encoding { field, source }
    }

    pub(crate) fn decoding(field: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |source| StoreError::Decoding { field, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::TraceNotFound { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use backtraced_error::error_chain_to_pretty_formatted;

    #[test]
    fn chain_names_the_failing_field() {
        let err = StoreError::decoding("logs")(CodecError::event("log #0 is not a pair"));
        let chain = error_chain_to_pretty_formatted(&err);
        assert!(chain.contains("failed to decode span logs"), "{chain}");
        assert!(chain.contains("log #0 is not a pair"), "{chain}");
        assert!(!err.is_not_found());
    }
}
