//! Custom assertion macros and utilities

/// Assert that a submission was rejected as a duplicate and return the
/// existing entry it points at
#[macro_export]
macro_rules! assert_duplicate {
    ($outcome:expr) => {
        match $outcome {
            attendsync::SubmitOutcome::Rejected(attendsync::RejectReason::DuplicateFound(existing)) => existing,
            other => panic!("Expected Rejected(DuplicateFound), got: {:?}", other),
        }
    };
}

/// Assert that a submission was rejected for validation
#[macro_export]
macro_rules! assert_invalid {
    ($outcome:expr) => {
        match $outcome {
            attendsync::SubmitOutcome::Rejected(attendsync::RejectReason::Validation(message)) => message,
            other => panic!("Expected Rejected(Validation), got: {:?}", other),
        }
    };
}
