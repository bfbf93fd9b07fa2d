//! Error taxonomy for the simulation kernel.
//!
//! Every fallible engine operation returns [`SimResult`]; the simulation
//! loop short-circuits on the first error. Numeric errors raised during a
//! transition abort the step. The caller may discard most of them and keep
//! stepping, except [`Error::IntegratorInternal`] which indicates corrupted
//! integrator state and should be treated as fatal.

use thiserror::Error;

/// Result type used throughout the engine.
pub type SimResult<T> = Result<T, Error>;

/// Everything that can go wrong inside the kernel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // -- memory ----------------------------------------------------------
    #[error("arena capacity out of range")]
    ArenaOutOfCapacity,

    #[error("arena allocation failed")]
    ArenaOutOfMemory,

    #[error("scratch vector out of memory")]
    VectorOutOfMemory,

    #[error("message arena exhausted")]
    NotEnoughMessage,

    #[error("connection arena exhausted")]
    NotEnoughNode,

    #[error("dated-message arena exhausted")]
    NotEnoughDatedMessage,

    // -- wiring ----------------------------------------------------------
    #[error("model identifier does not resolve to a live model")]
    UnknownDynamics,

    #[error("output port index out of range for the source model")]
    ConnectUnknownOutputPort,

    #[error("input port index out of range for the destination model")]
    ConnectUnknownInputPort,

    #[error("connection already exists")]
    ConnectAlreadyExists,

    #[error("source and destination dynamics are incompatible")]
    ConnectIncompatibleDynamics,

    // -- integrators -----------------------------------------------------
    #[error("integrator initial state or quantum is not finite")]
    IntegratorBadX,

    #[error("integrator output requested in an invalid state")]
    IntegratorOutput,

    #[error("integrator internal state is corrupted")]
    IntegratorInternal,

    #[error("integrator is running without a derivative estimate")]
    IntegratorRunningWithoutXDot,

    #[error("integrator derivative is inconsistent with its thresholds")]
    IntegratorBadXDot,

    // -- quantifier ------------------------------------------------------
    #[error("quantifier step size must be strictly positive")]
    QuantifierBadQuantum,

    #[error("quantifier archive length must be at least 3")]
    QuantifierBadArchiveLength,

    #[error("quantifier shifting factor is negative")]
    QuantifierShiftingNeg,

    #[error("quantifier shifting factor exceeds 1")]
    QuantifierShiftingOver1,

    // -- other kinds -----------------------------------------------------
    #[error("flow sample rate must be strictly positive")]
    FlowBadSampleRate,

    #[error("flow data and sigma tables are missing or too short")]
    FlowBadData,

    #[error("filter lower threshold must be below the upper threshold")]
    FilterThresholdInvalid,

    // -- queues ----------------------------------------------------------
    #[error("queue delay must be strictly positive")]
    QueueBadTa,

    #[error("queue dated-message storage exhausted")]
    QueueFull,

    #[error("dynamic queue has no bound delay source")]
    DynamicQueueSourceNull,

    #[error("dynamic queue dated-message storage exhausted")]
    DynamicQueueFull,

    #[error("priority queue has no bound delay source")]
    PriorityQueueSourceNull,

    #[error("priority queue dated-message storage exhausted")]
    PriorityQueueFull,

    #[error("generator has no bound source")]
    GeneratorSourceNull,

    #[error("generator source produced no sample")]
    GeneratorSourceEmpty,

    // -- external sources ------------------------------------------------
    #[error("source identifier does not resolve in the registry")]
    SourceUnknown,

    #[error("source is exhausted")]
    SourceEmpty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotEnoughMessage;
        assert_eq!(err.to_string(), "message arena exhausted");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::QueueFull, Error::QueueFull);
        assert_ne!(Error::QueueFull, Error::DynamicQueueFull);
    }

    #[test]
    fn test_result_propagation() {
        fn inner() -> SimResult<()> {
            Err(Error::SourceEmpty)
        }

        fn outer() -> SimResult<u32> {
            inner()?;
            Ok(1)
        }

        assert_eq!(outer(), Err(Error::SourceEmpty));
    }
}
