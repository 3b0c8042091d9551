//! File to contain the bus's error types and the last-error slot

use std::cell::Cell;
use thiserror::Error;

/// Error for a bus operation that could not complete
///
/// Blocking operations only ever fail with [`NoChannel`](BusError::NoChannel):
/// instead of failing with `WouldBlock` they park the calling coroutine and
/// retry once woken. The non-blocking `try_*` variants surface
/// [`WouldBlock`](BusError::WouldBlock) directly.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum BusError {
    /// The descriptor does not name an open channel
    ///
    /// Either it was never opened, or it was closed (possibly while the
    /// calling coroutine was parked on it).
    #[error("descriptor does not name an open channel")]
    NoChannel,
    /// The operation cannot make progress without suspending
    #[error("operation would block")]
    WouldBlock,
}

/// Classification of the most recent bus operation's outcome
///
/// Every operation records its outcome in a process-wide slot as its last
/// action: [`ErrorKind::None`] on success, the matching failure kind
/// otherwise. Read it with [`last_error`] immediately after a failed call,
/// before anything else touches the bus. While a blocking operation is
/// parked, the slot transiently holds [`ErrorKind::WouldBlock`]; it is
/// overwritten when the operation completes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum ErrorKind {
    /// The last operation succeeded
    #[default]
    None,
    /// See [`BusError::NoChannel`]
    NoChannel,
    /// See [`BusError::WouldBlock`]
    WouldBlock,
}

impl From<BusError> for ErrorKind {
    fn from(err: BusError) -> Self {
        match err {
            BusError::NoChannel => ErrorKind::NoChannel,
            BusError::WouldBlock => ErrorKind::WouldBlock,
        }
    }
}

// one slot suffices: the bus is single-threaded by contract. thread-local
// rather than static so the uncontracted multi-thread case stays sound.
thread_local! {
    static LAST_ERROR: Cell<ErrorKind> = const { Cell::new(ErrorKind::None) };
}

/// Read the outcome classification of the most recent bus operation.
pub fn last_error() -> ErrorKind {
    LAST_ERROR.with(|slot| slot.get())
}

/// Overwrite the last-error slot.
pub fn set_last_error(kind: ErrorKind) {
    LAST_ERROR.with(|slot| slot.set(kind));
}

// record a failure in the slot and hand the error back for the Result path.
pub(crate) fn fail(err: BusError) -> BusError {
    set_last_error(err.into());
    err
}
