//! Server-side backing store.
//!
//! A [`BackingStore`] is a plain file pre-sized to the capacity the server advertises.
//! Sector `n` lives at byte offset `n * 512`. All access is positioned (no shared seek
//! cursor), so any number of connection handlers may use one store through a shared
//! reference at the same time.
//!
//! No locking is done across handlers: two clients writing overlapping ranges race at
//! the file level and the last write to land wins.
mod backing;

pub use backing::BackingStore;
pub use error::StorageError;

pub mod error {
    use std::io;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum StorageError {
        #[error("[storage io][{action}]: {source}")]
        Io {
            action: &'static str,
            #[source]
            source: io::Error,
        },

        #[error(
            "[bounds] sector {sector} with length {length} exceeds capacity of {capacity} bytes"
        )]
        OutOfBounds {
            sector: u64,
            length: u32,
            capacity: u64,
        },
    }

    impl StorageError {
        pub(crate) fn io(action: &'static str) -> impl FnOnce(io::Error) -> Self {
            move |source| StorageError::Io { action, source }
        }
    }
}
