use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Snapshot of a device's I/O counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub errors: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "read_bytes:  {}", self.read_bytes)?;
        writeln!(f, "write_bytes: {}", self.write_bytes)?;
        writeln!(f, "errors:      {}", self.errors)
    }
}

/// Monotonic counters behind [`Stats`].
#[derive(Debug, Default)]
pub(crate) struct Counters {
    read_bytes: AtomicU64,
    write_bytes: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn record_read(&self, bytes: u32) {
        self.read_bytes
            .fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: u32) {
        self.write_bytes
            .fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
            write_bytes: self.write_bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = Counters::default();
        counters.record_read(512);
        counters.record_read(1024);
        counters.record_write(4096);
        counters.record_error();

        assert_eq!(
            counters.snapshot(),
            Stats {
                read_bytes: 1536,
                write_bytes: 4096,
                errors: 1
            }
        );
    }

    #[test]
    fn stats_display() {
        let stats = Stats {
            read_bytes: 512,
            write_bytes: 0,
            errors: 2,
        };

        assert_eq!(
            stats.to_string(),
            "read_bytes:  512\nwrite_bytes: 0\nerrors:      2\n"
        );
    }
}
