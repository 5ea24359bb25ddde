use std::time::Instant;

/// Logs the wall-clock time of a scope when dropped.
pub struct ProfileScope {
    label: String,
    start: Instant,
    bytes: Option<u64>,
}

impl ProfileScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
            bytes: None,
        }
    }

    /// Also report throughput for `bytes` processed within the scope.
    pub fn with_bytes(label: impl Into<String>, bytes: u64) -> Self {
        let mut scope = Self::new(label);
        scope.bytes = Some(bytes);
        scope
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        match self.bytes {
            Some(bytes) if elapsed_ms > 0.0 => log::debug!(
                "[PROFILE] {} - {:.3}ms ({:.1} MiB/s)",
                self.label,
                elapsed_ms,
                bytes as f64 / (1024.0 * 1024.0) / (elapsed_ms / 1000.0)
            ),
            _ => log::debug!("[PROFILE] {} - {:.3}ms", self.label, elapsed_ms),
        }
    }
}

/// Time the rest of the enclosing scope.
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _profile_scope = $crate::profiling::ProfileScope::new($label);
    };
    ($label:expr, bytes = $bytes:expr) => {
        let _profile_scope = $crate::profiling::ProfileScope::with_bytes($label, $bytes);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_with_bytes_keeps_label() {
        let scope = ProfileScope::with_bytes("decode", 4096);
        assert_eq!(scope.label, "decode");
        assert_eq!(scope.bytes, Some(4096));
        assert!(scope.elapsed_ms() >= 0.0);
    }

    #[test]
    fn test_macro_with_bytes_arm() {
        crate::profile_scope!("chunk", bytes = 16);
        crate::profile_scope!("plain");
    }
}
