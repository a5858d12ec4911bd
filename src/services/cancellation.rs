//! Cooperative cancellation

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag checked between pipeline stages
///
/// Clones share the same flag. Cancelling after the last check point has no
/// effect on the running job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` when the flag is set
    ///
    /// # Errors
    /// `BgRemovalError::Cancelled` naming `stage`.
    pub fn check(&self, stage: &'static str) -> crate::Result<()> {
        if self.is_cancelled() {
            log::debug!("Cancellation observed before stage {stage}");
            return Err(crate::BgRemovalError::Cancelled { stage });
        }
        Ok(())
    }
}

impl PartialEq for CancellationToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check("decode").is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        let err = token.check("fusion").unwrap_err();
        assert_eq!(err.stage_name(), Some("fusion"));
    }

    #[test]
    fn test_independent_tokens_differ() {
        assert_ne!(CancellationToken::new(), CancellationToken::new());
        let token = CancellationToken::new();
        assert_eq!(token, token.clone());
    }
}
