// Cycle ID Port
// Every poll cycle carries an id so its log lines can be correlated

pub trait IdProvider: Send + Sync {
    /// Id for a new poll cycle
    fn generate_id(&self) -> String;
}

/// Random UUID v4 ids
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic `cycle-1`, `cycle-2`, ... ids
    #[derive(Default)]
    pub struct SequentialIdProvider {
        next: AtomicU64,
    }

    impl SequentialIdProvider {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl IdProvider for SequentialIdProvider {
        fn generate_id(&self) -> String {
            format!("cycle-{}", self.next.fetch_add(1, Ordering::Relaxed) + 1)
        }
    }
}
