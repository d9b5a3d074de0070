//! Transaction configuration
//!
//! The only tunables that affect the protocol: write durability, the
//! wall-clock expiry for a whole transaction (all attempts included), and an
//! optional cap on parallel in-flight attempts. Everything is injected into
//! the coordinator at construction; there is no process-wide state.

use std::time::Duration;

use acidkv_core::DurabilityLevel;

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionConfig {
    /// Durability level for every store write the engine issues, including
    /// the transaction record itself.
    pub durability: DurabilityLevel,
    /// Wall-clock budget for a transaction across all its retry attempts.
    /// Also becomes the store-resident expiry after which the cleanup worker
    /// may take over an abandoned record.
    pub timeout: Duration,
    /// Maximum number of attempts running at once across all threads using
    /// this coordinator. `None` means unbounded.
    pub max_in_flight: Option<usize>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            durability: DurabilityLevel::default(),
            timeout: Duration::from_secs(15),
            max_in_flight: None,
        }
    }
}

impl TransactionConfig {
    /// Default configuration: `Majority` durability, 15 second expiry,
    /// unbounded parallelism.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the durability level. `DurabilityLevel::None` is only safe on a
    /// single node.
    pub fn with_durability(mut self, durability: DurabilityLevel) -> Self {
        self.durability = durability;
        self
    }

    /// Set the transaction expiry.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap the number of concurrently running attempts.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransactionConfig::new();
        assert_eq!(config.durability, DurabilityLevel::Majority);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.max_in_flight, None);
    }

    #[test]
    fn builder_chain() {
        let config = TransactionConfig::new()
            .with_durability(DurabilityLevel::None)
            .with_timeout(Duration::from_millis(500))
            .with_max_in_flight(4);
        assert_eq!(config.durability, DurabilityLevel::None);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.max_in_flight, Some(4));
    }
}
