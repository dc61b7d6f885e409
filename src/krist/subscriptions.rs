use crate::core::{errors::KristError, types::SubscriptionLevel};
use async_trait::async_trait;
use futures_util::future::{try_join, try_join_all};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// The requests subscription sync needs from a live connection
#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    /// The subscription names the server currently holds for this connection
    async fn subscription_level(&self) -> Result<Vec<String>, KristError>;

    async fn subscribe(&self, level: &str) -> Result<(), KristError>;

    async fn unsubscribe(&self, level: &str) -> Result<(), KristError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_add: Vec<SubscriptionLevel>,
    /// Server-reported names, which may include levels this client does not know
    pub to_remove: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Reconciles the server-side subscription set with the desired one
#[derive(Debug, Clone)]
pub struct SubscriptionSynchronizer {
    desired: BTreeSet<SubscriptionLevel>,
}

impl SubscriptionSynchronizer {
    pub fn new(desired: BTreeSet<SubscriptionLevel>) -> Self {
        Self { desired }
    }

    pub fn desired(&self) -> &BTreeSet<SubscriptionLevel> {
        &self.desired
    }

    pub fn plan(&self, actual: &[String]) -> SyncPlan {
        let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
        let wanted: BTreeSet<&str> = self.desired.iter().map(SubscriptionLevel::as_str).collect();

        SyncPlan {
            to_add: self
                .desired
                .iter()
                .filter(|level| !actual.contains(level.as_str()))
                .copied()
                .collect(),
            to_remove: actual
                .difference(&wanted)
                .map(|name| (*name).to_string())
                .collect(),
        }
    }

    /// Fetch the actual set and issue every removal and addition concurrently
    #[instrument(skip(self, api))]
    pub async fn synchronize<A: SubscriptionApi + ?Sized>(
        &self,
        api: &A,
    ) -> Result<SyncPlan, KristError> {
        let actual = api.subscription_level().await?;
        let plan = self.plan(&actual);
        if plan.is_empty() {
            debug!("subscriptions already in sync");
            return Ok(plan);
        }

        debug!(add = ?plan.to_add, remove = ?plan.to_remove, "synchronizing subscriptions");
        let removals = try_join_all(plan.to_remove.iter().map(|name| api.unsubscribe(name)));
        let additions = try_join_all(plan.to_add.iter().map(|level| api.subscribe(level.as_str())));
        try_join(removals, additions).await?;

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeServer {
        levels: Mutex<BTreeSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeServer {
        fn with(levels: &[&str]) -> Self {
            Self {
                levels: Mutex::new(levels.iter().map(|s| (*s).to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn mutations(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| !c.starts_with("get"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl SubscriptionApi for FakeServer {
        async fn subscription_level(&self) -> Result<Vec<String>, KristError> {
            self.calls.lock().unwrap().push("get".to_string());
            Ok(self.levels.lock().unwrap().iter().cloned().collect())
        }

        async fn subscribe(&self, level: &str) -> Result<(), KristError> {
            self.calls.lock().unwrap().push(format!("+{}", level));
            self.levels.lock().unwrap().insert(level.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, level: &str) -> Result<(), KristError> {
            self.calls.lock().unwrap().push(format!("-{}", level));
            self.levels.lock().unwrap().remove(level);
            Ok(())
        }
    }

    fn desired(levels: &[SubscriptionLevel]) -> SubscriptionSynchronizer {
        SubscriptionSynchronizer::new(levels.iter().copied().collect())
    }

    #[test]
    fn test_plan_differences() {
        let sync = desired(&[SubscriptionLevel::Blocks, SubscriptionLevel::OwnTransactions]);
        let plan = sync.plan(&["blocks".to_string(), "motd".to_string()]);
        assert_eq!(plan.to_add, vec![SubscriptionLevel::OwnTransactions]);
        assert_eq!(plan.to_remove, vec!["motd".to_string()]);
    }

    #[tokio::test]
    async fn test_synchronize_converges_and_is_idempotent() {
        let server = FakeServer::with(&["blocks", "motd", "names"]);
        let sync = desired(&[SubscriptionLevel::Blocks, SubscriptionLevel::OwnTransactions]);

        let plan = sync.synchronize(&server).await.unwrap();
        assert_eq!(plan.to_add.len(), 1);
        assert_eq!(plan.to_remove.len(), 2);

        let levels: Vec<String> = server.levels.lock().unwrap().iter().cloned().collect();
        assert_eq!(levels, vec!["blocks".to_string(), "ownTransactions".to_string()]);

        let before = server.mutations().len();
        let second = sync.synchronize(&server).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(server.mutations().len(), before);
    }

    #[tokio::test]
    async fn test_empty_desired_set_removes_everything() {
        let server = FakeServer::with(&["blocks", "ownTransactions"]);
        let sync = desired(&[]);
        sync.synchronize(&server).await.unwrap();
        assert!(server.levels.lock().unwrap().is_empty());
    }
}
