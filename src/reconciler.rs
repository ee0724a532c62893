//! Removes gotify messages of alerts that resolved.

use std::sync::Arc;

use crate::{
    alert::Alert,
    gotify::{ApplicationId, MessageManager, SinkError},
    metrics::Metrics,
};

/// Deletes the messages created for an alert once the alert resolves.
///
/// Messages are matched by the fingerprint stored in their extras, see
/// [FINGERPRINT_KEY](crate::gotify::FINGERPRINT_KEY).
#[derive(Clone)]
pub struct Reconciler {
    manager: Arc<dyn MessageManager>,
    app_id: ApplicationId,
}

impl Reconciler {
    pub fn new(manager: Arc<dyn MessageManager>, app_id: ApplicationId) -> Self {
        Self { manager, app_id }
    }

    /// Deletes every message carrying the fingerprint of `alert` and returns
    /// the number of deleted messages.
    ///
    /// Failing to list the messages fails the whole call. Failed deletes are
    /// logged and skipped, the remaining matches are still deleted.
    pub async fn reconcile(&self, alert: &Alert) -> Result<usize, SinkError> {
        let metrics = Metrics::global();
        let fingerprint = alert.fingerprint.as_str();

        let messages = self.manager.list_messages(self.app_id).await?;

        let mut deleted = 0;
        for message in messages.iter().filter(|m| m.has_fingerprint(fingerprint)) {
            match self.manager.delete_message(message.id).await {
                Ok(()) => {
                    metrics.record_deleted();
                    deleted += 1;
                }
                Err(err) => {
                    metrics.record_delete_failed();
                    tracing::warn!(fingerprint, "failed to delete message {}: {}", message.id, err);
                }
            }
        }

        tracing::debug!(fingerprint, "deleted {} of {} messages", deleted, messages.len());

        Ok(deleted)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("app_id", &self.app_id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use async_trait::async_trait;
    use mockall::{predicate::eq, Sequence};
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::{
        alert::Status,
        gotify::{MockMessageManager, SinkMessage, FINGERPRINT_KEY},
    };

    const APP: ApplicationId = ApplicationId(7);

    fn message(id: u64, fingerprint: &str) -> SinkMessage {
        SinkMessage {
            id,
            extras: Some(HashMap::from([(FINGERPRINT_KEY.to_owned(), json!(fingerprint))])),
        }
    }

    fn resolved(fingerprint: &str) -> Alert {
        Alert {
            status: Status::Resolved,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            starts_at: None,
            fingerprint: fingerprint.to_owned(),
        }
    }

    /// gotify stand-in which actually forgets deleted messages
    #[derive(Default)]
    struct FakeGotify {
        messages: Mutex<Vec<SinkMessage>>,
        deleted: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl MessageManager for FakeGotify {
        async fn list_messages(&self, app_id: ApplicationId) -> Result<Vec<SinkMessage>, SinkError> {
            assert_eq!(app_id, APP);
            Ok(self.messages.lock().unwrap().clone())
        }

        async fn delete_message(&self, id: u64) -> Result<(), SinkError> {
            self.messages.lock().unwrap().retain(|m| m.id != id);
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn deletes_exactly_the_matching_messages() {
        let gotify = Arc::new(FakeGotify::default());
        *gotify.messages.lock().unwrap() = vec![
            message(5, "abc"),
            message(4, "def"),
            message(3, "abc"),
            SinkMessage { id: 2, extras: None },
        ];

        let reconciler = Reconciler::new(gotify.clone(), APP);
        assert_eq!(reconciler.reconcile(&resolved("abc")).await.unwrap(), 2);

        let deleted: HashSet<u64> = gotify.deleted.lock().unwrap().iter().copied().collect();
        assert_eq!(deleted, HashSet::from([5, 3]));

        let remaining: Vec<u64> = gotify.messages.lock().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(remaining, vec![4, 2]);
    }

    #[tokio::test]
    async fn reconciling_twice_is_a_noop() {
        let gotify = Arc::new(FakeGotify::default());
        *gotify.messages.lock().unwrap() = vec![message(1, "abc")];

        let reconciler = Reconciler::new(gotify.clone(), APP);
        assert_eq!(reconciler.reconcile(&resolved("abc")).await.unwrap(), 1);
        assert_eq!(reconciler.reconcile(&resolved("abc")).await.unwrap(), 0);
        assert_eq!(*gotify.deleted.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn listing_failure_fails_reconciliation() {
        let mut manager = MockMessageManager::new();
        manager.expect_list_messages().times(1).returning(|_| {
            Err(SinkError::Api { status: StatusCode::FORBIDDEN, message: "forbidden".to_owned() })
        });
        manager.expect_delete_message().never();

        let reconciler = Reconciler::new(Arc::new(manager), APP);
        assert!(reconciler.reconcile(&resolved("abc")).await.is_err());
    }

    #[tokio::test]
    async fn delete_failures_do_not_stop_other_deletes() {
        let mut seq = Sequence::new();
        let mut manager = MockMessageManager::new();
        manager
            .expect_list_messages()
            .with(eq(APP))
            .times(1)
            .returning(|_| Ok(vec![message(9, "abc"), message(8, "abc")]));
        manager
            .expect_delete_message()
            .with(eq(9))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(SinkError::Api { status: StatusCode::NOT_FOUND, message: "gone".to_owned() })
            });
        manager
            .expect_delete_message()
            .with(eq(8))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let reconciler = Reconciler::new(Arc::new(manager), APP);
        assert_eq!(reconciler.reconcile(&resolved("abc")).await.unwrap(), 1);
    }
}
