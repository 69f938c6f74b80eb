//! Main synchronization client with builder pattern.
//!
//! Wires the realtime client, the snapshot backend and the shared
//! connection status together and hands out subscriptions.

use std::sync::Arc;

use crate::{
    auth::AuthProvider,
    connection::ConnectionStatusAggregator,
    error::{Result, SyncError},
    models::{SubscriptionOptions, SyncOptions},
    query::RestQueryBackend,
    realtime::RealtimeClient,
    snapshot::{QueryBackend, SnapshotLoader},
    subscription::{CollectionSubscription, RecordSubscription},
};

/// Entry point for keeping local read models in sync.
///
/// Use [`SyncClientBuilder`] to construct instances. Cloning is cheap and
/// clones share the same connection status.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use stallplass_link::{AuthProvider, RealtimeClient, SyncClient, SyncOptions};
///
/// # fn example(realtime: Arc<dyn RealtimeClient>) -> stallplass_link::Result<()> {
/// let client = SyncClient::builder()
///     .realtime(realtime)
///     .rest_backend("https://project.example.co", AuthProvider::api_key("anon-key"))
///     .options(SyncOptions::default().with_max_retries(5))
///     .build()?;
///
/// client.connect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SyncClient {
    realtime: Arc<dyn RealtimeClient>,
    loader: SnapshotLoader,
    status: Arc<ConnectionStatusAggregator>,
    options: SyncOptions,
}

impl SyncClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> SyncClientBuilder {
        SyncClientBuilder::new()
    }

    /// Keep every row of `table` (narrowed by the options' filter) in sync.
    ///
    /// Fails with [`SyncError::CompileError`] on a malformed filter. All
    /// later failures show up in the view instead.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use stallplass_link::{SubscriptionOptions, SyncClient};
    /// # async fn example(client: SyncClient) -> stallplass_link::Result<()> {
    /// let boxes = client.subscribe_collection(
    ///     "boxes",
    ///     SubscriptionOptions::new().with_filter("stable_id=eq.s1"),
    /// )?;
    /// for row in boxes.view().data {
    ///     println!("{:?}", row.get("name"));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe_collection(
        &self,
        table: &str,
        options: SubscriptionOptions,
    ) -> Result<CollectionSubscription> {
        log::debug!(
            "[SYNC_SUBSCRIPTION] Subscribing to '{}' filter={:?}",
            table,
            options.filter
        );
        CollectionSubscription::open(
            Arc::clone(&self.realtime),
            self.loader.clone(),
            &self.options,
            table,
            options,
        )
    }

    /// Keep the row of `table` with identifier `id` in sync.
    ///
    /// With `None` the subscription starts idle; call
    /// [`RecordSubscription::set_id`] once the identifier is known.
    pub fn subscribe_record(&self, table: &str, id: Option<&str>) -> Result<RecordSubscription> {
        log::debug!("[SYNC_SUBSCRIPTION] Subscribing to '{}' id={:?}", table, id);
        RecordSubscription::open(
            Arc::clone(&self.realtime),
            self.loader.clone(),
            &self.options,
            table,
            id,
        )
    }

    /// Shared connection health
    pub fn connection_status(&self) -> &Arc<ConnectionStatusAggregator> {
        &self.status
    }

    pub fn snapshot_loader(&self) -> &SnapshotLoader {
        &self.loader
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Open the realtime socket
    pub fn connect(&self) {
        self.realtime.connect();
    }

    /// Close the realtime socket. Subscriptions stay registered with the
    /// realtime client and rejoin on the next connect.
    pub fn disconnect(&self) {
        self.realtime.disconnect();
    }
}

/// Builder for configuring [`SyncClient`] instances.
#[derive(Default)]
pub struct SyncClientBuilder {
    realtime: Option<Arc<dyn RealtimeClient>>,
    backend: Option<Arc<dyn QueryBackend>>,
    rest: Option<(String, AuthProvider)>,
    options: SyncOptions,
}

impl SyncClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Set the realtime client delivering change notifications
    pub fn realtime(mut self, realtime: Arc<dyn RealtimeClient>) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// Set the backend used for snapshot reads
    pub fn query_backend(mut self, backend: Arc<dyn QueryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Read snapshots from the REST endpoint at `base_url`
    ///
    /// Ignored if [`query_backend`](Self::query_backend) is also set.
    pub fn rest_backend(mut self, base_url: impl Into<String>, auth: AuthProvider) -> Self {
        self.rest = Some((base_url.into(), auth));
        self
    }

    /// Set retry, timeout and channel options
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the client
    ///
    /// Must be called inside a Tokio runtime for reconnect timers to run.
    pub fn build(self) -> Result<SyncClient> {
        let realtime = self.realtime.ok_or_else(|| {
            SyncError::ConfigurationError("a realtime client is required".into())
        })?;

        let backend: Arc<dyn QueryBackend> = match (self.backend, self.rest) {
            (Some(backend), _) => backend,
            (None, Some((base_url, auth))) => Arc::new(RestQueryBackend::new(base_url, auth)?),
            (None, None) => {
                return Err(SyncError::ConfigurationError(
                    "a query backend or REST endpoint is required".into(),
                ))
            }
        };

        let status = ConnectionStatusAggregator::new(Arc::clone(&realtime), self.options.clone());

        Ok(SyncClient {
            realtime,
            loader: SnapshotLoader::new(backend),
            status,
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{
        ChangeCallback, ChangeSpec, LifecycleCallback, LifecycleErrorCallback, RealtimeChannel,
        StatusCallback,
    };

    struct NullChannel;

    impl RealtimeChannel for NullChannel {
        fn on(&self, _spec: ChangeSpec, _callback: ChangeCallback) {}
        fn subscribe(&self, _callback: StatusCallback) {}
        fn unsubscribe(&self) {}
    }

    struct NullRealtime;

    impl RealtimeClient for NullRealtime {
        fn channel(&self, _name: &str) -> Arc<dyn RealtimeChannel> {
            Arc::new(NullChannel)
        }
        fn on_open(&self, _callback: LifecycleCallback) {}
        fn on_close(&self, _callback: LifecycleCallback) {}
        fn on_error(&self, _callback: LifecycleErrorCallback) {}
        fn connect(&self) {}
        fn disconnect(&self) {}
    }

    #[test]
    fn test_build_requires_realtime() {
        let err = SyncClient::builder()
            .rest_backend("http://localhost:54321", AuthProvider::none())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::ConfigurationError(_)));
    }

    #[test]
    fn test_build_requires_backend() {
        let err = SyncClient::builder()
            .realtime(Arc::new(NullRealtime))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn test_build_with_rest_backend() {
        let client = SyncClient::builder()
            .realtime(Arc::new(NullRealtime))
            .rest_backend("http://localhost:54321", AuthProvider::api_key("anon"))
            .options(SyncOptions::default().with_schema("stall"))
            .build()
            .unwrap();

        assert_eq!(client.options().schema, "stall");
        assert!(client.connection_status().status().connecting);
    }

    #[tokio::test]
    async fn test_malformed_filter_is_rejected() {
        let client = SyncClient::builder()
            .realtime(Arc::new(NullRealtime))
            .rest_backend("http://localhost:54321", AuthProvider::none())
            .build()
            .unwrap();

        let err = client
            .subscribe_collection("boxes", SubscriptionOptions::new().with_filter("stable_id"))
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::CompileError(_)));
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let client = SyncClient::builder()
            .realtime(Arc::new(NullRealtime))
            .rest_backend("http://localhost:54321", AuthProvider::none())
            .build()
            .unwrap();

        let err = client.subscribe_record("stalls", Some("s1")).err().unwrap();
        assert!(matches!(err, SyncError::ConfigurationError(_)));
    }
}
