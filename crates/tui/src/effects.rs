use std::sync::Arc;

use kozani_core::auth::{AuthError, CredentialStore, DeviceFlow};
use kozani_core::connections::ConnectionStore;
use kozani_core::schema_tree::{fetch_schema, MetadataSource};
use kozani_core::{AppEvent, Effect};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// Collaborators the effect runner talks to.
#[derive(Clone)]
pub struct Services {
    pub connections: Arc<dyn ConnectionStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub device_flow: Arc<dyn DeviceFlow>,
    pub metadata: Arc<dyn MetadataSource>,
}

/// Executes effects off the UI thread and reports back as `AppEvent`s.
pub struct EffectRunner {
    handle: Handle,
    services: Services,
    events: UnboundedSender<AppEvent>,
}

impl EffectRunner {
    #[must_use]
    pub fn new(handle: Handle, services: Services, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            handle,
            services,
            events,
        }
    }

    pub fn run_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.run(effect);
        }
    }

    pub fn run(&self, effect: Effect) {
        tracing::debug!(?effect, "running effect");
        let events = self.events.clone();
        match effect {
            Effect::CheckAuthentication => {
                let credentials = Arc::clone(&self.services.credentials);
                self.handle.spawn_blocking(move || {
                    let authenticated = credentials.is_authenticated();
                    send(&events, AppEvent::AuthChecked { authenticated });
                });
            }
            Effect::BeginDeviceFlow => {
                let device_flow = Arc::clone(&self.services.device_flow);
                let handle = self.handle.clone();
                self.handle.spawn(async move {
                    let (flow_tx, mut flow_rx) = unbounded_channel();
                    let flow = handle.spawn(async move { device_flow.run(flow_tx).await });
                    while let Some(event) = flow_rx.recv().await {
                        send(&events, AppEvent::DeviceFlow(event));
                    }
                    if let Err(error) = flow.await {
                        tracing::error!(%error, "device flow task failed");
                    }
                });
            }
            Effect::FetchUser(session) => {
                let credentials = Arc::clone(&self.services.credentials);
                let device_flow = Arc::clone(&self.services.device_flow);
                self.handle.spawn(async move {
                    let stored = tokio::task::spawn_blocking(move || credentials.load()).await;
                    let result = match stored {
                        Ok(Ok(Some(credentials))) => device_flow.fetch_user(&credentials.token).await,
                        Ok(Ok(None)) => Err(AuthError::new("no stored credentials")),
                        Ok(Err(error)) => Err(AuthError::new(error.to_string())),
                        Err(error) => Err(AuthError::new(format!("credential task failed: {error}"))),
                    };
                    send(&events, AppEvent::UserLoaded { session, result });
                });
            }
            Effect::ReloadConnections(session) => {
                let store = Arc::clone(&self.services.connections);
                self.handle.spawn_blocking(move || {
                    let result = store.list();
                    send(&events, AppEvent::ConnectionsLoaded { session, result });
                });
            }
            Effect::CreateConnection { name, url } => {
                let store = Arc::clone(&self.services.connections);
                self.handle.spawn_blocking(move || {
                    send(&events, AppEvent::ConnectionCreated(store.create(&name, &url)));
                });
            }
            Effect::DeleteConnection { id } => {
                let store = Arc::clone(&self.services.connections);
                self.handle.spawn_blocking(move || {
                    let result = store.delete(&id).map(|()| id);
                    send(&events, AppEvent::ConnectionDeleted(result));
                });
            }
            Effect::LoadSchema(request) => {
                let metadata = Arc::clone(&self.services.metadata);
                self.handle.spawn(async move {
                    let result = fetch_schema(metadata.as_ref(), &request.target).await;
                    send(
                        &events,
                        AppEvent::SchemaLoaded {
                            generation: request.generation,
                            result,
                        },
                    );
                });
            }
            Effect::Logout => {
                let credentials = Arc::clone(&self.services.credentials);
                self.handle.spawn_blocking(move || {
                    send(&events, AppEvent::LoggedOut(credentials.clear()));
                });
            }
        }
    }
}

fn send(events: &UnboundedSender<AppEvent>, event: AppEvent) {
    if events.send(event).is_err() {
        tracing::debug!("event loop closed, dropping effect result");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use kozani_core::auth::{
        AuthError, CredentialError, CredentialStore, Credentials, DeviceFlow, DeviceFlowEvent,
        UserIdentity,
    };
    use kozani_core::connections::{Connection, ConnectionStore, StoreError};
    use kozani_core::schema_loader::SchemaLoader;
    use kozani_core::schema_tree::{
        ColumnRow, LoadTarget, MetadataLoadError, MetadataSource,
    };
    use kozani_core::{AppEvent, Effect, SessionEpoch};
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    use super::{EffectRunner, Services};

    #[derive(Default)]
    struct MemoryConnections {
        items: Mutex<Vec<Connection>>,
    }

    impl ConnectionStore for MemoryConnections {
        fn list(&self) -> Result<Vec<Connection>, StoreError> {
            Ok(self.items.lock().expect("lock").clone())
        }

        fn create(&self, name: &str, url: &str) -> Result<Connection, StoreError> {
            let connection = Connection::new(name, url);
            self.items.lock().expect("lock").push(connection.clone());
            Ok(connection)
        }

        fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.items.lock().expect("lock").retain(|c| c.id != id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryCredentials {
        stored: Mutex<Option<Credentials>>,
    }

    impl CredentialStore for MemoryCredentials {
        fn load(&self) -> Result<Option<Credentials>, CredentialError> {
            Ok(self.stored.lock().expect("lock").clone())
        }

        fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
            *self.stored.lock().expect("lock") = Some(credentials.clone());
            Ok(())
        }

        fn clear(&self) -> Result<(), CredentialError> {
            *self.stored.lock().expect("lock") = None;
            Ok(())
        }
    }

    struct ScriptedFlow;

    #[async_trait]
    impl DeviceFlow for ScriptedFlow {
        async fn run(&self, events: UnboundedSender<DeviceFlowEvent>) {
            let _ = events.send(DeviceFlowEvent::AwaitingVerification {
                code: "WDJB-MJHT".to_string(),
                url: "https://github.com/login/device".to_string(),
            });
            let _ = events.send(DeviceFlowEvent::Success {
                token: "gho_scripted".to_string(),
            });
        }

        async fn fetch_user(&self, token: &str) -> Result<UserIdentity, AuthError> {
            Ok(UserIdentity {
                login: format!("user-for-{token}"),
                name: None,
            })
        }
    }

    struct StaticMetadata;

    #[async_trait]
    impl MetadataSource for StaticMetadata {
        async fn fetch_catalogs(&self, _: &LoadTarget) -> Result<Vec<String>, MetadataLoadError> {
            Ok(vec!["public".to_string()])
        }

        async fn fetch_tables(
            &self,
            _: &LoadTarget,
        ) -> Result<Vec<(String, String)>, MetadataLoadError> {
            Ok(vec![("public".to_string(), "users".to_string())])
        }

        async fn fetch_columns(&self, _: &LoadTarget) -> Result<Vec<ColumnRow>, MetadataLoadError> {
            Ok(vec![ColumnRow::new("public", "users", "id", "uuid")])
        }
    }

    struct Harness {
        runner: EffectRunner,
        events: UnboundedReceiver<AppEvent>,
        credentials: Arc<MemoryCredentials>,
    }

    fn harness() -> Harness {
        let credentials = Arc::new(MemoryCredentials::default());
        let services = Services {
            connections: Arc::new(MemoryConnections::default()),
            credentials: Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            device_flow: Arc::new(ScriptedFlow),
            metadata: Arc::new(StaticMetadata),
        };
        let (tx, rx) = unbounded_channel();
        Harness {
            runner: EffectRunner::new(Handle::current(), services, tx),
            events: rx,
            credentials,
        }
    }

    async fn next_event(events: &mut UnboundedReceiver<AppEvent>) -> AppEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("effect should report back")
            .expect("channel should stay open")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_reload_reports_connections() {
        let mut harness = harness();
        harness.runner.run(Effect::CreateConnection {
            name: "local".to_string(),
            url: "postgresql://localhost/app".to_string(),
        });
        let AppEvent::ConnectionCreated(Ok(created)) = next_event(&mut harness.events).await else {
            panic!("expected a created connection");
        };

        let session = SessionEpoch::default();
        harness.runner.run(Effect::ReloadConnections(session));
        let AppEvent::ConnectionsLoaded {
            session: reported,
            result: Ok(listed),
        } = next_event(&mut harness.events).await
        else {
            panic!("expected a reload result");
        };
        assert_eq!(reported, session);
        assert_eq!(listed, vec![created.clone()]);

        harness.runner.run(Effect::DeleteConnection {
            id: created.id.clone(),
        });
        let AppEvent::ConnectionDeleted(Ok(id)) = next_event(&mut harness.events).await else {
            panic!("expected a delete result");
        };
        assert_eq!(id, created.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn device_flow_events_are_forwarded_in_order() {
        let mut harness = harness();
        harness.runner.run(Effect::BeginDeviceFlow);

        let first = next_event(&mut harness.events).await;
        assert!(matches!(
            first,
            AppEvent::DeviceFlow(DeviceFlowEvent::AwaitingVerification { .. })
        ));
        let second = next_event(&mut harness.events).await;
        assert!(matches!(
            second,
            AppEvent::DeviceFlow(DeviceFlowEvent::Success { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auth_check_and_user_fetch_use_stored_token() {
        let mut harness = harness();
        harness.runner.run(Effect::CheckAuthentication);
        assert!(matches!(
            next_event(&mut harness.events).await,
            AppEvent::AuthChecked {
                authenticated: false
            }
        ));

        harness
            .credentials
            .save(&Credentials {
                token: "gho_1".to_string(),
                token_type: "bearer".to_string(),
            })
            .expect("save should succeed");
        harness.runner.run(Effect::FetchUser(SessionEpoch::default()));
        let AppEvent::UserLoaded { result: Ok(user), .. } = next_event(&mut harness.events).await
        else {
            panic!("expected a user identity");
        };
        assert_eq!(user.login, "user-for-gho_1");

        harness.runner.run(Effect::Logout);
        assert!(matches!(
            next_event(&mut harness.events).await,
            AppEvent::LoggedOut(Ok(()))
        ));
        assert!(!harness.credentials.is_authenticated());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn schema_load_reports_its_generation() {
        let mut harness = harness();
        let mut loader = SchemaLoader::new();
        let request = loader.start(LoadTarget::new("c1", "postgresql://localhost/app"));
        harness.runner.run(Effect::LoadSchema(request.clone()));

        let AppEvent::SchemaLoaded { generation, result } = next_event(&mut harness.events).await
        else {
            panic!("expected a schema result");
        };
        assert_eq!(generation, request.generation);
        let tree = result.expect("static metadata should load");
        assert_eq!(tree.catalogs.len(), 1);
        assert!(loader.apply(generation, Ok(tree)));
    }
}
