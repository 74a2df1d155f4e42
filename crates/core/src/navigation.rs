use thiserror::Error;

use crate::auth::{AuthError, CredentialError, DeviceFlowEvent, UserIdentity};
use crate::browser::SchemaBrowserSession;
use crate::connections::{Connection, StoreError};
use crate::cursor::Cursor;
use crate::forms::{AddConnectionForm, FormOutcome};
use crate::keymap::{Action, Dispatch, KeyDispatcher, KeyInput, Layer};
use crate::schema_loader::{LoadGeneration, LoadRequest, SchemaLoader};
use crate::schema_tree::{MetadataLoadError, SchemaTree};
use crate::tree_view::VisibleRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Auth,
    ConnectionList,
    AddConnectionForm,
    ConnectionDetail,
    SchemaBrowser,
}

impl Screen {
    #[must_use]
    pub fn layers(self) -> &'static [Layer] {
        match self {
            Self::Auth => &[Layer::Auth],
            Self::ConnectionList => &[Layer::ConnectionList],
            Self::AddConnectionForm => &[Layer::AddConnectionForm],
            Self::ConnectionDetail => &[Layer::ConnectionDetail],
            Self::SchemaBrowser => &[Layer::ConnectionDetail, Layer::SchemaBrowser],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub code: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Checking,
    Idle,
    Waiting { verification: Option<Verification> },
    Failed { message: String },
}

/// Identifies one signed-in stretch between logins and logouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionEpoch(u64);

impl SessionEpoch {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Work the controller asks the runtime to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CheckAuthentication,
    BeginDeviceFlow,
    FetchUser(SessionEpoch),
    ReloadConnections(SessionEpoch),
    CreateConnection { name: String, url: String },
    DeleteConnection { id: String },
    LoadSchema(LoadRequest),
    Logout,
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyInput),
    AuthChecked { authenticated: bool },
    DeviceFlow(DeviceFlowEvent),
    UserLoaded {
        session: SessionEpoch,
        result: Result<UserIdentity, AuthError>,
    },
    ConnectionsLoaded {
        session: SessionEpoch,
        result: Result<Vec<Connection>, StoreError>,
    },
    ConnectionCreated(Result<Connection, StoreError>),
    ConnectionDeleted(Result<String, StoreError>),
    LoggedOut(Result<(), CredentialError>),
    SchemaLoaded {
        generation: LoadGeneration,
        result: Result<SchemaTree, MetadataLoadError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection `{id}` is not in the current list")]
pub struct InvalidSelection {
    pub id: String,
}

/// What the render layer needs to draw the focused screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot<'a> {
    pub screen: Screen,
    pub rows: &'a [VisibleRow],
    pub selected_index: usize,
    pub loading: bool,
    pub error: Option<&'a str>,
}

#[derive(Debug)]
pub struct App {
    screen: Screen,
    pending: Option<Screen>,
    session: SessionEpoch,
    auth: AuthState,
    user: Option<UserIdentity>,
    connections: Vec<Connection>,
    list_cursor: Cursor,
    list_error: Option<String>,
    reloading: bool,
    form: Option<AddConnectionForm>,
    detail: Option<Connection>,
    browser: Option<SchemaBrowserSession>,
    loader: SchemaLoader,
    dispatcher: KeyDispatcher,
    should_quit: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    #[must_use]
    pub fn new() -> Self {
        Self {
            screen: Screen::Auth,
            pending: None,
            session: SessionEpoch::default(),
            auth: AuthState::Checking,
            user: None,
            connections: Vec::new(),
            list_cursor: Cursor::new(),
            list_error: None,
            reloading: false,
            form: None,
            detail: None,
            browser: None,
            loader: SchemaLoader::new(),
            dispatcher: KeyDispatcher::new(),
            should_quit: false,
        }
    }

    /// Effects to run once at startup.
    #[must_use]
    pub fn boot(&self) -> Vec<Effect> {
        vec![Effect::CheckAuthentication]
    }

    #[must_use]
    pub fn screen(&self) -> Screen {
        self.screen
    }

    #[must_use]
    pub fn layers(&self) -> &'static [Layer] {
        self.screen.layers()
    }

    #[must_use]
    pub fn session(&self) -> SessionEpoch {
        self.session
    }

    #[must_use]
    pub fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    #[must_use]
    pub fn selected_connection(&self) -> Option<&Connection> {
        self.list_cursor
            .selection(self.connections.len())
            .and_then(|index| self.connections.get(index))
    }

    #[must_use]
    pub fn form(&self) -> Option<&AddConnectionForm> {
        self.form.as_ref()
    }

    #[must_use]
    pub fn detail(&self) -> Option<&Connection> {
        self.detail.as_ref()
    }

    #[must_use]
    pub fn browser(&self) -> Option<&SchemaBrowserSession> {
        self.browser.as_ref()
    }

    #[must_use]
    pub fn loader(&self) -> &SchemaLoader {
        &self.loader
    }

    #[must_use]
    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    #[must_use]
    pub fn hints(&self) -> Vec<&'static str> {
        self.layers()
            .last()
            .map(|layer| self.dispatcher.hints(*layer))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'_> {
        match self.screen {
            Screen::Auth => Snapshot {
                screen: self.screen,
                rows: &[],
                selected_index: 0,
                loading: self.reloading || matches!(self.auth, AuthState::Checking),
                error: match &self.auth {
                    AuthState::Failed { message } => Some(message.as_str()),
                    _ => None,
                },
            },
            Screen::ConnectionList | Screen::ConnectionDetail => Snapshot {
                screen: self.screen,
                rows: &[],
                selected_index: self.list_cursor.index(),
                loading: self.reloading,
                error: self.list_error.as_deref(),
            },
            Screen::AddConnectionForm => Snapshot {
                screen: self.screen,
                rows: &[],
                selected_index: 0,
                loading: self.form.as_ref().is_some_and(AddConnectionForm::is_saving),
                error: self.form.as_ref().and_then(AddConnectionForm::error),
            },
            Screen::SchemaBrowser => Snapshot {
                screen: self.screen,
                rows: self
                    .browser
                    .as_ref()
                    .map(SchemaBrowserSession::rows)
                    .unwrap_or_default(),
                selected_index: self
                    .browser
                    .as_ref()
                    .map_or(0, SchemaBrowserSession::selected_index),
                loading: self.loader.is_loading(),
                error: self.loader.error(),
            },
        }
    }

    pub fn handle(&mut self, event: AppEvent) -> Vec<Effect> {
        match event {
            AppEvent::Key(input) => self.handle_key(&input),
            AppEvent::AuthChecked { authenticated } => self.on_auth_checked(authenticated),
            AppEvent::DeviceFlow(event) => self.on_device_flow(event),
            AppEvent::UserLoaded { session, result } => {
                if session != self.session {
                    tracing::debug!("dropping user identity from a closed session");
                    return Vec::new();
                }
                match result {
                    Ok(user) => {
                        tracing::info!(login = %user.login, "loaded user identity");
                        self.user = Some(user);
                    }
                    Err(error) => tracing::warn!(%error, "failed to load user identity"),
                }
                Vec::new()
            }
            AppEvent::ConnectionsLoaded { session, result } => {
                if session != self.session {
                    tracing::debug!("dropping connection list from a closed session");
                    return Vec::new();
                }
                self.on_connections_loaded(result)
            }
            AppEvent::ConnectionCreated(_) | AppEvent::ConnectionDeleted(_)
                if self.screen == Screen::Auth =>
            {
                tracing::debug!("dropping store result that arrived after logout");
                Vec::new()
            }
            AppEvent::ConnectionCreated(result) => self.on_connection_created(result),
            AppEvent::ConnectionDeleted(result) => match result {
                Ok(id) => {
                    tracing::info!(%id, "connection deleted");
                    self.reload()
                }
                Err(error) => {
                    tracing::error!(%error, "failed to delete connection");
                    self.list_error = Some(error.to_string());
                    Vec::new()
                }
            },
            AppEvent::LoggedOut(result) => {
                if let Err(error) = result {
                    tracing::error!(%error, "failed to clear credentials");
                    self.auth = AuthState::Failed {
                        message: format!("Logout failed: {error}"),
                    };
                }
                Vec::new()
            }
            AppEvent::SchemaLoaded { generation, result } => {
                if self.loader.apply(generation, result) {
                    if let Some(session) = self.browser.as_mut() {
                        session.set_tree(self.loader.tree().cloned());
                    }
                }
                Vec::new()
            }
        }
    }

    /// Opens the detail screen for `id` if it is still in the loaded list.
    pub fn open_connection(&mut self, id: &str) -> Result<Vec<Effect>, InvalidSelection> {
        let connection = self
            .connections
            .iter()
            .find(|connection| connection.id == id)
            .cloned()
            .ok_or_else(|| InvalidSelection { id: id.to_string() })?;
        self.detail = Some(connection);
        Ok(self.enter(Screen::ConnectionDetail))
    }

    fn handle_key(&mut self, input: &KeyInput) -> Vec<Effect> {
        match self.dispatcher.dispatch(self.layers(), input) {
            Dispatch::Action(action) => self.apply_action(action),
            Dispatch::Consumed | Dispatch::Ignored => Vec::new(),
        }
    }

    fn apply_action(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Quit => {
                tracing::info!("quit requested");
                self.should_quit = true;
                Vec::new()
            }
            Action::SubmitAuth => self.submit_auth(),
            Action::MoveUp => self.move_selection(-1),
            Action::MoveDown => self.move_selection(1),
            Action::MoveFirst => {
                match self.screen {
                    Screen::SchemaBrowser => {
                        if let Some(session) = self.browser.as_mut() {
                            session.move_to_first();
                        }
                    }
                    _ => self.list_cursor.move_to_first(),
                }
                Vec::new()
            }
            Action::MoveLast => {
                match self.screen {
                    Screen::SchemaBrowser => {
                        if let Some(session) = self.browser.as_mut() {
                            session.move_to_last();
                        }
                    }
                    _ => self.list_cursor.move_to_last(self.connections.len()),
                }
                Vec::new()
            }
            Action::OpenSelected => {
                let Some(id) = self.selected_connection().map(|c| c.id.clone()) else {
                    return Vec::new();
                };
                self.open_connection(&id).unwrap_or_else(|error| {
                    tracing::debug!(%error, "ignoring stale selection");
                    Vec::new()
                })
            }
            Action::AddConnection => self.enter(Screen::AddConnectionForm),
            Action::DeleteSelected => match self.selected_connection() {
                Some(connection) => vec![Effect::DeleteConnection {
                    id: connection.id.clone(),
                }],
                None => Vec::new(),
            },
            Action::Logout => self.logout(),
            Action::FormInput(ch) => {
                if let Some(form) = self.form.as_mut() {
                    form.push_char(ch);
                }
                Vec::new()
            }
            Action::FormBackspace => {
                if let Some(form) = self.form.as_mut() {
                    form.backspace();
                }
                Vec::new()
            }
            Action::FormSubmit => match self.form.as_mut().map(AddConnectionForm::submit) {
                Some(FormOutcome::Submit { name, url }) => {
                    vec![Effect::CreateConnection { name, url }]
                }
                Some(FormOutcome::Pending) | None => Vec::new(),
            },
            Action::FormCancel => {
                if self.form.as_ref().is_some_and(AddConnectionForm::is_saving) {
                    return Vec::new();
                }
                self.enter(Screen::ConnectionList)
            }
            Action::Back => self.enter(Screen::ConnectionList),
            Action::BrowseSchema => self.enter(Screen::SchemaBrowser),
            Action::ToggleRow => {
                if let Some(session) = self.browser.as_mut() {
                    session.toggle_selected();
                }
                Vec::new()
            }
            Action::RetryLoad => self.retry_load(),
            Action::CloseBrowser => self.enter(Screen::ConnectionDetail),
        }
    }

    fn move_selection(&mut self, delta: isize) -> Vec<Effect> {
        match self.screen {
            Screen::SchemaBrowser => {
                if let Some(session) = self.browser.as_mut() {
                    session.move_by(delta);
                }
            }
            _ => self.list_cursor.move_by(delta, self.connections.len()),
        }
        Vec::new()
    }

    fn submit_auth(&mut self) -> Vec<Effect> {
        match self.auth {
            AuthState::Idle => {
                tracing::info!("starting device flow login");
                self.auth = AuthState::Waiting { verification: None };
                vec![Effect::BeginDeviceFlow]
            }
            AuthState::Failed { .. } => {
                self.auth = AuthState::Idle;
                Vec::new()
            }
            AuthState::Checking | AuthState::Waiting { .. } => Vec::new(),
        }
    }

    fn on_auth_checked(&mut self, authenticated: bool) -> Vec<Effect> {
        if !matches!(self.auth, AuthState::Checking) {
            return Vec::new();
        }
        if authenticated {
            tracing::info!("stored credentials found");
            self.authenticated()
        } else {
            self.auth = AuthState::Idle;
            Vec::new()
        }
    }

    fn on_device_flow(&mut self, event: DeviceFlowEvent) -> Vec<Effect> {
        if self.screen != Screen::Auth || !matches!(self.auth, AuthState::Waiting { .. }) {
            tracing::debug!("ignoring device flow event outside of login");
            return Vec::new();
        }
        match event {
            DeviceFlowEvent::AwaitingVerification { code, url } => {
                self.auth = AuthState::Waiting {
                    verification: Some(Verification { code, url }),
                };
                Vec::new()
            }
            DeviceFlowEvent::Success { .. } => {
                tracing::info!("device flow login succeeded");
                self.authenticated()
            }
            DeviceFlowEvent::Failure { error } => {
                tracing::warn!(%error, "device flow login failed");
                self.auth = AuthState::Failed {
                    message: error.message().to_string(),
                };
                Vec::new()
            }
        }
    }

    fn authenticated(&mut self) -> Vec<Effect> {
        self.auth = AuthState::Idle;
        self.pending = Some(Screen::ConnectionList);
        let mut effects = self.reload();
        effects.push(Effect::FetchUser(self.session));
        effects
    }

    fn reload(&mut self) -> Vec<Effect> {
        self.reloading = true;
        vec![Effect::ReloadConnections(self.session)]
    }

    fn on_connections_loaded(&mut self, result: Result<Vec<Connection>, StoreError>) -> Vec<Effect> {
        self.reloading = false;
        match result {
            Ok(connections) => {
                self.connections = connections;
                self.list_cursor.clamp_to(self.connections.len());
                self.list_error = None;
            }
            Err(error) => {
                tracing::error!(%error, "failed to load connections");
                self.list_error = Some(error.to_string());
            }
        }

        match self.pending.take() {
            Some(screen) => self.enter(screen),
            None => Vec::new(),
        }
    }

    fn on_connection_created(&mut self, result: Result<Connection, StoreError>) -> Vec<Effect> {
        match result {
            Ok(connection) => {
                tracing::info!(id = %connection.id, "connection created");
                if self.screen == Screen::AddConnectionForm {
                    self.pending = Some(Screen::ConnectionList);
                }
                self.reload()
            }
            Err(error) => {
                tracing::error!(%error, "failed to save connection");
                if let Some(form) = self.form.as_mut() {
                    form.save_failed();
                }
                Vec::new()
            }
        }
    }

    fn retry_load(&mut self) -> Vec<Effect> {
        if self.browser.is_none() || self.loader.is_loading() {
            return Vec::new();
        }
        if let Some(session) = self.browser.as_mut() {
            session.set_tree(None);
        }
        self.loader
            .retry()
            .map(|request| vec![Effect::LoadSchema(request)])
            .unwrap_or_default()
    }

    fn logout(&mut self) -> Vec<Effect> {
        tracing::info!("logging out");
        let mut effects = self.enter(Screen::Auth);
        self.auth = AuthState::Idle;
        self.user = None;
        self.connections.clear();
        self.list_cursor = Cursor::new();
        self.list_error = None;
        self.pending = None;
        self.reloading = false;
        self.session = self.session.next();
        effects.push(Effect::Logout);
        effects
    }

    fn enter(&mut self, next: Screen) -> Vec<Effect> {
        let previous = self.screen;
        self.unmount(previous, next);
        self.screen = next;
        tracing::debug!(from = ?previous, to = ?next, "screen transition");
        self.mount(next)
    }

    fn unmount(&mut self, screen: Screen, next: Screen) {
        match screen {
            Screen::AddConnectionForm => self.form = None,
            Screen::SchemaBrowser => {
                self.loader.cancel();
                self.browser = None;
            }
            Screen::ConnectionDetail if next != Screen::SchemaBrowser => self.detail = None,
            Screen::Auth | Screen::ConnectionList | Screen::ConnectionDetail => {}
        }
        if screen == Screen::SchemaBrowser && next != Screen::ConnectionDetail {
            self.detail = None;
        }
    }

    fn mount(&mut self, screen: Screen) -> Vec<Effect> {
        match screen {
            Screen::AddConnectionForm => {
                self.form = Some(AddConnectionForm::new());
                Vec::new()
            }
            Screen::SchemaBrowser => {
                let Some(connection) = self.detail.clone() else {
                    return Vec::new();
                };
                let session = SchemaBrowserSession::new(connection);
                let request = self.loader.start(session.load_target());
                self.browser = Some(session);
                vec![Effect::LoadSchema(request)]
            }
            Screen::Auth | Screen::ConnectionList | Screen::ConnectionDetail => Vec::new(),
        }
    }
}
