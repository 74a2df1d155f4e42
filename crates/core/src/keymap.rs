#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Tab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInput {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyInput {
    #[must_use]
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    #[must_use]
    pub fn ctrl(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        }
    }

    #[must_use]
    pub fn char(ch: char) -> Self {
        Self::plain(Key::Char(ch))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    SubmitAuth,
    MoveUp,
    MoveDown,
    MoveFirst,
    MoveLast,
    OpenSelected,
    AddConnection,
    DeleteSelected,
    Logout,
    FormInput(char),
    FormBackspace,
    FormSubmit,
    FormCancel,
    Back,
    BrowseSchema,
    ToggleRow,
    RetryLoad,
    CloseBrowser,
}

/// One entry of the focus stack. Each screen contributes exactly one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Auth,
    ConnectionList,
    AddConnectionForm,
    ConnectionDetail,
    SchemaBrowser,
}

impl Layer {
    #[must_use]
    pub fn bindings(self) -> &'static [KeyBinding] {
        match self {
            Self::Auth => &AUTH_BINDINGS,
            Self::ConnectionList => &CONNECTION_LIST_BINDINGS,
            Self::AddConnectionForm => &ADD_FORM_BINDINGS,
            Self::ConnectionDetail => &CONNECTION_DETAIL_BINDINGS,
            Self::SchemaBrowser => &SCHEMA_BROWSER_BINDINGS,
        }
    }

    /// Capturing layers swallow every event, bound or not.
    #[must_use]
    pub fn captures_all(self) -> bool {
        matches!(self, Self::SchemaBrowser | Self::AddConnectionForm)
    }

    fn accepts_text(self) -> bool {
        matches!(self, Self::AddConnectionForm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub key: Key,
    pub ctrl: bool,
    pub action: Action,
    pub hint: Option<&'static str>,
}

const fn bind(key: Key, action: Action, hint: Option<&'static str>) -> KeyBinding {
    KeyBinding {
        key,
        ctrl: false,
        action,
        hint,
    }
}

const fn bind_ctrl(ch: char, action: Action, hint: Option<&'static str>) -> KeyBinding {
    KeyBinding {
        key: Key::Char(ch),
        ctrl: true,
        action,
        hint,
    }
}

impl KeyBinding {
    fn matches(&self, input: &KeyInput) -> bool {
        self.ctrl == input.modifiers.ctrl && self.key == input.key
    }
}

const AUTH_BINDINGS: [KeyBinding; 3] = [
    bind(Key::Enter, Action::SubmitAuth, Some("<enter> login")),
    bind(Key::Char('q'), Action::Quit, Some("<q> quit")),
    bind_ctrl('c', Action::Quit, None),
];

const CONNECTION_LIST_BINDINGS: [KeyBinding; 12] = [
    bind(Key::Char('j'), Action::MoveDown, Some("<j> down")),
    bind(Key::Down, Action::MoveDown, None),
    bind(Key::Char('k'), Action::MoveUp, Some("<k> up")),
    bind(Key::Up, Action::MoveUp, None),
    bind(Key::Char('g'), Action::MoveFirst, None),
    bind(Key::Char('G'), Action::MoveLast, None),
    bind(Key::Enter, Action::OpenSelected, Some("<enter> open")),
    bind(Key::Char('a'), Action::AddConnection, Some("<a> add")),
    bind(Key::Char('d'), Action::DeleteSelected, Some("<d> delete")),
    bind_ctrl('l', Action::Logout, Some("<ctrl+l> logout")),
    bind(Key::Char('q'), Action::Quit, Some("<q> quit")),
    bind_ctrl('c', Action::Quit, None),
];

const ADD_FORM_BINDINGS: [KeyBinding; 3] = [
    bind(Key::Enter, Action::FormSubmit, Some("<enter> next")),
    bind(Key::Esc, Action::FormCancel, Some("<esc> cancel")),
    bind(Key::Backspace, Action::FormBackspace, None),
];

const CONNECTION_DETAIL_BINDINGS: [KeyBinding; 5] = [
    bind(Key::Char('q'), Action::Back, Some("<q> back")),
    bind(Key::Esc, Action::Back, None),
    bind_ctrl('l', Action::Logout, Some("<ctrl+l> logout")),
    bind(Key::Char('s'), Action::BrowseSchema, Some("<s> schema browser")),
    bind_ctrl('c', Action::Quit, None),
];

const SCHEMA_BROWSER_BINDINGS: [KeyBinding; 11] = [
    bind(Key::Char('j'), Action::MoveDown, Some("<j> down")),
    bind(Key::Down, Action::MoveDown, None),
    bind(Key::Char('k'), Action::MoveUp, Some("<k> up")),
    bind(Key::Up, Action::MoveUp, None),
    bind(Key::Char('g'), Action::MoveFirst, None),
    bind(Key::Char('G'), Action::MoveLast, None),
    bind(Key::Enter, Action::ToggleRow, Some("<enter> toggle")),
    bind(Key::Char(' '), Action::ToggleRow, None),
    bind(Key::Char('r'), Action::RetryLoad, Some("<r> retry")),
    bind(Key::Char('q'), Action::CloseBrowser, Some("<q> close")),
    bind(Key::Esc, Action::CloseBrowser, None),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Action(Action),
    Consumed,
    Ignored,
}

/// Routes one input event through a focus stack ordered bottom → top.
///
/// The topmost layer decides first; a layer that does not bind the key lets it
/// fall through unless it captures all input.
#[derive(Debug, Default)]
pub struct KeyDispatcher;

impl KeyDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn dispatch(&self, stack: &[Layer], input: &KeyInput) -> Dispatch {
        for layer in stack.iter().rev() {
            if let Some(binding) = layer
                .bindings()
                .iter()
                .find(|binding| binding.matches(input))
            {
                return Dispatch::Action(binding.action);
            }

            if layer.accepts_text() {
                if let Key::Char(ch) = input.key {
                    if !input.modifiers.ctrl && !input.modifiers.alt {
                        return Dispatch::Action(Action::FormInput(ch));
                    }
                }
            }

            if layer.captures_all() {
                return Dispatch::Consumed;
            }
        }
        Dispatch::Ignored
    }

    #[must_use]
    pub fn hints(&self, layer: Layer) -> Vec<&'static str> {
        layer
            .bindings()
            .iter()
            .filter_map(|binding| binding.hint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, Dispatch, Key, KeyDispatcher, KeyInput, Layer};

    const BROWSER_STACK: [Layer; 2] = [Layer::ConnectionDetail, Layer::SchemaBrowser];

    #[test]
    fn list_bindings_cover_navigation_and_commands() {
        let dispatcher = KeyDispatcher::new();
        let stack = [Layer::ConnectionList];
        let cases = [
            (KeyInput::char('j'), Action::MoveDown),
            (KeyInput::plain(Key::Down), Action::MoveDown),
            (KeyInput::char('k'), Action::MoveUp),
            (KeyInput::char('g'), Action::MoveFirst),
            (KeyInput::char('G'), Action::MoveLast),
            (KeyInput::plain(Key::Enter), Action::OpenSelected),
            (KeyInput::char('a'), Action::AddConnection),
            (KeyInput::char('d'), Action::DeleteSelected),
            (KeyInput::ctrl(Key::Char('l')), Action::Logout),
        ];
        for (input, expected) in cases {
            assert_eq!(
                dispatcher.dispatch(&stack, &input),
                Dispatch::Action(expected),
                "unexpected dispatch for {input:?}"
            );
        }
    }

    #[test]
    fn plain_l_is_not_logout() {
        let dispatcher = KeyDispatcher::new();
        assert_eq!(
            dispatcher.dispatch(&[Layer::ConnectionList], &KeyInput::char('l')),
            Dispatch::Ignored
        );
    }

    #[test]
    fn schema_browser_shadows_detail_bindings() {
        let dispatcher = KeyDispatcher::new();
        assert_eq!(
            dispatcher.dispatch(&BROWSER_STACK, &KeyInput::char('q')),
            Dispatch::Action(Action::CloseBrowser)
        );
        assert_eq!(
            dispatcher.dispatch(&BROWSER_STACK, &KeyInput::plain(Key::Esc)),
            Dispatch::Action(Action::CloseBrowser)
        );
        assert_eq!(
            dispatcher.dispatch(&BROWSER_STACK, &KeyInput::plain(Key::Enter)),
            Dispatch::Action(Action::ToggleRow)
        );
    }

    #[test]
    fn schema_browser_swallows_unbound_keys() {
        let dispatcher = KeyDispatcher::new();
        assert_eq!(
            dispatcher.dispatch(&BROWSER_STACK, &KeyInput::ctrl(Key::Char('l'))),
            Dispatch::Consumed
        );
        assert_eq!(
            dispatcher.dispatch(&BROWSER_STACK, &KeyInput::char('s')),
            Dispatch::Consumed
        );
    }

    #[test]
    fn same_key_means_different_things_per_screen() {
        let dispatcher = KeyDispatcher::new();
        let enter = KeyInput::plain(Key::Enter);
        assert_eq!(
            dispatcher.dispatch(&[Layer::Auth], &enter),
            Dispatch::Action(Action::SubmitAuth)
        );
        assert_eq!(
            dispatcher.dispatch(&[Layer::ConnectionList], &enter),
            Dispatch::Action(Action::OpenSelected)
        );
        assert_eq!(
            dispatcher.dispatch(&[Layer::AddConnectionForm], &enter),
            Dispatch::Action(Action::FormSubmit)
        );
    }

    #[test]
    fn form_turns_printable_keys_into_text() {
        let dispatcher = KeyDispatcher::new();
        let stack = [Layer::AddConnectionForm];
        assert_eq!(
            dispatcher.dispatch(&stack, &KeyInput::char('q')),
            Dispatch::Action(Action::FormInput('q'))
        );
        assert_eq!(
            dispatcher.dispatch(&stack, &KeyInput::plain(Key::Backspace)),
            Dispatch::Action(Action::FormBackspace)
        );
        assert_eq!(
            dispatcher.dispatch(&stack, &KeyInput::ctrl(Key::Char('l'))),
            Dispatch::Consumed
        );
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let dispatcher = KeyDispatcher::new();
        assert_eq!(
            dispatcher.dispatch(&[Layer::ConnectionDetail], &KeyInput::char('z')),
            Dispatch::Ignored
        );
        assert_eq!(
            dispatcher.dispatch(&[], &KeyInput::char('q')),
            Dispatch::Ignored
        );
    }

    #[test]
    fn hints_follow_binding_order() {
        let dispatcher = KeyDispatcher::new();
        assert_eq!(
            dispatcher.hints(Layer::SchemaBrowser),
            vec![
                "<j> down",
                "<k> up",
                "<enter> toggle",
                "<r> retry",
                "<q> close"
            ]
        );
    }
}
