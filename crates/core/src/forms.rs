pub const DEFAULT_CONNECTION_NAME: &str = "My Database";
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormStep {
    #[default]
    Url,
    Name,
    Saving,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Pending,
    Submit { name: String, url: String },
}

/// Two-step entry for a new connection: URL first, then a display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddConnectionForm {
    step: FormStep,
    url: String,
    name: String,
    error: Option<String>,
}

impl AddConnectionForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn step(&self) -> FormStep {
        self.step
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.step == FormStep::Saving
    }

    pub fn push_char(&mut self, ch: char) {
        match self.step {
            FormStep::Url => self.url.push(ch),
            FormStep::Name => self.name.push(ch),
            FormStep::Saving => return,
        }
        self.error = None;
    }

    pub fn backspace(&mut self) {
        match self.step {
            FormStep::Url => {
                self.url.pop();
            }
            FormStep::Name => {
                self.name.pop();
            }
            FormStep::Saving => {}
        }
    }

    pub fn submit(&mut self) -> FormOutcome {
        match self.step {
            FormStep::Url => {
                let url = self.url.trim();
                if url.is_empty() {
                    self.error = Some("URL is required".to_string());
                } else if !url.contains("://") {
                    self.error = Some("URL must include a scheme, e.g. postgresql://".to_string());
                } else {
                    self.error = None;
                    self.step = FormStep::Name;
                }
                FormOutcome::Pending
            }
            FormStep::Name => {
                let name = match self.name.trim() {
                    "" => DEFAULT_CONNECTION_NAME.to_string(),
                    trimmed => trimmed.to_string(),
                };
                self.step = FormStep::Saving;
                FormOutcome::Submit {
                    name,
                    url: self.url.trim().to_string(),
                }
            }
            FormStep::Saving => FormOutcome::Pending,
        }
    }

    pub fn save_failed(&mut self) {
        self.step = FormStep::Url;
        self.error = Some(SAVE_FAILED_MESSAGE.to_string());
    }
}
