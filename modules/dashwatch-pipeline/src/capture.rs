/// A raster image of the whole dashboard page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Screenshot {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Valid,
    Invalid,
}

/// One page capture: the visible text as normalised lines, plus an optional screenshot.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub lines: Vec<String>,
    pub screenshot: Option<Screenshot>,
    pub session: SessionState,
}

const LOGIN_WALL_PHRASES: &[&str] = &["sign in", "can't access report", "you need permission"];

impl Capture {
    /// Split raw page text into normalised, non-empty lines.
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .lines()
            .map(crate::patterns::normalize_line)
            .filter(|l| !l.is_empty())
            .collect();
        Self {
            lines,
            screenshot: None,
            session: SessionState::Valid,
        }
    }

    pub fn with_screenshot(mut self, screenshot: Screenshot) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    pub fn with_session(mut self, session: SessionState) -> Self {
        self.session = session;
        self
    }

    /// The lines joined back into one newline-separated block.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// True when the collaborator flagged the session, or the page is a sign-in wall.
    pub fn session_invalid(&self) -> bool {
        if self.session == SessionState::Invalid {
            return true;
        }
        let sample = self
            .lines
            .iter()
            .take(80)
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
            .replace('\u{2019}', "'");
        LOGIN_WALL_PHRASES.iter().any(|p| sample.contains(p))
    }
}
