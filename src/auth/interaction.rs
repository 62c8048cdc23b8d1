//! Operator-facing side effects of a login.

use std::fmt::Debug;

/// How the engine reaches the person at the keyboard.
pub trait Interaction: Send + Sync + Debug {
    /// Launch `url` in the default browser.
    fn open_browser(&self, url: &str) -> Result<(), String>;

    /// Show a one-line status or instruction.
    fn show_message(&self, message: &str);

    /// Surface a URL the operator has to open by hand.
    fn show_url(&self, url: &str) {
        self.show_message(&format!("Please open this URL in your browser: {}", url));
    }
}

/// Real browser, messages on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInteraction;

impl Interaction for SystemInteraction {
    fn open_browser(&self, url: &str) -> Result<(), String> {
        open::that(url).map_err(|e| e.to_string())
    }

    fn show_message(&self, message: &str) {
        eprintln!("{}", message);
    }
}
