//! Action enum: what a key press asks the app to do.

/// Keys produce Actions; the App turns them into controller intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select(usize), // station by catalog index
    Next,
    Prev,
    Refresh,
    TogglePause,
    Stop,
    Quit,
}
