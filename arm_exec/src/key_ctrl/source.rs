//! Sources of keystrokes for [`super::KeyCtrl`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use log::warn;
use rustyline::{error::ReadlineError, DefaultEditor};

use super::ESCAPE;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which produces keystrokes, one at a time.
pub trait KeySource: Send {
    /// Block until the next key is available. `None` means there will never be another key.
    fn next_key(&mut self) -> Option<char>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Keys typed into a line editor on the terminal. Every character of an entered line is one key,
/// so several commands can be typed at once.
pub struct ReadlineKeys {
    editor: DefaultEditor,
    prompt: String,
    pending: VecDeque<char>,
}

/// A fixed sequence of keys.
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<char>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ReadlineKeys {
    pub fn new(prompt: &str) -> Result<Self, ReadlineError> {
        Ok(Self {
            editor: DefaultEditor::new()?,
            prompt: prompt.into(),
            pending: VecDeque::new(),
        })
    }
}

impl KeySource for ReadlineKeys {
    fn next_key(&mut self) -> Option<char> {
        while self.pending.is_empty() {
            match self.editor.readline(&self.prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    self.pending.extend(line.chars().filter(|c| !c.is_whitespace()));
                }
                // Ctrl-C behaves like the escape key
                Err(ReadlineError::Interrupted) => return Some(ESCAPE),
                Err(ReadlineError::Eof) => return None,
                Err(e) => {
                    warn!("Couldn't read from the terminal: {}", e);
                    return None;
                }
            }
        }

        self.pending.pop_front()
    }
}

impl ScriptedKeys {
    pub fn new(keys: &str) -> Self {
        Self {
            keys: keys.chars().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn next_key(&mut self) -> Option<char> {
        self.keys.pop_front()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scripted_keys() {
        let mut keys = ScriptedKeys::new("qa\u{1b}");
        assert_eq!(keys.next_key(), Some('q'));
        assert_eq!(keys.next_key(), Some('a'));
        assert_eq!(keys.next_key(), Some(ESCAPE));
        assert_eq!(keys.next_key(), None);
        assert_eq!(keys.next_key(), None);
    }
}
