//! Board state kept between CLI runs.
//!
//! The card cannot report its latched outputs, so a run that leaves them
//! switched on records them here. The next run attaches to the card with
//! this state instead of initializing it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::device::{BoardState, GroupStateCache};
use crate::error::{Result, Usbdo96Error};
use crate::protocol::GROUP_COUNT;
use crate::storage::settings::get_config_dir;

const SESSION_FILE: &str = "session.json";

/// Outputs left on a card by the last run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Device path the state belongs to
    pub device: String,
    /// B0 as last written
    pub enabled: bool,
    /// Group words, group 1 first (C in the low byte, D in the high byte)
    pub groups: [u16; GROUP_COUNT as usize],
}

impl SavedSession {
    /// Record the board state of a card.
    pub fn capture(device: &str, board: &BoardState) -> Self {
        Self {
            device: device.to_string(),
            enabled: board.enabled,
            groups: *board.groups.words(),
        }
    }

    /// Board state to attach with, if it was saved for `device`.
    pub fn board_for(&self, device: &str) -> Option<BoardState> {
        (self.device == device).then(|| BoardState {
            enabled: self.enabled,
            groups: GroupStateCache::from_words(self.groups),
        })
    }
}

/// Get the full path to the session file.
pub fn get_session_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(SESSION_FILE))
}

/// Load the saved session from a file. A missing file yields `None`.
pub fn load_session_from(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to read session: {}", e)))?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to parse session: {}", e)))
}

/// Save a session to a file, creating its directory if needed.
pub fn save_session_to(path: &Path, session: &SavedSession) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| Usbdo96Error::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(session)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to serialize session: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| Usbdo96Error::Config(format!("Failed to write session: {}", e)))
}

/// Forget the saved session. Nothing to forget is not an error.
pub fn clear_session_at(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Usbdo96Error::Config(format!(
            "Failed to remove session: {}",
            e
        ))),
    }
}

/// Load the saved session from disk.
pub fn load_session() -> Result<Option<SavedSession>> {
    load_session_from(&get_session_path()?)
}

/// Save a session to disk.
pub fn save_session(session: &SavedSession) -> Result<()> {
    save_session_to(&get_session_path()?, session)
}

/// Forget the saved session on disk.
pub fn clear_session() -> Result<()> {
    clear_session_at(&get_session_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("usbdo96-session-{}-{}", name, std::process::id()))
            .join(SESSION_FILE)
    }

    fn board_with(c: u8, d: u8) -> BoardState {
        let mut board = BoardState {
            enabled: true,
            ..BoardState::default()
        };
        board.groups.set(1, c, d).unwrap();
        board
    }

    #[test]
    fn test_missing_session() {
        assert_eq!(load_session_from(&temp_path("missing")).unwrap(), None);
        assert!(clear_session_at(&temp_path("missing")).is_ok());
    }

    #[test]
    fn test_save_load_clear() {
        let path = temp_path("cycle");
        let session = SavedSession::capture("/dev/ttyUSB0", &board_with(0x04, 0x00));

        save_session_to(&path, &session).unwrap();
        assert_eq!(load_session_from(&path).unwrap(), Some(session));

        clear_session_at(&path).unwrap();
        assert_eq!(load_session_from(&path).unwrap(), None);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_board_restored_for_same_device() {
        let board = board_with(0x04, 0x02);
        let session = SavedSession::capture("/dev/ttyUSB0", &board);

        assert_eq!(session.groups[0], 0x0204);
        assert_eq!(session.board_for("/dev/ttyUSB0"), Some(board));
        assert_eq!(session.board_for("/dev/ttyUSB1"), None);
    }

    #[test]
    fn test_corrupt_session() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(
            load_session_from(&path),
            Err(Usbdo96Error::Config(_))
        ));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
