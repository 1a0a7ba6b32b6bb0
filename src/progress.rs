use std::fmt;
use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use serde::Serialize;

/// Where a media file is in its upload, poll, generate pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Uploading,
    Polling,
    Generating,
    Recorded,
    Failed,
}

impl FileStage {
    pub fn label(&self) -> &'static str {
        match self {
            FileStage::Uploading => "Uploading",
            FileStage::Polling => "Processing",
            FileStage::Generating => "Generating",
            FileStage::Recorded => "Done",
            FileStage::Failed => "Error",
        }
    }
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Single overwritable terminal line on stderr. Disabled instances swallow
/// everything, which keeps test output clean.
#[derive(Debug, Clone, Copy)]
pub struct StatusLine {
    enabled: bool,
}

impl StatusLine {
    pub fn stderr() -> Self {
        Self { enabled: true }
    }

    pub fn hidden() -> Self {
        Self { enabled: false }
    }

    /// Replaces whatever the current line shows.
    pub fn transient(&self, message: &str) {
        if !self.enabled {
            return;
        }
        let mut err = io::stderr();
        let _ = execute!(
            err,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(message)
        );
    }

    /// Appends a progress dot to the current line.
    pub fn tick(&self) {
        if !self.enabled {
            return;
        }
        let mut err = io::stderr();
        let _ = execute!(err, Print("."));
    }

    /// Clears the transient line and prints a permanent one.
    pub fn line(&self, message: &str) {
        if !self.enabled {
            return;
        }
        let mut err = io::stderr();
        let _ = queue!(
            err,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(message),
            Print("\n")
        );
        let _ = err.flush();
    }

    pub fn fatal(&self, message: &str) {
        let mut err = io::stderr();
        let _ = execute!(
            err,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print("\n"),
            Print(format!("FATAL ERROR: {message}").red().bold()),
            Print("\n")
        );
    }
}
