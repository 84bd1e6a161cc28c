use std::path::PathBuf;

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Camera,
    Capture,
    Cancel,
    Upload(PathBuf),
    Paste(String),
    Submit,
    /// Zero-based choice index
    Pick(usize),
    Restart,
    Health,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "camera" => Command::Camera,
            "capture" | "snap" => Command::Capture,
            "cancel" => Command::Cancel,
            "upload" | "open" => {
                if rest.is_empty() {
                    return Err("upload needs a file path".to_string());
                }
                Command::Upload(PathBuf::from(rest))
            }
            "paste" => {
                if rest.is_empty() {
                    return Err("paste needs a data URL".to_string());
                }
                Command::Paste(rest.to_string())
            }
            "submit" | "go" => Command::Submit,
            "pick" => match rest.parse::<usize>() {
                Ok(n) if n >= 1 => Command::Pick(n - 1),
                _ => return Err(format!("pick needs a number from the list, got {:?}", rest)),
            },
            "restart" | "retake" | "again" | "back" => Command::Restart,
            "health" => Command::Health,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command {:?}, type help", other)),
        };
        Ok(command)
    }
}

pub const HELP: &str = "\
commands:
  camera           open the camera
  capture          freeze the current frame
  cancel           close the camera
  upload <path>    choose a photo file
  paste <dataurl>  use a base64 data URL
  submit           ask the detective
  pick <n>         choose one of the listed answers
  again            start over
  health           check the detective server
  quit";
