use detective_core::payload::ImagePayload;
use detective_core::render::{RenderTarget, Screen};
use std::io::Write;

/// Prints each screen as a small text block
pub struct TerminalTarget<W: Write + Send> {
    out: W,
}

impl TerminalTarget<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalTarget<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn describe_image(image: &ImagePayload) -> String {
    let (w, h) = image.dimensions();
    format!("{}x{} {}, {} KB", w, h, image.media_type(), image.len().div_ceil(1024))
}

fn format_screen(screen: &Screen) -> String {
    let mut lines = vec![format!("== {} ==", screen.name())];
    match screen {
        Screen::Welcome => {
            lines.push("Point, snap, discover!".to_string());
            lines.push("  camera         open the camera".to_string());
            lines.push("  upload <path>  choose a photo".to_string());
            lines.push("  paste <data>   use a data URL".to_string());
        }
        Screen::Capturing { stream_id } => {
            lines.push(format!("Camera stream {} is live.", stream_id));
            lines.push("  capture | cancel".to_string());
        }
        Screen::Previewing { image } => {
            lines.push(format!("Photo ready ({}).", describe_image(image)));
            lines.push("  submit | retake".to_string());
        }
        Screen::Submitting => lines.push("Detective is investigating...".to_string()),
        Screen::Confident {
            headline,
            description,
            confidence_label,
            ..
        } => {
            lines.push(format!("It's a {}!", headline));
            lines.push(description.clone());
            if let Some(label) = confidence_label {
                lines.push(format!("({})", label));
            }
            lines.push("  again".to_string());
        }
        Screen::Ambiguous { message, choices, .. } => {
            lines.push(message.clone());
            lines.extend(choices.iter().map(|c| format!("  [{}] {}", c.index + 1, c.label)));
            lines.push("  pick <n> | again".to_string());
        }
        Screen::LowConfidence {
            message,
            tip,
            explanation,
            choices,
        } => {
            lines.push(message.clone());
            if let Some(explanation) = explanation {
                lines.push(explanation.clone());
            }
            if let Some(tip) = tip {
                lines.push(format!("Tip: {}", tip));
            }
            if choices.is_empty() {
                lines.push("  again".to_string());
            } else {
                lines.push("Is it one of these?".to_string());
                lines.extend(choices.iter().map(|c| format!("  [{}] {}", c.index + 1, c.label)));
                lines.push("  pick <n> | again".to_string());
            }
        }
        Screen::Error { message } => {
            lines.push(message.clone());
            lines.push("  again".to_string());
        }
    }
    lines.join("\n")
}

impl<W: Write + Send> RenderTarget for TerminalTarget<W> {
    fn render(&mut self, screen: &Screen) {
        if let Err(e) = writeln!(self.out, "{}\n", format_screen(screen)).and_then(|_| self.out.flush()) {
            tracing::warn!("Failed to write screen: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detective_core::render::Choice;

    fn rendered(screen: &Screen) -> String {
        let mut target = TerminalTarget::new(Vec::new());
        target.render(screen);
        String::from_utf8(target.into_inner()).unwrap()
    }

    #[test]
    fn choices_are_numbered_from_one() {
        let text = rendered(&Screen::LowConfidence {
            message: "Hmm!".into(),
            tip: Some("Try holding the camera very still.".into()),
            explanation: None,
            choices: vec![
                Choice { label: "dog (42%)".into(), index: 0, bounds: None },
                Choice { label: "fox".into(), index: 1, bounds: None },
            ],
        });
        assert!(text.starts_with("== result-low-confidence =="));
        assert!(text.contains("  [1] dog (42%)"));
        assert!(text.contains("  [2] fox"));
        assert!(text.contains("Tip: Try holding"));
    }

    #[test]
    fn low_confidence_without_guesses_offers_no_pick() {
        let text = rendered(&Screen::LowConfidence {
            message: "Hmm!".into(),
            tip: None,
            explanation: None,
            choices: vec![],
        });
        assert!(!text.contains("pick"));
    }

    #[test]
    fn confident_shows_headline_and_label() {
        let text = rendered(&Screen::Confident {
            headline: "CAT".into(),
            description: "A fluffy friend".into(),
            confidence_label: Some("95% sure".into()),
            image: None,
        });
        assert!(text.contains("It's a CAT!"));
        assert!(text.contains("(95% sure)"));
    }
}
