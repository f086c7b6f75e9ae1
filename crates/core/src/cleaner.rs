//! Cleanup of text extracted from PDF pages.

use crate::config::CleanerConfig;
use crate::error::IngestError;
use crate::models::Document;
use regex::Regex;

/// Removes extraction artifacts: page-number lines, exotic spaces,
/// hyphenation breaks and hard line wraps inside sentences.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    terminators: Vec<char>,
    page_number_line: Regex,
    exotic_space: Regex,
    zero_width: Regex,
    hyphen_break: Regex,
    blank_lines: Regex,
    repeated_spaces: Regex,
}

impl TextCleaner {
    pub fn new(config: &CleanerConfig) -> Result<Self, IngestError> {
        Ok(Self {
            terminators: config.sentence_terminators.clone(),
            page_number_line: Regex::new(r"^\s*(?:-\s*)?\d+(?:\s*-)?\s*$")?,
            exotic_space: Regex::new(r"[\u{00A0}\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}\t]")?,
            zero_width: Regex::new(r"[\u{200B}-\u{200F}\u{FEFF}]")?,
            hyphen_break: Regex::new(r"(\S)-\n(\S)")?,
            blank_lines: Regex::new(r"\n(?:[ ]*\n){2,}")?,
            repeated_spaces: Regex::new(r" {2,}")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let normalized_breaks = text.replace("\r\n", "\n").replace('\r', "\n");

        let without_page_numbers = normalized_breaks
            .split('\n')
            .filter(|line| !self.page_number_line.is_match(line))
            .collect::<Vec<_>>()
            .join("\n");

        let spaced = self.exotic_space.replace_all(&without_page_numbers, " ");
        let spaced = self.zero_width.replace_all(&spaced, "");
        let dehyphenated = self.hyphen_break.replace_all(&spaced, "$1$2");
        let joined = self.join_wrapped_lines(&dehyphenated);
        let collapsed = self.blank_lines.replace_all(&joined, "\n\n");
        let collapsed = self.repeated_spaces.replace_all(&collapsed, " ");

        collapsed.trim().to_string()
    }

    pub fn clean_document(&self, document: &Document) -> Document {
        Document {
            content: self.clean(&document.content),
            metadata: document.metadata.clone(),
        }
    }

    /// Replaces a single line break with a space unless the line ends a
    /// sentence or the next line does not start with a letter.
    fn join_wrapped_lines(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut output = String::with_capacity(text.len());

        for (position, &current) in chars.iter().enumerate() {
            if current != '\n' {
                output.push(current);
                continue;
            }

            let previous = chars[..position]
                .iter()
                .rev()
                .find(|c| **c != ' ')
                .copied();
            let next = chars.get(position + 1).copied();

            let inside_paragraph = matches!(previous, Some(c) if c != '\n')
                && matches!(next, Some(c) if c.is_alphabetic());
            let ends_sentence = previous.is_some_and(|c| self.terminators.contains(&c));

            if inside_paragraph && !ends_sentence {
                output.push(' ');
            } else {
                output.push('\n');
            }
        }

        output
    }
}
