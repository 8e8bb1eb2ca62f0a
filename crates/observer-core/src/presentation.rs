//! Terminal presentation
//!
//! Every line the observer prints is tagged with the kind of entity it is
//! about. The tag is resolved once, when the entity is created, and the colour
//! is a pure function of the tag.

use colored::{Color, Colorize};
use serde::Deserialize;
use std::io::{IsTerminal, Write};
use tracing::debug;

use crate::types::{MediaType, PropertyMap};

/// The kind of entity a line is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityTag {
    Channel,
    Content(MediaType),
    /// A stream, tagged with the media type of its owning content
    Stream(MediaType),
    Other,
}

/// Colour used for lines about an entity
pub fn colour_for(tag: EntityTag) -> Color {
    match tag {
        EntityTag::Channel => Color::Red,
        EntityTag::Content(media) if media.is_audio() => Color::Green,
        EntityTag::Content(_) => Color::Blue,
        EntityTag::Stream(media) if media.is_audio() => Color::Yellow,
        EntityTag::Stream(_) => Color::Magenta,
        EntityTag::Other => Color::White,
    }
}

/// When to emit ANSI colour sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColourMode {
    /// Colour when stdout is a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColourMode {
    pub fn enabled_for_stdout(self) -> bool {
        match self {
            ColourMode::Auto => std::io::stdout().is_terminal(),
            ColourMode::Always => true,
            ColourMode::Never => false,
        }
    }
}

/// Line-oriented, colour-tagged output
pub struct Console {
    out: Box<dyn Write + Send>,
    colour: bool,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>, colour: bool) -> Self {
        Self { out, colour }
    }

    /// Console on stdout
    pub fn stdout(mode: ColourMode) -> Self {
        let colour = mode.enabled_for_stdout();
        if mode == ColourMode::Always {
            colored::control::set_override(true);
        }
        Self::new(Box::new(std::io::stdout()), colour)
    }

    pub fn print(&mut self, tag: EntityTag, text: impl AsRef<str>) {
        self.emit(tag, text.as_ref(), false);
    }

    pub fn print_bold(&mut self, tag: EntityTag, text: impl AsRef<str>) {
        self.emit(tag, text.as_ref(), true);
    }

    /// One `   - name: value` line per cached property
    pub fn print_properties(&mut self, tag: EntityTag, properties: &PropertyMap) {
        for (name, value) in properties {
            self.print(tag, format!("   - {}: {}", name, value));
        }
    }

    fn emit(&mut self, tag: EntityTag, text: &str, bold: bool) {
        let result = if self.colour {
            let mut styled = text.color(colour_for(tag));
            if bold {
                styled = styled.bold();
            }
            writeln!(self.out, "{}", styled)
        } else {
            writeln!(self.out, "{}", text)
        };

        if let Err(e) = result.and_then(|_| self.out.flush()) {
            debug!("Failed to write observer output: {}", e);
        }
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").field("colour", &self.colour).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedBuffer;
    use crate::types::PropertyValue;

    #[test]
    fn test_colour_is_a_function_of_the_tag() {
        assert_eq!(colour_for(EntityTag::Channel), Color::Red);
        assert_eq!(colour_for(EntityTag::Content(MediaType::Audio)), Color::Green);
        assert_eq!(colour_for(EntityTag::Content(MediaType::Video)), Color::Blue);
        assert_eq!(colour_for(EntityTag::Content(MediaType::Other(9))), Color::Blue);
        assert_eq!(colour_for(EntityTag::Stream(MediaType::Audio)), Color::Yellow);
        assert_eq!(colour_for(EntityTag::Stream(MediaType::Video)), Color::Magenta);
        assert_eq!(colour_for(EntityTag::Other), Color::White);
    }

    #[test]
    fn test_plain_output_has_no_escapes() {
        let buffer = SharedBuffer::new();
        let mut console = Console::new(Box::new(buffer.clone()), false);
        console.print(EntityTag::Channel, "Observing channel /c");
        console.print_bold(EntityTag::Stream(MediaType::Audio), "Stream (a) members:");

        assert_eq!(buffer.contents(), "Observing channel /c\nStream (a) members:\n");
    }

    #[test]
    fn test_forced_colour_wraps_lines() {
        colored::control::set_override(true);
        let buffer = SharedBuffer::new();
        let mut console = Console::new(Box::new(buffer.clone()), true);
        console.print(EntityTag::Channel, "closed");

        let output = buffer.contents();
        assert!(output.contains("\u{1b}[31m"), "expected red escape in {:?}", output);
        assert!(output.contains("closed"));
    }

    #[test]
    fn test_properties_are_listed_in_name_order() {
        let buffer = SharedBuffer::new();
        let mut console = Console::new(Box::new(buffer.clone()), false);
        let mut properties = PropertyMap::new();
        properties.insert("Transport".to_string(), PropertyValue::UInt(1));
        properties.insert("HasServerInfo".to_string(), PropertyValue::Bool(false));
        console.print_properties(EntityTag::Other, &properties);

        assert_eq!(
            buffer.contents(),
            "   - HasServerInfo: false\n   - Transport: 1\n"
        );
    }

    #[test]
    fn test_colour_mode_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            colour: ColourMode,
        }
        let wrapper: Wrapper = callwatch_infra_common::config::load_toml_str("colour = \"never\"").unwrap();
        assert_eq!(wrapper.colour, ColourMode::Never);
    }
}
