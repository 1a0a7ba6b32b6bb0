/// Sent ahead of the uploaded media on every generation call. The four
/// bracketed sections are what downstream training tooling parses.
pub const CAPTION_PROMPT: &str = "Analyze this media and provide a detailed caption in the following EXACT format. Fill in ALL sections:

[VISUAL]: <Detailed description of people, objects, actions, settings, colors, and movements>
[SPEECH]: <Word-for-word transcription. If none, write 'None'>
[SOUNDS]: <Description of sounds. If none, write 'None'>
[TEXT]: <Any on-screen text. If none, write 'None'>";

pub const CAPTION_SECTIONS: &[&str] = &["[VISUAL]:", "[SPEECH]:", "[SOUNDS]:", "[TEXT]:"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_section_in_order() {
        let mut cursor = 0;
        for section in CAPTION_SECTIONS {
            let found = CAPTION_PROMPT[cursor..]
                .find(section)
                .unwrap_or_else(|| panic!("missing {section}"));
            cursor += found + section.len();
        }
    }
}
