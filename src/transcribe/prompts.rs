//! Transcription prompt.
//!
//! Override per user via [`crate::settings::Settings::custom_prompt`]; this
//! constant is used only when no custom prompt is saved.

/// Default instruction sent ahead of the captured images.
pub const DEFAULT_PROMPT: &str = r#"Transcribe all text from these images in the exact order they appear. Your output should be formatted in HTML with proper semantic tags. Use the following guidelines:

1. Use <strong> for bold text, <em> for italics
2. Use <ul> and <li> for bullet points, <ol> and <li> for numbered lists
3. Use <table>, <tr>, <th>, and <td> for tables with proper borders
4. Use <hr> for horizontal lines/dividers
5. Use <p> tags to separate paragraphs
6. Preserve colors using inline styles like <span style="color: #FF0000">text</span> when visible
7. Maintain the original formatting, structure, and hierarchy
8. If there are multiple images, transcribe them in sequence

Provide ONLY the HTML content without wrapping it in <html>, <body>, or ```html tags. Start directly with the content."#;

/// Prefix a multi-image request so the model knows how many to expect.
pub fn image_count_note(count: usize) -> String {
    match count {
        1 => "There is 1 image.".to_string(),
        n => format!("There are {n} images, in reading order."),
    }
}
