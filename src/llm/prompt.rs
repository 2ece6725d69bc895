//! Prompt composition for dictation rewriting.
//!
//! [`PromptBuilder`] turns a caller-supplied instruction template and the
//! dictated text into the single prompt string handed to the rewrite tool.
//!
//! * A template containing `{text}` has the placeholder substituted.
//! * Any other template is followed by the text and a `Rewritten:` cue.
//! * A blank template falls back to [`DEFAULT_INSTRUCTION`].

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// Placeholder replaced by the input text inside a template.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Used when the caller supplies an empty template.
pub const DEFAULT_INSTRUCTION: &str = "\
You are a dictation post-editing assistant.
Task: Rewrite the dictated text so it reads cleanly, preserving its meaning.

Rules:
1. Fix mis-transcribed words (homophones, words that sound similar).
2. Remove filler words (um, uh, like, you know, etc.).
3. Add appropriate punctuation and capitalisation.
4. Preserve technical terms, proper nouns, and code snippets exactly.
5. Reply with ONLY the rewritten text, no explanation.
6. If the text is already correct, return it unchanged.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds the prompt payload for one rewrite.
///
/// # Example
/// ```rust
/// use voice_rewrite::llm::PromptBuilder;
///
/// let prompt = PromptBuilder::new("Make this formal: {text}").build("hey there");
/// assert_eq!(prompt, "Make this formal: hey there");
/// ```
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: &str) -> Self {
        let template = if template.trim().is_empty() {
            DEFAULT_INSTRUCTION
        } else {
            template
        };
        Self {
            template: template.to_string(),
        }
    }

    /// Compose the prompt for `text`.
    ///
    /// Only the template is scanned for the placeholder; a literal `{text}`
    /// inside the dictated text is left alone.
    pub fn build(&self, text: &str) -> String {
        if self.template.contains(TEXT_PLACEHOLDER) {
            return self.template.replace(TEXT_PLACEHOLDER, text);
        }

        let mut prompt = String::with_capacity(self.template.len() + text.len() + 32);
        prompt.push_str(self.template.trim_end());
        prompt.push_str("\n\nText:\n");
        prompt.push_str(text);
        prompt.push_str("\n\nRewritten:\n");
        prompt
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_substituted() {
        let prompt = PromptBuilder::new("Fix: {text}\nDone.").build("um hello");
        assert_eq!(prompt, "Fix: um hello\nDone.");
    }

    #[test]
    fn template_without_placeholder_gets_text_and_cue() {
        let prompt = PromptBuilder::new("Improve the wording.\n").build("the cat sat");

        assert!(prompt.starts_with("Improve the wording.\n\nText:\n"));
        assert!(prompt.contains("the cat sat"));
        assert!(prompt.ends_with("Rewritten:\n"));
    }

    #[test]
    fn blank_template_uses_default_instruction() {
        let prompt = PromptBuilder::new("   ").build("um test");

        assert!(prompt.contains("filler words"));
        assert!(prompt.contains("um test"));
    }

    #[test]
    fn placeholder_inside_text_is_not_expanded() {
        let prompt = PromptBuilder::new("A {text} B").build("x {text} y");
        assert_eq!(prompt, "A x {text} y B");
    }

    #[test]
    fn thai_text_survives_composition() {
        let raw = "เอ่อ ผม ทำงาน เสร็จ แล้ว ครับ";
        let prompt = PromptBuilder::new("Clean up:").build(raw);
        assert!(prompt.contains(raw));
    }
}
