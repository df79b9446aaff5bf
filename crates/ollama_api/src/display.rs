use std::borrow::Cow;

/// Empty reasoning block emitted by thinking models that skipped reasoning.
pub const THINKING_MARKER: &str = "<think> </think>";

/// Annotation shown in place of [`THINKING_MARKER`].
pub const THINKING_INDICATOR: &str = "💭 Thinking.....";

/// Cosmetic substitution applied to each streamed fragment before it is
/// accumulated. Only the literal empty marker is replaced; reasoning blocks
/// with content pass through untouched.
pub fn apply_display_transform(fragment: &str) -> Cow<'_, str> {
    if fragment.contains(THINKING_MARKER) {
        Cow::Owned(fragment.replace(THINKING_MARKER, THINKING_INDICATOR))
    } else {
        Cow::Borrowed(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_empty_marker_occurrence() {
        let transformed = apply_display_transform("<think> </think>a<think> </think>");
        assert_eq!(
            transformed,
            format!("{THINKING_INDICATOR}a{THINKING_INDICATOR}")
        );
    }

    #[test]
    fn leaves_non_empty_reasoning_blocks_alone() {
        let fragment = "<think>step one</think>answer";
        assert!(matches!(
            apply_display_transform(fragment),
            Cow::Borrowed(text) if text == fragment
        ));
    }
}
