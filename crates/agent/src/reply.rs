//! Locating structured JSON inside free-form model replies.
//!
//! Models wrap JSON in prose or in fenced blocks. These helpers find the
//! first fenced ```json block, or failing that the first balanced object or
//! array, without trying to repair anything.

/// First JSON object in `text`, fenced or bare.
pub fn find_json_object(text: &str) -> Option<&str> {
    find_fenced(text)
        .filter(|s| s.trim_start().starts_with('{'))
        .or_else(|| find_balanced(text, '{', '}'))
}

/// First JSON array in `text`, fenced or bare.
pub fn find_json_array(text: &str) -> Option<&str> {
    find_fenced(text)
        .filter(|s| s.trim_start().starts_with('['))
        .or_else(|| find_balanced(text, '[', ']'))
}

fn find_fenced(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_ticks = &text[start + 3..];
    let body_start = after_ticks.find('\n')? + 1;
    let body = &after_ticks[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn find_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_fenced_object() {
        let reply = "Sure.\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(find_json_object(reply), Some("{\"a\": 1}"));
    }

    #[test]
    fn finds_bare_object_with_nested_braces_in_strings() {
        let reply = r#"Thought: ok {"action": "final_answer", "answer": "use {x} here"} trailing"#;
        assert_eq!(
            find_json_object(reply),
            Some(r#"{"action": "final_answer", "answer": "use {x} here"}"#)
        );
    }

    #[test]
    fn handles_escaped_quotes() {
        let reply = r#"{"answer": "she said \"hi}\""}"#;
        assert_eq!(find_json_object(reply), Some(reply));
    }

    #[test]
    fn finds_array() {
        let reply = "Ranking: [{\"tool\": \"shell\"}, {\"tool\": \"file_read\"}] ok";
        assert_eq!(
            find_json_array(reply),
            Some("[{\"tool\": \"shell\"}, {\"tool\": \"file_read\"}]")
        );
    }

    #[test]
    fn unbalanced_returns_none() {
        assert_eq!(find_json_object("{\"a\": 1"), None);
        assert_eq!(find_json_object("no json here"), None);
    }
}
