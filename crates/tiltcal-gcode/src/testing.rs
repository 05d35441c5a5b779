use crate::{Number, Statement};

/// Renders parser output one statement per line, for inline snapshots.
pub fn render_from_str(input: &str) -> String {
    match crate::parse(input) {
        Ok(statements) => statements
            .iter()
            .map(render_statement)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(err) => format!("parse error: {err}"),
    }
}

/// Convenience helper for snapshotting parser output as JSON.
pub fn json_from_str(input: &str) -> String {
    match crate::parse(input) {
        Ok(statements) => serde_json::to_string(&statements)
            .unwrap_or_else(|err| format!("failed to render JSON: {err}")),
        Err(err) => format!("parse error: {err}"),
    }
}

fn render_statement(statement: &Statement) -> String {
    let mut parts = vec![format!("{}:", statement.line)];
    for word in &statement.words {
        let value = match word.value {
            Some(Number::Int(v)) => v.to_string(),
            Some(Number::Float(v)) => format!("{v:?}"),
            None => String::new(),
        };
        parts.push(format!("{}{}", word.letter, value));
    }
    for text in &statement.text {
        parts.push(format!("<{text}>"));
    }
    if let Some(comment) = &statement.comment {
        parts.push(format!("; {comment}"));
    }
    parts.join(" ")
}
