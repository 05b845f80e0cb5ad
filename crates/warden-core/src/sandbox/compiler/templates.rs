//! Template variable expansion for rule patterns

use crate::error::{WardenError, WardenResult};

use super::ProfileContext;

/// Expand `{{VAR}}` placeholders against a context
///
/// Recognized variables are `PROJECT_ROOT` (alias `PROJECT_PATH`) and `HOME`.
/// Anything else, an unterminated placeholder, or an empty value is an error.
pub fn expand(pattern: &str, context: &ProfileContext) -> WardenResult<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            WardenError::invalid_rule_in("Unterminated template variable", pattern)
        })?;

        let name = after[..end].trim();
        let value = lookup(name, context).ok_or_else(|| {
            WardenError::invalid_rule_in(format!("Unknown template variable: {}", name), pattern)
        })?;
        if value.is_empty() {
            return Err(WardenError::invalid_rule_in(
                format!("Template variable {} expands to nothing", name),
                pattern,
            ));
        }
        out.push_str(&value);
        rest = &after[end + 2..];
    }

    if rest.contains("}}") {
        return Err(WardenError::invalid_rule_in(
            "Unbalanced template delimiter",
            pattern,
        ));
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup(name: &str, context: &ProfileContext) -> Option<String> {
    let path = match name {
        "PROJECT_ROOT" | "PROJECT_PATH" => &context.project_root,
        "HOME" => &context.home_dir,
        _ => return None,
    };
    Some(path.to_string_lossy().into_owned())
}
