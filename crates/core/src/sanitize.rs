//! Variable name to script identifier derivation.
//!
//! Two policies exist for compatibility. Early scripts were written against
//! identifiers that kept letters and digits only (`legacy`); the current
//! policy also keeps underscores (`smart`). Both are bound when they differ,
//! so only [`candidate_identifiers`] should be called by the generator.
//! Dropping the legacy policy later means changing that one function.
//!
//! Unsupported characters are dropped, never substituted.

/// Keep alphanumeric characters only.
pub fn sanitize_legacy(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Keep alphanumeric characters and underscores.
pub fn sanitize_smart(name: &str) -> String {
    name.chars().filter(|&c| is_identifier_char(c)).collect()
}

fn is_identifier_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Identifiers to bind for `name`, legacy first. Contains one entry when
/// both policies agree and none when the name has no usable characters.
pub fn candidate_identifiers(name: &str) -> Vec<String> {
    let legacy = sanitize_legacy(name);
    let smart = sanitize_smart(name);

    let mut candidates = Vec::with_capacity(2);
    if legacy != smart && !legacy.is_empty() {
        candidates.push(legacy);
    }
    if !smart.is_empty() {
        candidates.push(smart);
    }
    candidates
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
