//! Well-known variable name conventions.

/// Prefix of variables whose value is a reusable PowerShell module body,
/// e.g. `Octopus.Script.Module[Shared Helpers]`.
pub const SCRIPT_MODULE_PREFIX: &str = "Octopus.Script.Module[";

/// Whether `name` declares a library script module.
pub fn is_library_script_module(name: &str) -> bool {
    name.starts_with(SCRIPT_MODULE_PREFIX) && name.ends_with(']')
}

/// The module name inside `Octopus.Script.Module[...]`, or `None` when
/// `name` is not a library script module variable.
pub fn library_script_module_name(name: &str) -> Option<&str> {
    if !is_library_script_module(name) {
        return None;
    }
    Some(&name[SCRIPT_MODULE_PREFIX.len()..name.len() - 1])
}

/// Indexed names such as `Octopus.Action[Deploy].Name` are reachable through
/// the parameter table only; they never get a local identifier.
pub fn is_excluded_from_local_variables(name: &str) -> bool {
    name.contains('[')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
