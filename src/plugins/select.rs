use super::{PluginDescriptor, PluginRegistry};
use crate::errors::SelectError;
use crate::types::PluginId;

/// Choose the plugin for a query.
///
/// An explicit id is authoritative and missing ids are surfaced to the caller
/// rather than silently ignored. Without an explicit id, a keyword heuristic
/// runs: tokens of each plugin's description longer than 3 characters are
/// matched as substrings of the lower-cased query, and the first plugin with
/// any hit wins. Registration order breaks ties. No match means no plugin.
pub fn select<'a>(
    query: &str,
    explicit: Option<PluginId>,
    registry: &'a PluginRegistry,
) -> Result<Option<&'a PluginDescriptor>, SelectError> {
    if let Some(id) = explicit {
        return registry.get(id).map(Some).ok_or(SelectError::NotFound(id));
    }

    let query_lower = query.to_lowercase();
    for plugin in registry.iter() {
        let description = plugin.description.to_lowercase();
        let matched = description
            .split_whitespace()
            .filter(|token| token.len() > 3)
            .any(|token| query_lower.contains(token));
        if matched {
            log::debug!("auto-selected plugin {} for query", plugin.name);
            return Ok(Some(plugin));
        }
    }
    Ok(None)
}
