use serde::{Deserialize, Serialize};

pub mod select;

use crate::types::PluginId;

/// One selectable mode of a plugin, mapped to a request path and method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub path: String,
    pub method: String,
}

impl Capability {
    /// GET capability; the only method the built-in tools need today.
    pub fn new(name: impl Into<String>, description: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            path: path.into(),
            method: "GET".to_string(),
        }
    }
}

/// Descriptor of a registered external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: PluginId,
    pub name: String,
    pub description: String,
    pub base_url: String,
    capabilities: Vec<Capability>,
}

impl PluginDescriptor {
    /// `capabilities` may be empty at the call site; a plugin without declared
    /// capabilities gets a single implicit one so the pipeline always has
    /// something to invoke.
    pub fn new(
        id: PluginId,
        name: impl Into<String>,
        description: impl Into<String>,
        base_url: impl Into<String>,
        mut capabilities: Vec<Capability>,
    ) -> Self {
        if capabilities.is_empty() {
            capabilities.push(Capability::new("default", "Default capability", ""));
        }
        Self {
            id,
            name: name.into(),
            description: description.into(),
            base_url: base_url.into(),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// The documented fallback when a capability choice is missing or invalid.
    pub fn first_capability(&self) -> &Capability {
        // Constructor guarantees at least one capability.
        &self.capabilities[0]
    }

    /// Whether the pipeline needs a capability-selection step at all.
    pub fn has_sub_selection(&self) -> bool {
        self.capabilities.len() > 1
    }
}

/// Ordered, read-only collection of registered plugins. Built once at startup;
/// iteration order is registration order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        base_url: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> PluginId {
        let id = PluginId::new(self.plugins.len() as u32 + 1);
        self.plugins
            .push(PluginDescriptor::new(id, name, description, base_url, capabilities));
        id
    }

    pub fn get(&self, id: PluginId) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registry seeded with the built-in IP-lookup plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            "IPinfo",
            "Get information about an IP address including geolocation, ASN, and more.",
            "https://ipinfo.io",
            vec![
                Capability::new(
                    "basic",
                    "Get basic information about an IP address",
                    "/json",
                ),
                Capability::new(
                    "geo",
                    "Get detailed geolocation data for an IP address",
                    "/geo",
                ),
                Capability::new(
                    "asn",
                    "Get ASN (Autonomous System Number) information for an IP address",
                    "/asn",
                ),
            ],
        );
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_capabilities_get_an_implicit_default() {
        let p = PluginDescriptor::new(PluginId::new(1), "t", "d", "http://x", vec![]);
        assert_eq!(p.capabilities().len(), 1);
        assert_eq!(p.first_capability().name, "default");
        assert!(!p.has_sub_selection());
    }

    #[test]
    fn registration_assigns_sequential_ids() {
        let mut reg = PluginRegistry::new();
        let a = reg.register("a", "first tool", "http://a", vec![]);
        let b = reg.register("b", "second tool", "http://b", vec![]);
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert_eq!(reg.get(a).unwrap().name, "a");
        assert!(reg.get(PluginId::new(99)).is_none());
    }

    #[test]
    fn builtin_ipinfo_has_three_capabilities() {
        let reg = PluginRegistry::with_builtins();
        let ipinfo = reg.iter().next().unwrap();
        assert_eq!(ipinfo.name, "IPinfo");
        assert!(ipinfo.has_sub_selection());
        assert_eq!(ipinfo.capability("geo").unwrap().path, "/geo");
        assert_eq!(ipinfo.first_capability().name, "basic");
    }
}
