use std::collections::HashMap;

use fg_core::PackageId;

use crate::ports::{DisplayNameResolver, PortError, PortResult};

/// Display names from the `[display_names]` config table.
#[derive(Debug, Clone, Default)]
pub struct TableDisplayNames {
    names: HashMap<String, String>,
}

impl TableDisplayNames {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }
}

impl DisplayNameResolver for TableDisplayNames {
    fn resolve(&self, package: &PackageId) -> PortResult<String> {
        self.names
            .get(package.as_str())
            .cloned()
            .ok_or_else(|| PortError::NotFound(package.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::display_name_or_package;

    #[test]
    fn test_lookup_and_fallback() {
        let names = TableDisplayNames::new(HashMap::from([(
            "org.mozilla.firefox".to_string(),
            "Firefox".to_string(),
        )]));

        assert_eq!(
            display_name_or_package(&names, &PackageId::new("org.mozilla.firefox")),
            "Firefox"
        );
        assert!(names.resolve(&PackageId::new("xterm")).is_err());
        assert_eq!(display_name_or_package(&names, &PackageId::new("xterm")), "xterm");
    }
}
