//! Name filter
//!
//! Selects the working set for a batch by case-insensitive substring match.

use super::model::ManagedResource;

/// Return the resources whose name contains `query`, ignoring case.
///
/// An absent or empty query selects everything. The query is matched as
/// given, surrounding whitespace included. Input order is preserved.
pub fn filter_resources(resources: &[ManagedResource], query: Option<&str>) -> Vec<ManagedResource> {
    let query = query.unwrap_or_default();
    if query.is_empty() {
        return resources.to_vec();
    }

    let query_lower = query.to_lowercase();
    resources
        .iter()
        .filter(|res| res.name.to_lowercase().contains(&query_lower))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PowerState;

    fn inventory() -> Vec<ManagedResource> {
        vec![
            ManagedResource::new("vm-1", "web-01", PowerState::Off),
            ManagedResource::new("vm-2", "WEB-02", PowerState::On),
            ManagedResource::new("vm-3", "db-01", PowerState::On),
        ]
    }

    #[test]
    fn test_empty_query_returns_all() {
        assert_eq!(filter_resources(&inventory(), None).len(), 3);
        assert_eq!(filter_resources(&inventory(), Some("")).len(), 3);
    }

    #[test]
    fn test_whitespace_is_part_of_the_query() {
        let items = vec![
            ManagedResource::new("vm-1", "web-01", PowerState::On),
            ManagedResource::new("vm-2", "my web", PowerState::On),
        ];
        let names: Vec<String> = filter_resources(&items, Some(" web"))
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["my web"]);
        assert!(filter_resources(&inventory(), Some("   ")).is_empty());
    }

    #[test]
    fn test_query_is_case_insensitive() {
        let names: Vec<String> = filter_resources(&inventory(), Some("Web"))
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["web-01", "WEB-02"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(filter_resources(&inventory(), Some("cache")).is_empty());
    }
}
