//! Default dashboard templates per user role

use crate::types::{GridPosition, NewRegion, RegionType, UserRole};

fn tile(kind: &str, row: u32, col: u32, row_span: u32, col_span: u32) -> NewRegion {
    NewRegion::new(RegionType::from(kind), GridPosition::new(row, col, row_span, col_span)).with_widget(kind)
}

/// Regions a fresh dashboard starts with for `role`
pub fn role_defaults(role: UserRole) -> Vec<NewRegion> {
    match role {
        UserRole::Admin => vec![
            tile(RegionType::KPI, 0, 0, 2, 6),
            tile(RegionType::ANALYTICS, 0, 6, 4, 6),
            tile(RegionType::BILLING, 2, 0, 3, 6),
            tile(RegionType::REPORTS, 4, 6, 3, 6),
            tile(RegionType::ACTIVITY, 5, 0, 3, 6),
        ],
        UserRole::Manager => vec![
            tile(RegionType::KPI, 0, 0, 2, 12),
            tile(RegionType::SCHEDULE, 2, 0, 4, 8),
            tile(RegionType::ANALYTICS, 2, 8, 4, 4),
            tile(RegionType::REPORTS, 6, 0, 3, 12),
        ],
        UserRole::Technician => vec![
            tile(RegionType::SCHEDULE, 0, 0, 4, 8),
            tile(RegionType::ROUTES, 0, 8, 4, 4),
            tile(RegionType::KNOWLEDGE_BASE, 4, 0, 3, 12),
        ],
        UserRole::Dispatcher => vec![
            tile(RegionType::SCHEDULE, 0, 0, 5, 9),
            tile(RegionType::ROUTES, 0, 9, 5, 3),
            tile(RegionType::CUSTOMERS, 5, 0, 3, 6),
            tile(RegionType::ACTIVITY, 5, 6, 3, 6),
        ],
        UserRole::Sales => vec![
            tile(RegionType::CUSTOMERS, 0, 0, 4, 6),
            tile(RegionType::KPI, 0, 6, 2, 6),
            tile(RegionType::ANALYTICS, 2, 6, 4, 6),
            tile(RegionType::BILLING, 4, 0, 3, 6),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{overlaps, GridSpec};

    #[test]
    fn test_templates_fit_the_grid() {
        let spec = GridSpec::default();
        for role in UserRole::ALL {
            let regions = role_defaults(role);
            assert!(!regions.is_empty(), "{role} has no regions");
            for region in &regions {
                assert!(spec.contains(region.position), "{role}: {:?}", region.position);
            }
        }
    }

    #[test]
    fn test_templates_do_not_overlap() {
        for role in UserRole::ALL {
            let regions = role_defaults(role);
            for (i, a) in regions.iter().enumerate() {
                for b in &regions[i + 1..] {
                    assert!(
                        !overlaps(a.position, b.position),
                        "{role}: {} overlaps {}",
                        a.region_type,
                        b.region_type
                    );
                }
            }
        }
    }

    #[test]
    fn test_template_regions_start_expanded_and_unlocked() {
        let regions = role_defaults(UserRole::Technician);
        assert!(regions.iter().all(|r| !r.is_collapsed && !r.is_locked));
        assert_eq!(regions[0].widget_type.as_deref(), Some("schedule"));
    }
}
