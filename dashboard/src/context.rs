use crate::error::{DashboardError, Result};
use irrigation_shared::api::UserSession;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionLocation {
    pub region_name: String,
    pub center: LatLng,
}

/// Known hub regions and the one currently selected.
#[derive(Debug, Clone)]
pub struct HubRegistry {
    regions: Vec<RegionLocation>,
    selected: Option<usize>,
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new(vec![RegionLocation {
            region_name: "Arusha".to_string(),
            center: LatLng {
                lat: -3.372_157_722_213_181_3,
                lng: 36.694_529_011_016_684,
            },
        }])
    }
}

impl HubRegistry {
    pub fn new(regions: Vec<RegionLocation>) -> Self {
        Self {
            regions,
            selected: None,
        }
    }

    /// Selects by exact region name. An unknown name keeps the previous
    /// selection.
    pub fn select_hub(&mut self, region_name: &str) -> Option<&RegionLocation> {
        match self.regions.iter().position(|r| r.region_name == region_name) {
            Some(idx) => {
                self.selected = Some(idx);
                self.regions.get(idx)
            }
            None => {
                log::warn!("hub with region name {region_name:?} not found");
                None
            }
        }
    }

    pub fn selected(&self) -> Option<&RegionLocation> {
        self.selected.and_then(|i| self.regions.get(i))
    }
}

/// Who is looking at which machine. Passed into the dashboard explicitly.
#[derive(Debug, Clone)]
pub struct DashboardContext {
    pub session: UserSession,
    pub hub: Option<RegionLocation>,
}

impl DashboardContext {
    /// Gate for protected views: no session, no context.
    pub fn require(session: Option<UserSession>) -> Result<Self> {
        let session = session.ok_or(DashboardError::NotLoggedIn)?;
        Ok(Self { session, hub: None })
    }

    /// Picks the hub matching the user's location, if there is one.
    pub fn with_hub(mut self, hubs: &mut HubRegistry) -> Self {
        self.hub = hubs.select_hub(&self.session.location_user).cloned();
        self
    }

    pub fn machine_id(&self) -> &str {
        &self.session.machine_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(location: &str) -> UserSession {
        UserSession {
            user_id: "u1".into(),
            fname: "Ana".into(),
            lname: String::new(),
            hub: "Main Hub".into(),
            location_user: location.into(),
            email: "ana@farm.io".into(),
            role: "admin".into(),
            machine_id: "m-9".into(),
            permissions: vec![],
        }
    }

    #[test]
    fn protected_views_need_a_session() {
        assert!(matches!(
            DashboardContext::require(None),
            Err(DashboardError::NotLoggedIn)
        ));
        let ctx = DashboardContext::require(Some(session("Arusha"))).unwrap();
        assert_eq!(ctx.machine_id(), "m-9");
    }

    #[test]
    fn hub_follows_user_location() {
        let mut hubs = HubRegistry::default();
        let ctx = DashboardContext::require(Some(session("Arusha")))
            .unwrap()
            .with_hub(&mut hubs);
        assert_eq!(ctx.hub.as_ref().map(|h| h.region_name.as_str()), Some("Arusha"));
        assert!(hubs.selected().is_some());

        let ctx = DashboardContext::require(Some(session("Mwanza")))
            .unwrap()
            .with_hub(&mut hubs);
        assert!(ctx.hub.is_none());
        // unknown name leaves the old selection alone
        assert_eq!(hubs.selected().map(|h| h.region_name.as_str()), Some("Arusha"));
    }
}
