/// Write-side row types for the ledgers. Read paths return `park_types`
/// models directly.

/// A member as seen in the live participant listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveMember {
    pub id: i64,
    pub name: String,
}

/// Outcome of one membership reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub joined: usize,
    pub departed: usize,
    pub rejoined: usize,
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.joined == 0 && self.departed == 0 && self.rejoined == 0
    }
}

/// A freshly harvested tagged message, not yet in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComingOut {
    pub msg_id: i64,
    pub user_id: i64,
    pub msg_date: i64,
    pub msg_text: String,
    pub building_num: i64,
    pub floor_num: i64,
}

/// Latest tagged message of a current member in one building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingPost {
    pub user_id: i64,
    pub msg_id: i64,
}
