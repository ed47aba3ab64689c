use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mentor or student profile. One per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub subjects: Vec<String>,
    pub availability: Option<String>,
}

/// Replacement payload for a profile upsert. The write is wholesale: fields
/// absent from the payload clear their column, they do not merge.
#[derive(Debug, Clone)]
pub struct ProfileData {
    pub bio: Option<String>,
    pub subjects: Vec<String>,
    pub availability: Option<String>,
}
