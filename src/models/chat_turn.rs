use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ChatRoute;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user_id: String,
    pub question: String,
    pub answer: String,
    pub route: ChatRoute,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}
