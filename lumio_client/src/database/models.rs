use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStateRecord {
    pub key: String,
    pub value: String,
    pub updated_at: Option<String>,
}
