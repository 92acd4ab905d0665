use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    /// Key issued by the external provider (e.g. a Gumroad license key)
    pub external_key: String,
    /// Key generated locally for the purchase, if one was ever issued
    pub local_key: Option<String>,
    /// Purchase email (None for licenses synthesized from a verified key)
    pub email: Option<String>,
    pub purchased_at: i64,
    /// False once an administrator disables the license
    pub active: bool,
    /// Provider purchase/sale id; at most one license per purchase
    pub purchase_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLicense {
    pub external_key: String,
    #[serde(default)]
    pub local_key: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub purchase_id: Option<String>,
}
