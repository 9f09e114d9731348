//! Inheritance plan documents
//!
//! A plan is serialized to JSON and carried as a `RawInstruction`, so it goes
//! through the same encryption and sharing pipeline as any uploaded file.

use serde::{Deserialize, Serialize};

use crate::error::SeqretsResult;
use crate::types::RawInstruction;

pub const INHERITANCE_PLAN_VERSION: u32 = 1;
pub const INHERITANCE_PLAN_FILENAME: &str = "inheritance-plan.json";
pub const INHERITANCE_PLAN_FILETYPE: &str = "application/json";

const DEFAULT_RESTORE_STEPS: &str = "\
1. Download seQRets from seqrets.app or use the web app.
2. Open the app and click \"Restore Secret\".
3. Gather the required Qards from the locations listed in the Qard Locations section.
4. Import the Qards (scan QR, drag & drop, smart card, vault file, or paste text).
5. Enter the password from the Recovery Credentials section of this plan.
6. If a keyfile was used, toggle \"Was a Keyfile used?\" and load it from the location listed.
7. Click \"Restore Secret\".
8. Write down the restored secret on paper immediately. Do not save it digitally.
9. Use the restored secret to access your assets per the Digital Asset Inventory.
10. After securing all assets, delete all unencrypted copies of this document.";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    pub prepared_by: String,
    pub date_created: String,
    pub last_updated: String,
    pub review_schedule: String,
}

/// Where the credentials live. The password itself is recorded in the plan
/// because the plan is only ever stored encrypted.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCredentials {
    pub password: String,
    pub keyfile_primary_location: String,
    pub keyfile_backup_location: String,
}

impl std::fmt::Debug for RecoveryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCredentials")
            .field("password", &"[REDACTED]")
            .field("keyfile_primary_location", &self.keyfile_primary_location)
            .field("keyfile_backup_location", &self.keyfile_backup_location)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QardLocation {
    pub id: String,
    pub qard_number: u32,
    pub location: String,
    pub held_by: String,
    pub access_notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QardConfig {
    /// Human form of the sharing scheme, e.g. "2-of-3"
    pub configuration: String,
    pub label: String,
    pub locations: Vec<QardLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalAsset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    pub platform: String,
    pub login_email: String,
    pub approx_value: String,
    pub two_factor_method: String,
    pub recovery_seed: String,
    pub special_instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalContact {
    pub id: String,
    pub role: String,
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritancePlan {
    pub version: u32,
    pub plan_info: PlanInfo,
    pub recovery_credentials: RecoveryCredentials,
    pub qard_config: QardConfig,
    pub digital_assets: Vec<DigitalAsset>,
    pub how_to_restore: String,
    pub professional_contacts: Vec<ProfessionalContact>,
    pub personal_message: String,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Today's date (UTC) in `YYYY-MM-DD` form.
pub fn today() -> String {
    time::OffsetDateTime::now_utc().date().to_string()
}

impl InheritancePlan {
    /// A blank 2-of-3 plan dated `today` with the default restore steps.
    pub fn blank(today: &str) -> Self {
        let locations = (1..=3)
            .map(|n| QardLocation {
                id: new_id(),
                qard_number: n,
                location: String::new(),
                held_by: String::new(),
                access_notes: String::new(),
            })
            .collect();

        let professional_contacts = ["Estate Attorney", "Financial Advisor", "Technical Contact"]
            .into_iter()
            .map(|role| ProfessionalContact {
                id: new_id(),
                role: role.to_string(),
                ..Default::default()
            })
            .collect();

        Self {
            version: INHERITANCE_PLAN_VERSION,
            plan_info: PlanInfo {
                prepared_by: String::new(),
                date_created: today.to_string(),
                last_updated: today.to_string(),
                review_schedule: "Every 6 months".into(),
            },
            recovery_credentials: RecoveryCredentials::default(),
            qard_config: QardConfig {
                configuration: "2-of-3".into(),
                label: String::new(),
                locations,
            },
            digital_assets: vec![DigitalAsset {
                id: new_id(),
                ..Default::default()
            }],
            how_to_restore: DEFAULT_RESTORE_STEPS.into(),
            professional_contacts,
            personal_message: String::new(),
        }
    }

    /// Serialize into a `RawInstruction` ready for the instruction cipher.
    pub fn to_raw_instruction(&self) -> SeqretsResult<RawInstruction> {
        let json = serde_json::to_vec(self)
            .map_err(|e| crate::SeqretsError::Format(format!("plan serialization: {e}")))?;
        Ok(RawInstruction::from_bytes(
            INHERITANCE_PLAN_FILENAME,
            &json,
            INHERITANCE_PLAN_FILETYPE,
        ))
    }

    /// Parse a decrypted instruction back into a plan.
    ///
    /// Returns `None` when the instruction is not a plan or fails to parse.
    pub fn from_raw_instruction(instruction: &RawInstruction) -> Option<Self> {
        if !is_inheritance_plan(instruction) {
            return None;
        }
        let bytes = instruction.content_bytes().ok()?;
        let plan: InheritancePlan = serde_json::from_slice(&bytes).ok()?;
        (plan.version >= 1).then_some(plan)
    }
}

/// Whether a decrypted instruction is an in-app plan rather than an uploaded file.
pub fn is_inheritance_plan(instruction: &RawInstruction) -> bool {
    instruction.file_name == INHERITANCE_PLAN_FILENAME
        && instruction.file_type == INHERITANCE_PLAN_FILETYPE
}
