//! Versioned business settings carried by every association.
//!
//! The engine never interprets these values. Defaults are resolved exactly once,
//! when an association is created, and stored alongside the record.

use serde::{Deserialize, Serialize};

/// Current layout version of [`AssociationSettings`].
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Membership and affiliation fees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// ISO 4217 currency code.
    pub currency: String,
    /// Yearly individual membership fee, in minor units.
    pub annual_membership_cents: u64,
    /// Yearly fee charged to each affiliated club, in minor units.
    pub club_affiliation_cents: u64,
    /// Surcharge applied to late renewals.
    pub late_surcharge_percent: u8,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            annual_membership_cents: 2_500,
            club_affiliation_cents: 15_000,
            late_surcharge_percent: 10,
        }
    }
}

/// Membership policy switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipSettings {
    /// Calendar month (1-12) on which the membership season starts.
    pub season_start_month: u8,
    /// Whether members may transfer between clubs mid-season.
    pub allow_transfers: bool,
    /// Whether registration requires a medical certificate.
    pub require_medical_certificate: bool,
    /// Minimum member age in years.
    pub minimum_age: u8,
}

impl Default for MembershipSettings {
    fn default() -> Self {
        Self {
            season_start_month: 9,
            allow_transfers: true,
            require_medical_certificate: false,
            minimum_age: 6,
        }
    }
}

/// Visual identity used by the rendering layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branding {
    /// Primary color as a CSS hex string.
    pub primary_color: String,
    /// Secondary color as a CSS hex string.
    pub secondary_color: String,
    /// Optional logo location.
    pub logo_url: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            primary_color: "#1f3a5f".to_string(),
            secondary_color: "#f2f2f2".to_string(),
            logo_url: None,
        }
    }
}

/// Fully resolved settings document stored with an association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSettings {
    /// Layout version, see [`SETTINGS_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// Fee schedule.
    pub fees: FeeSchedule,
    /// Membership policy.
    pub membership: MembershipSettings,
    /// Branding.
    pub branding: Branding,
}

impl Default for AssociationSettings {
    fn default() -> Self {
        SettingsDefaults::default().resolve(AssociationSettingsInput::default())
    }
}

/// Partially specified fee schedule supplied by a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeScheduleInput {
    /// See [`FeeSchedule::currency`].
    pub currency: Option<String>,
    /// See [`FeeSchedule::annual_membership_cents`].
    pub annual_membership_cents: Option<u64>,
    /// See [`FeeSchedule::club_affiliation_cents`].
    pub club_affiliation_cents: Option<u64>,
    /// See [`FeeSchedule::late_surcharge_percent`].
    pub late_surcharge_percent: Option<u8>,
}

/// Partially specified membership policy supplied by a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSettingsInput {
    /// See [`MembershipSettings::season_start_month`].
    pub season_start_month: Option<u8>,
    /// See [`MembershipSettings::allow_transfers`].
    pub allow_transfers: Option<bool>,
    /// See [`MembershipSettings::require_medical_certificate`].
    pub require_medical_certificate: Option<bool>,
    /// See [`MembershipSettings::minimum_age`].
    pub minimum_age: Option<u8>,
}

/// Partially specified branding supplied by a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingInput {
    /// See [`Branding::primary_color`].
    pub primary_color: Option<String>,
    /// See [`Branding::secondary_color`].
    pub secondary_color: Option<String>,
    /// See [`Branding::logo_url`].
    pub logo_url: Option<String>,
}

/// Settings as submitted on creation; every section and field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSettingsInput {
    /// Fee overrides.
    pub fees: Option<FeeScheduleInput>,
    /// Membership overrides.
    pub membership: Option<MembershipSettingsInput>,
    /// Branding overrides.
    pub branding: Option<BrandingInput>,
}

/// Fixed defaults used to fill absent settings at creation time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDefaults {
    /// Default fee schedule.
    pub fees: FeeSchedule,
    /// Default membership policy.
    pub membership: MembershipSettings,
    /// Default branding.
    pub branding: Branding,
}

impl SettingsDefaults {
    /// Merges caller input over the defaults, field by field.
    pub fn resolve(&self, input: AssociationSettingsInput) -> AssociationSettings {
        let fees = input.fees.unwrap_or_default();
        let membership = input.membership.unwrap_or_default();
        let branding = input.branding.unwrap_or_default();
        AssociationSettings {
            schema_version: SETTINGS_SCHEMA_VERSION,
            fees: FeeSchedule {
                currency: fees.currency.unwrap_or_else(|| self.fees.currency.clone()),
                annual_membership_cents: fees
                    .annual_membership_cents
                    .unwrap_or(self.fees.annual_membership_cents),
                club_affiliation_cents: fees
                    .club_affiliation_cents
                    .unwrap_or(self.fees.club_affiliation_cents),
                late_surcharge_percent: fees
                    .late_surcharge_percent
                    .unwrap_or(self.fees.late_surcharge_percent),
            },
            membership: MembershipSettings {
                season_start_month: membership
                    .season_start_month
                    .unwrap_or(self.membership.season_start_month),
                allow_transfers: membership
                    .allow_transfers
                    .unwrap_or(self.membership.allow_transfers),
                require_medical_certificate: membership
                    .require_medical_certificate
                    .unwrap_or(self.membership.require_medical_certificate),
                minimum_age: membership.minimum_age.unwrap_or(self.membership.minimum_age),
            },
            branding: Branding {
                primary_color: branding
                    .primary_color
                    .unwrap_or_else(|| self.branding.primary_color.clone()),
                secondary_color: branding
                    .secondary_color
                    .unwrap_or_else(|| self.branding.secondary_color.clone()),
                logo_url: branding.logo_url.or_else(|| self.branding.logo_url.clone()),
            },
        }
    }
}
