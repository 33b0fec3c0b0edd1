#![forbid(unsafe_code)]

//! Record shapes stored in the `associations` and `clubs` collections.

mod association;
mod club;
pub mod settings;

pub use association::{Association, Contact, DetailsPatch, NewAssociation};
pub use club::Club;
pub use settings::{
    AssociationSettings, AssociationSettingsInput, Branding, BrandingInput, FeeSchedule,
    FeeScheduleInput, MembershipSettings, MembershipSettingsInput, SettingsDefaults,
    SETTINGS_SCHEMA_VERSION,
};
