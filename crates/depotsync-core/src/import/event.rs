// Wizard step and event vocabulary.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Steps of the bank-import wizard, in forward order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
    IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStep {
    Country,
    Bank,
    BankBranch,
    Interface,
    Authenticate,
    Importing,
    Finished,
}

impl ImportStep {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Country => 0,
            Self::Bank => 1,
            Self::BankBranch => 2,
            Self::Interface => 3,
            Self::Authenticate => 4,
            Self::Importing => 5,
            Self::Finished => 6,
        }
    }

    /// Event announcing that the wizard arrived at this step.
    ///
    /// Arriving at a step means the previous one was completed, hence
    /// `Bank` maps to `SelectCountry`. Later steps have no event.
    pub fn event(self) -> Option<ImportEventType> {
        match self {
            Self::Country => Some(ImportEventType::ContinueIntro),
            Self::Bank => Some(ImportEventType::SelectCountry),
            Self::BankBranch => Some(ImportEventType::SelectBank),
            Self::Interface => Some(ImportEventType::SelectBankBranch),
            Self::Authenticate => Some(ImportEventType::SelectInterface),
            Self::Importing | Self::Finished => None,
        }
    }
}

/// `type` values of frames sent to an import session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportEventType {
    ContinueIntro,
    SelectCountry,
    SelectBank,
    SelectBankBranch,
    SelectInterface,
    GoBack,
    CloseImportModal,
    ManualImport,
    AuthenticationFailed,
    SuccessfulImport,
    SecapiImportError,
    ImportStarted,
    AssociateReplayId,
}

impl ImportEventType {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn ordinals_follow_declaration_order() {
        let ordinals: Vec<u8> = ImportStep::iter().map(ImportStep::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn wire_names_are_screaming_snake() {
        assert_eq!(ImportStep::BankBranch.to_string(), "BANK_BRANCH");
        assert_eq!(ImportEventType::SecapiImportError.as_str(), "SECAPI_IMPORT_ERROR");
        assert_eq!(ImportEventType::AssociateReplayId.as_str(), "ASSOCIATE_REPLAY_ID");
        assert_eq!("AUTHENTICATE".parse::<ImportStep>(), Ok(ImportStep::Authenticate));
    }

    #[test]
    fn only_early_steps_have_events() {
        assert_eq!(ImportStep::Country.event(), Some(ImportEventType::ContinueIntro));
        assert_eq!(ImportStep::Interface.event(), Some(ImportEventType::SelectBankBranch));
        assert_eq!(ImportStep::Importing.event(), None);
        assert_eq!(ImportStep::Finished.event(), None);
    }
}
