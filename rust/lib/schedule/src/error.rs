use thiserror::Error;

/// Board consistency problems.
///
/// None of these abort a load: the board is installed as-is and the
/// offending operations are left out of row placement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("operation '{operation_id}' references unknown work center '{work_center_id}'")]
    UnknownWorkCenter {
        operation_id: String,
        work_center_id: String,
    },

    #[error("operation '{0}' ends at or before its start")]
    NonPositiveDuration(String),

    #[error("operation '{0}' has a negative quantity")]
    NegativeQuantity(String),

    #[error("duplicate work center id '{0}'")]
    DuplicateWorkCenter(String),

    #[error("duplicate operation id '{0}'")]
    DuplicateOperation(String),
}
