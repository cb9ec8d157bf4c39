use thiserror::Error;

/// Every failure the control panel can report. None of these are fatal;
/// each ends up as an inline notice next to the control that caused it.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("Exchange API keys are not set. Please set the access and secret keys.")]
    MissingExchangeKeys,

    #[error("Model API key is not set. Please set it before starting the agent.")]
    MissingModelKey,

    #[error("Invalid input for {field}: {value:?}. Please enter positive whole numbers only.")]
    InvalidInput { field: &'static str, value: String },

    #[error("{action} is not available while the agent is {state}")]
    ActionUnavailable {
        action: &'static str,
        state: &'static str,
    },

    #[error("Failed to {0} the agent.")]
    AgentOperation(&'static str),

    #[error("Failed to create the agent: {0}")]
    AgentConstruction(#[source] anyhow::Error),
}

pub type PanelResult<T> = Result<T, PanelError>;
