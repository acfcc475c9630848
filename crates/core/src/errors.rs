use thiserror::Error;

use crate::linking::LinkingTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LinkingError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error(transparent)]
    Transition(#[from] LinkingTransitionError),
}

impl LinkingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl LinkingError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<LinkingError> for InterfaceError {
    fn from(value: LinkingError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            LinkingError::Validation(message) => Self::BadRequest { message, correlation_id },
            LinkingError::Transition(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ LinkingError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            LinkingError::Persistence(message) | LinkingError::Network(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            LinkingError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
