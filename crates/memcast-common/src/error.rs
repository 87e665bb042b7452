use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl CommonError {
    pub fn internal(message: impl Into<String>) -> Self {
        CommonError::InternalError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommonError::InvalidConfig("missing field `hosts`".to_string()).to_string(),
            "invalid configuration: missing field `hosts`"
        );
        assert_eq!(
            CommonError::internal("no runtime").to_string(),
            "internal error: no runtime"
        );
    }
}
