/// Error raised when shared wire values fail validation.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_contains_message() {
        let err = ParleyError::Validation("bad input".into());
        assert_eq!(err.to_string(), "validation error: bad input");
    }
}
