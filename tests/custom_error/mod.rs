use std::error::Error;

#[derive(Debug, PartialEq)]
pub struct CustomError(pub &'static str);

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "custom error: {}", self.0)
    }
}

impl Error for CustomError {}
