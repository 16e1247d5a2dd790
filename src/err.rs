/// Every fallible path in the crate reports a `MalformErr`: a human readable
/// message, printed by `fatal!` in the binary or handed back through the C
/// ABI as a failed status
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformErr {
    message: String,
}

impl MalformErr {
    pub fn from(message: &str) -> Self {
        MalformErr {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn display(&self) {
        println!("{}", self.message);
    }
}

impl fmt::Display for MalformErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MalformErr {}
