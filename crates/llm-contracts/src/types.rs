// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout error")]
    Timeout,
}

pub type LLMResult<T> = Result<T, LLMError>;

impl LLMError {
    /// True when the failure came from reaching the collaborator rather than from its output.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LLMError::Network(_) | LLMError::Timeout | LLMError::Unavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_classified() {
        assert!(LLMError::Timeout.is_transport());
        assert!(LLMError::Network("refused".into()).is_transport());
        assert!(LLMError::Unavailable("503".into()).is_transport());
        assert!(!LLMError::Provider("400 bad request".into()).is_transport());
        assert!(!LLMError::Serialisation("bad json".into()).is_transport());
    }
}
