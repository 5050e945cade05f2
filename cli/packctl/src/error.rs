//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create an API error from response details.
    pub fn api(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
            request_id,
        }
    }

    /// A follow-up suggestion for the operator, if there is one.
    fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Api { status: 503, .. } => Some(
                "No healthy node has enough free CPU. Add capacity with `packctl nodes add --cpu N`.",
            ),
            CliError::Api { status: 410, .. } => {
                Some("The node was declared dead. It can only rejoin by registering again.")
            }
            CliError::Api { code, .. } if code == "simulated_node_not_found" => {
                Some("Only nodes started with `packctl nodes launch` can be terminated.")
            }
            CliError::Network(_) => {
                Some("Check that the API server is running and --api-url points at it.")
            }
            _ => None,
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        if let Some(hint) = cli_err.hint() {
            eprintln!("\n{}", format!("Hint: {hint}").yellow());
        }
        if let CliError::Api {
            request_id: Some(request_id),
            ..
        } = cli_err
        {
            eprintln!("\nRequest ID: {}", request_id);
        }
    }
}
