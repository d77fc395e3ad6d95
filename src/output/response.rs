//! CLI response formatting and output.
//!
//! Provides JSON envelope, printing, and exit code mapping.

use invenio_deploy::error::Hint;
use invenio_deploy::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

fn print_success<T: Serialize>(data: T) -> Result<()> {
    print_response(&CliResponse::success(data))
}

pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

/// Process exit code for an error, grouped by failure class.
fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ConfigParseFailed
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument => 2,

        ErrorCode::SiteNotFound
        | ErrorCode::EnvironmentNotFound
        | ErrorCode::TaskNotFound
        | ErrorCode::RepoNotFound
        | ErrorCode::TemplateNotFound => 4,

        ErrorCode::SshIdentityFileNotFound | ErrorCode::SshConnectFailed => 10,

        ErrorCode::RemoteCommandFailed | ErrorCode::GitCommandFailed => 20,

        ErrorCode::TaskAborted => 30,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

pub fn print_json_result(result: Result<serde_json::Value>) -> Result<()> {
    match result {
        Ok(data) => print_success(data),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes_map_to_exit_codes() {
        assert_eq!(exit_code_for_error(ErrorCode::ConfigParseFailed), 2);
        assert_eq!(exit_code_for_error(ErrorCode::TaskNotFound), 4);
        assert_eq!(exit_code_for_error(ErrorCode::SshConnectFailed), 10);
        assert_eq!(exit_code_for_error(ErrorCode::GitCommandFailed), 20);
        assert_eq!(exit_code_for_error(ErrorCode::TaskAborted), 30);
        assert_eq!(exit_code_for_error(ErrorCode::InternalUnexpected), 1);
    }

    #[test]
    fn failed_command_keeps_error_and_exit_code() {
        let result: Result<(u32, i32)> = Err(Error::task_aborted("Cannot continue"));
        let (json, code) = map_cmd_result_to_json(result);
        assert_eq!(code, 30);
        assert_eq!(json.unwrap_err().message, "Cannot continue");
    }

    #[test]
    fn error_envelope_omits_empty_hints() {
        let err = Error::task_aborted("stop");
        let value = serde_json::to_value(CliResponse::<()>::from_error(&err)).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "task.aborted");
        assert!(value["error"].get("hints").is_none());
        assert!(value.get("data").is_none());
    }
}
