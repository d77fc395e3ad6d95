use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidValue,
    ConfigParseFailed,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    SiteNotFound,
    EnvironmentNotFound,
    TaskNotFound,
    RepoNotFound,
    TemplateNotFound,

    SshIdentityFileNotFound,
    SshConnectFailed,

    RemoteCommandFailed,
    GitCommandFailed,

    TaskAborted,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigParseFailed => "config.parse_failed",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::SiteNotFound => "site.not_found",
            ErrorCode::EnvironmentNotFound => "environment.not_found",
            ErrorCode::TaskNotFound => "task.not_found",
            ErrorCode::RepoNotFound => "repo.not_found",
            ErrorCode::TemplateNotFound => "template.not_found",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::GitCommandFailed => "git.command_failed",

            ErrorCode::TaskAborted => "task.aborted",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigParseFailedDetails {
    pub path: String,
    pub format: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub host: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAbortedDetails {
    pub reason: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let details = serde_json::to_value(MissingArgumentDetails { args })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn site_not_found(path: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::SiteNotFound, "Site definition not found", path, Vec::new())
            .with_hint("Create invenio-deploy.json in the working directory or pass --site <file>")
    }

    pub fn environment_not_found(id: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::not_found(
            ErrorCode::EnvironmentNotFound,
            "Environment not defined",
            id,
            suggestions,
        )
        .with_hint("Run 'invdeploy env list' to see defined environments")
    }

    pub fn task_not_found(id: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::not_found(ErrorCode::TaskNotFound, "Task not found", id, suggestions)
            .with_hint("Run 'invdeploy tasks' to see available tasks")
    }

    pub fn repo_not_found(id: impl Into<String>, known: Vec<String>) -> Self {
        let id = id.into();
        let message = format!("{} is not a valid repository.", id);
        Self::not_found(ErrorCode::RepoNotFound, message, id, known)
    }

    pub fn template_not_found(name: impl Into<String>, searched: Vec<String>) -> Self {
        let name = name.into();
        let message = format!("Could not find template {}", name);
        Self::not_found(ErrorCode::TemplateNotFound, message, name, searched)
    }

    fn not_found(
        code: ErrorCode,
        message: impl Into<String>,
        id: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        let details = serde_json::to_value(NotFoundDetails {
            id: id.into(),
            suggestions,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(code, message, details)
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(SshIdentityFileNotFoundDetails {
            host: host.into(),
            identity_file: identity_file.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            details,
        )
    }

    pub fn ssh_connect_failed(host: impl Into<String>, error: impl Into<String>) -> Self {
        let mut err = Self::new(
            ErrorCode::SshConnectFailed,
            "SSH connection failed",
            serde_json::json!({ "host": host.into(), "error": error.into() }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let details =
            serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::RemoteCommandFailed,
            "Remote command failed",
            details,
        )
    }

    pub fn git_command_failed(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::GitCommandFailed,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    /// Abort the running task with a message for the operator.
    pub fn task_aborted(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let details = serde_json::to_value(TaskAbortedDetails {
            reason: reason.clone(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::TaskAborted, reason, details)
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let details = serde_json::to_value(ConfigMissingKeyDetails {
            key: key.into(),
            path,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ConfigMissingKey,
            "Missing required configuration key",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn config_parse_failed(
        path: impl Into<String>,
        format: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(ConfigParseFailedDetails {
            path: path.into(),
            format: format.into(),
            error: error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ConfigParseFailed,
            "Could not parse configuration file",
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::to_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::to_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_aborted_uses_reason_as_message() {
        let err = Error::task_aborted("Cannot continue");
        assert_eq!(err.code, ErrorCode::TaskAborted);
        assert_eq!(err.message, "Cannot continue");
        assert_eq!(err.details["reason"], "Cannot continue");
    }

    #[test]
    fn repo_not_found_lists_known_repos() {
        let err = Error::repo_not_found("inspire", vec!["invenio".to_string()]);
        assert_eq!(err.message, "inspire is not a valid repository.");
        assert_eq!(err.details["suggestions"][0], "invenio");
    }

    #[test]
    fn not_found_omits_empty_suggestions() {
        let err = Error::task_not_found("nope", Vec::new());
        assert!(err.details.get("suggestions").is_none());
        assert_eq!(err.hints.len(), 1);
    }
}
