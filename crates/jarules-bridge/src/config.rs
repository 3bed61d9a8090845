//! Bridge configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use jarules_worker_sdk::WorkerCommand;

/// A named unit of worker work, resolved to a script file by `BridgeConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerTask {
    ListModels,
    GetActiveModel,
    SetActiveModel,
    SendPrompt,
    HistoryLoad,
    HistorySave,
    HistoryClear,
    CheckPythonEnvironment,
    CheckConfigFiles,
    CheckLlmConnectivity,
    GetFileContent,
    CreateZipArchive,
}

impl WorkerTask {
    /// Script shipped with the agent for this task.
    pub fn default_script(&self) -> &'static str {
        match self {
            Self::ListModels => "get_available_models_wrapper.py",
            Self::GetActiveModel => "get_active_model_wrapper.py",
            Self::SetActiveModel => "set_active_model_wrapper.py",
            Self::SendPrompt => "send_prompt_wrapper.py",
            Self::HistoryLoad => "get_chat_history_wrapper.py",
            Self::HistorySave => "save_chat_message_wrapper.py",
            Self::HistoryClear => "clear_chat_history_wrapper.py",
            Self::CheckPythonEnvironment => "check_python_environment_wrapper.py",
            Self::CheckConfigFiles => "check_config_files_wrapper.py",
            Self::CheckLlmConnectivity => "check_llm_connectivity_wrapper.py",
            Self::GetFileContent => "get_file_content_wrapper.py",
            Self::CreateZipArchive => "create_zip_archive_wrapper.py",
        }
    }
}

/// One entry of the diagnostics batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticTask {
    /// Id given to a synthesized result when the check cannot report itself.
    pub id: String,
    /// Display name for synthesized results.
    pub name: String,
    pub script: String,
}

impl DiagnosticTask {
    pub fn new(id: impl Into<String>, name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            script: script.into(),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Program used to launch worker scripts.
    pub interpreter: String,

    /// Arguments placed before the script path.
    pub interpreter_args: Vec<String>,

    /// Working directory for every worker.
    pub scripts_dir: PathBuf,

    /// File returned by `get-config`.
    pub config_file: PathBuf,

    /// Silence allowed from a streaming worker before it is killed.
    pub stream_idle_timeout: Option<Duration>,

    /// Ordered diagnostics batch.
    pub diagnostics: Vec<DiagnosticTask>,

    /// Per-task script overrides.
    pub scripts: HashMap<WorkerTask, String>,
}

impl BridgeConfig {
    /// Script file for `task`.
    pub fn script(&self, task: WorkerTask) -> &str {
        self.scripts
            .get(&task)
            .map(String::as_str)
            .unwrap_or_else(|| task.default_script())
    }

    /// Point `task` at a different script.
    pub fn with_script(mut self, task: WorkerTask, script: impl Into<String>) -> Self {
        self.scripts.insert(task, script.into());
        self
    }

    /// Process template shared by all workers.
    pub fn worker_command(&self) -> WorkerCommand {
        WorkerCommand::new(self.interpreter.clone())
            .with_interpreter_args(self.interpreter_args.iter().cloned())
            .with_scripts_dir(self.scripts_dir.clone())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string()],
            scripts_dir: PathBuf::from("jarules_agent/electron_bridge"),
            config_file: PathBuf::from("config/llm_config.yaml"),
            stream_idle_timeout: Some(Duration::from_secs(120)),
            diagnostics: vec![
                DiagnosticTask::new(
                    "python_env",
                    "Python Environment",
                    WorkerTask::CheckPythonEnvironment.default_script(),
                ),
                DiagnosticTask::new(
                    "config_files",
                    "Configuration Files",
                    WorkerTask::CheckConfigFiles.default_script(),
                ),
                DiagnosticTask::new(
                    "llm_connectivity",
                    "LLM Connectivity",
                    WorkerTask::CheckLlmConnectivity.default_script(),
                ),
            ],
            scripts: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scripts() {
        let config = BridgeConfig::default();
        assert_eq!(config.script(WorkerTask::SendPrompt), "send_prompt_wrapper.py");
        assert_eq!(config.diagnostics.len(), 3);
        assert_eq!(config.diagnostics[1].script, "check_config_files_wrapper.py");
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_script_override() {
        let config = BridgeConfig::default().with_script(WorkerTask::ListModels, "models.sh");
        assert_eq!(config.script(WorkerTask::ListModels), "models.sh");
        assert_eq!(config.script(WorkerTask::HistoryLoad), "get_chat_history_wrapper.py");
    }

    #[test]
    fn test_worker_command() {
        let config = BridgeConfig {
            interpreter: "sh".to_string(),
            scripts_dir: PathBuf::from("/tmp/workers"),
            ..Default::default()
        };
        let command = config.worker_command();
        assert_eq!(command.interpreter(), "sh");
        assert_eq!(command.scripts_dir(), std::path::Path::new("/tmp/workers"));
    }
}
