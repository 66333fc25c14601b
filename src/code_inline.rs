//! Inline JavaScript and Jsonnet sources into an integration definition.
//!
//! The scaffold keeps task code in separate files (`src/javascript/javascript_<n>.js`,
//! `src/datatransformer/datatransformer_<n>.jsonnet`). Before a version is
//! created the code is read back and written into the matching task of the
//! integration body. The source is stored as is; JSON serialization of the
//! body escapes newlines and quotes, so the decoded `stringValue` equals the file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ApplyError;
use crate::locate::locate_files;

/// Task types whose code lives outside the integration definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskType {
    JavaScript,
    JsonnetMapper,
}

impl TaskType {
    pub const ALL: [TaskType; 2] = [TaskType::JavaScript, TaskType::JsonnetMapper];

    /// Task name as it appears in `taskConfigs[].task`.
    pub fn task_name(self) -> &'static str {
        match self {
            TaskType::JavaScript => "JavaScriptTask",
            TaskType::JsonnetMapper => "JsonnetMapperTask",
        }
    }

    pub fn from_task_name(name: &str) -> Option<Self> {
        TaskType::ALL.into_iter().find(|t| t.task_name() == name)
    }

    /// Task parameter holding the code.
    pub fn parameter(self) -> &'static str {
        match self {
            TaskType::JavaScript => "script",
            TaskType::JsonnetMapper => "template",
        }
    }

    fn file_pattern(self) -> &'static Regex {
        static JAVASCRIPT: OnceLock<Regex> = OnceLock::new();
        static JSONNET: OnceLock<Regex> = OnceLock::new();
        match self {
            TaskType::JavaScript => JAVASCRIPT.get_or_init(|| {
                Regex::new(r"^javascript_(\d{1,2})\.js$").expect("static pattern")
            }),
            TaskType::JsonnetMapper => JSONNET.get_or_init(|| {
                Regex::new(r"^datatransformer_(\d{1,2})\.jsonnet$").expect("static pattern")
            }),
        }
    }

    /// Ordinal encoded in a code file name, if the name follows the convention.
    pub fn ordinal(self, file_name: &str) -> Option<String> {
        self.file_pattern()
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Task type → ordinal → file source. Both buckets are always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMap {
    buckets: BTreeMap<TaskType, BTreeMap<String, String>>,
}

impl Default for CodeMap {
    fn default() -> Self {
        CodeMap {
            buckets: TaskType::ALL
                .into_iter()
                .map(|t| (t, BTreeMap::new()))
                .collect(),
        }
    }
}

impl CodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: TaskType, ordinal: impl Into<String>, code: impl Into<String>) {
        self.buckets
            .entry(task)
            .or_default()
            .insert(ordinal.into(), code.into());
    }

    pub fn get(&self, task: TaskType, ordinal: &str) -> Option<&str> {
        self.buckets
            .get(&task)
            .and_then(|bucket| bucket.get(ordinal))
            .map(String::as_str)
    }

    pub fn bucket(&self, task: TaskType) -> Option<&BTreeMap<String, String>> {
        self.buckets.get(&task)
    }

    /// Number of inlined files across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    /// True when no bucket holds any code.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read all code files from the two code folders. Missing folders contribute nothing.
pub fn build_code_map(javascript_dir: &Path, jsonnet_dir: &Path) -> Result<CodeMap, ApplyError> {
    let mut code_map = CodeMap::new();

    for (task, dir) in [
        (TaskType::JavaScript, javascript_dir),
        (TaskType::JsonnetMapper, jsonnet_dir),
    ] {
        let files = match locate_files(dir, |name| task.ordinal(name).is_some())? {
            Some(files) => files,
            None => continue,
        };
        for file in files {
            let Some(ordinal) = task.ordinal(&file.file_name) else {
                continue;
            };
            info!(task = task.task_name(), file = %file.file_name, "Found code file for integration");
            let source = std::fs::read_to_string(&file.path)
                .map_err(|e| ApplyError::io(&file.path, e))?;
            code_map.insert(task, ordinal, source);
        }
    }

    debug!(files = code_map.len(), "Built code map");
    Ok(code_map)
}

/// Write inlined code into the matching `taskConfigs` entries of an integration body.
///
/// Tasks are matched on `task` and `taskId`; everything else in the body is left as is.
pub fn set_code(body: &[u8], code_map: &CodeMap) -> Result<Vec<u8>, ApplyError> {
    let mut doc: Value = serde_json::from_slice(body).map_err(|source| ApplyError::Json {
        context: "integration definition".to_string(),
        source,
    })?;

    if let Some(tasks) = doc.get_mut("taskConfigs").and_then(Value::as_array_mut) {
        for task in tasks.iter_mut() {
            let task_type = task
                .get("task")
                .and_then(Value::as_str)
                .and_then(TaskType::from_task_name);
            let task_id = task
                .get("taskId")
                .and_then(Value::as_str)
                .map(str::to_owned);
            let (Some(task_type), Some(task_id)) = (task_type, task_id) else {
                continue;
            };
            let Some(code) = code_map.get(task_type, &task_id) else {
                continue;
            };
            let Some(task_obj) = task.as_object_mut() else {
                continue;
            };

            let param = task_type.parameter();
            let params = task_obj
                .entry("parameters")
                .or_insert_with(|| json!({}));
            if let Some(params) = params.as_object_mut() {
                let entry = params
                    .entry(param)
                    .or_insert_with(|| json!({ "key": param }));
                if let Some(entry) = entry.as_object_mut() {
                    entry.insert("value".to_string(), json!({ "stringValue": code }));
                    debug!(task = task_type.task_name(), task_id = %task_id, "Inlined task code");
                }
            }
        }
    }

    serde_json::to_vec(&doc).map_err(|source| ApplyError::Json {
        context: "integration definition".to_string(),
        source,
    })
}
