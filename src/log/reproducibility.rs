/// Reproducibility logging
///
/// Every reconstruction and pick is recorded with:
/// - Timestamp
/// - Operation and a short description of the outcome
/// - The equivalent `nmr-nus` command line
/// - The full parameter set as JSON
///
/// The log can be exported as human-readable text, JSON, or a shell script
/// that reruns the same commands.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// One recorded operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sequential operation number (1-based)
    pub sequence: usize,
    pub timestamp: DateTime<Local>,
    pub operation: String,
    pub description: String,
    /// Equivalent `nmr-nus` invocation
    pub command: String,
    pub parameters: serde_json::Value,
}

impl LogEntry {
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "[{:03}] {} | {} | {}\n      Command: {}",
            self.sequence,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.operation,
            self.description,
            if self.command.is_empty() {
                "(n/a)"
            } else {
                &self.command
            }
        );
        if !self.parameters.is_null() {
            out.push_str(&format!("\n      Parameters: {}", self.parameters));
        }
        out
    }

    pub fn to_shell_line(&self) -> String {
        if self.command.is_empty() {
            format!("# Step {}: {}: {}", self.sequence, self.operation, self.description)
        } else {
            format!(
                "# Step {}: {}: {}\n{}",
                self.sequence, self.operation, self.description, self.command
            )
        }
    }
}

/// Ordered record of everything a session did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproLog {
    pub session_id: String,
    pub session_start: DateTime<Local>,
    /// Input files, in the order they were first used
    pub sources: Vec<String>,
    pub software_version: String,
    pub entries: Vec<LogEntry>,
}

impl ReproLog {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            session_start: Local::now(),
            sources: Vec::new(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            entries: Vec::new(),
        }
    }

    pub fn add_source(&mut self, source: &str) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }

    /// Record an operation. `parameters` is serialized as-is; a value that
    /// fails to serialize is logged as null.
    pub fn add_entry<P: Serialize>(
        &mut self,
        operation: &str,
        description: &str,
        command: &str,
        parameters: &P,
    ) {
        let seq = self.entries.len() + 1;
        let parameters = serde_json::to_value(parameters).unwrap_or_else(|e| {
            log::warn!("could not record parameters for {}: {}", operation, e);
            serde_json::Value::Null
        });
        self.entries.push(LogEntry {
            sequence: seq,
            timestamp: Local::now(),
            operation: operation.to_string(),
            description: description.to_string(),
            command: command.to_string(),
            parameters,
        });
        log::info!("[LOG {:03}] {}: {}", seq, operation, description);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str("  NUS Processing Reproducibility Log\n");
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str(&format!("  Session ID:  {}\n", self.session_id));
        out.push_str(&format!(
            "  Started:     {}\n",
            self.session_start.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("  Sources:     {}\n", self.sources.join(", ")));
        out.push_str(&format!("  Software:    nmr-nus v{}\n", self.software_version));
        out.push_str(&format!("  Operations:  {}\n", self.entries.len()));
        out.push_str("───────────────────────────────────────────────────────────────\n\n");

        for entry in &self.entries {
            out.push_str(&entry.to_text());
            out.push_str("\n\n");
        }

        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_shell_script(&self) -> String {
        let mut out = String::new();
        out.push_str("#!/bin/bash\n");
        out.push_str("#\n");
        out.push_str("# NUS Processing Reproducibility Script\n");
        out.push_str(&format!("# Generated by nmr-nus v{}\n", self.software_version));
        out.push_str(&format!(
            "# Session: {} ({})\n",
            self.session_id,
            self.session_start.format("%Y-%m-%d %H:%M:%S")
        ));
        for source in &self.sources {
            out.push_str(&format!("# Source: {}\n", source));
        }
        out.push_str("#\n");
        out.push_str("# Requirements: nmr-nus must be installed and in PATH.\n");
        out.push_str("#\n");
        out.push_str("set -euo pipefail\n\n");

        for entry in &self.entries {
            out.push_str(&entry.to_shell_line());
            out.push_str("\n\n");
        }

        out.push_str("echo \"Processing complete.\"\n");
        out
    }

    /// Save by extension: `.json`, `.sh`, anything else as text.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.save_json(path),
            Some("sh") => self.save_script(path),
            _ => self.save_text(path),
        }
    }

    pub fn save_text(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    pub fn save_json(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_json()?)
    }

    pub fn save_script(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_shell_script())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

impl Default for ReproLog {
    fn default() -> Self {
        Self::new()
    }
}
