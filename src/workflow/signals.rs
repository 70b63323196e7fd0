//! Auto-gate signal sources
//!
//! A signal is a named boolean. Sources answer only for the names they know;
//! a signal nobody reports is `false`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::fs::locking::with_exclusive_lock;

use super::process::run_shell;

pub type SignalMap = BTreeMap<String, bool>;

pub trait SignalSource {
    /// Report values for the requested names this source knows about.
    fn collect(&self, instance: &str, names: &[String]) -> EngineResult<SignalMap>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SignalDocument {
    #[serde(default)]
    signals: BTreeMap<String, bool>,
}

/// Signals recorded by hand (`phasegate signal`), one TOML file per instance.
#[derive(Debug, Clone)]
pub struct RecordedSignals {
    dir: PathBuf,
}

impl RecordedSignals {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, instance: &str) -> PathBuf {
        self.dir.join(format!("{instance}.toml"))
    }

    pub fn load(&self, instance: &str) -> EngineResult<SignalMap> {
        let path = self.path(instance);
        if !path.exists() {
            return Ok(SignalMap::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
        parse_document(&content).map(|doc| doc.signals)
    }

    pub fn record(&self, instance: &str, name: &str, value: bool) -> EngineResult<()> {
        let path = self.path(instance);
        with_exclusive_lock(&path, |current| {
            let mut doc = if current.trim().is_empty() {
                SignalDocument::default()
            } else {
                parse_document(current)?
            };
            doc.signals.insert(name.to_string(), value);
            let content = toml::to_string_pretty(&doc)
                .map_err(|e| EngineError::serialization("signals", e))?;
            Ok((Some(content), ()))
        })?;
        tracing::info!(instance, signal = name, value, "recorded signal");
        Ok(())
    }

    /// Drop every recorded signal for an instance.
    pub fn clear(&self, instance: &str) -> EngineResult<()> {
        let path = self.path(instance);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::io(&path, e)),
        }
    }
}

fn parse_document(content: &str) -> EngineResult<SignalDocument> {
    toml::from_str(content).map_err(|e| EngineError::serialization("signals", e))
}

impl SignalSource for RecordedSignals {
    fn collect(&self, instance: &str, names: &[String]) -> EngineResult<SignalMap> {
        let recorded = self.load(instance)?;
        Ok(names
            .iter()
            .filter_map(|name| recorded.get(name).map(|v| (name.clone(), *v)))
            .collect())
    }
}

/// Signals computed by configured shell commands. Exit status 0 is `true`.
#[derive(Debug, Clone)]
pub struct CommandSignals {
    commands: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandSignals {
    pub fn new(commands: BTreeMap<String, String>, timeout: Duration) -> Self {
        Self {
            commands,
            working_dir: None,
            timeout,
        }
    }

    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }
}

impl SignalSource for CommandSignals {
    fn collect(&self, instance: &str, names: &[String]) -> EngineResult<SignalMap> {
        let env = vec![("PHASEGATE_INSTANCE".to_string(), instance.to_string())];
        let mut signals = SignalMap::new();
        for name in names {
            let Some(command) = self.commands.get(name) else {
                continue;
            };
            let outcome = run_shell(command, self.working_dir.as_deref(), &env, self.timeout)?;
            signals.insert(name.clone(), outcome.success);
        }
        Ok(signals)
    }
}

/// Asks each source in order; the first source to report a name wins.
#[derive(Default)]
pub struct CompositeSignals {
    sources: Vec<Box<dyn SignalSource>>,
}

impl CompositeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl SignalSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl SignalSource for CompositeSignals {
    fn collect(&self, instance: &str, names: &[String]) -> EngineResult<SignalMap> {
        let mut signals = SignalMap::new();
        for source in &self.sources {
            let missing: Vec<String> = names
                .iter()
                .filter(|n| !signals.contains_key(*n))
                .cloned()
                .collect();
            if missing.is_empty() {
                break;
            }
            for (name, value) in source.collect(instance, &missing)? {
                signals.entry(name).or_insert(value);
            }
        }
        Ok(signals)
    }
}

/// Fixed signal values, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSignals(pub SignalMap);

impl SignalSource for StaticSignals {
    fn collect(&self, _instance: &str, names: &[String]) -> EngineResult<SignalMap> {
        let wanted: BTreeSet<&String> = names.iter().collect();
        Ok(self
            .0
            .iter()
            .filter(|(name, _)| wanted.contains(name))
            .map(|(n, v)| (n.clone(), *v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recorded_signals_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let recorded = RecordedSignals::new(temp.path());

        assert!(recorded.collect("i1", &names(&["build"])).unwrap().is_empty());

        recorded.record("i1", "build", true).unwrap();
        recorded.record("i1", "test", false).unwrap();
        recorded.record("i1", "test", true).unwrap();

        let signals = recorded.collect("i1", &names(&["build", "test", "lint"])).unwrap();
        assert_eq!(signals.len(), 2);
        assert!(signals["build"] && signals["test"]);

        recorded.clear("i1").unwrap();
        recorded.clear("i1").unwrap();
        assert!(recorded.load("i1").unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_signals_exit_status() {
        let commands = BTreeMap::from([
            ("ok".to_string(), "true".to_string()),
            ("broken".to_string(), "false".to_string()),
        ]);
        let source = CommandSignals::new(commands, Duration::from_secs(10));
        let signals = source.collect("i1", &names(&["ok", "broken", "unknown"])).unwrap();
        assert_eq!(signals.get("ok"), Some(&true));
        assert_eq!(signals.get("broken"), Some(&false));
        assert!(!signals.contains_key("unknown"));
    }

    #[test]
    fn test_composite_first_source_wins() {
        let first = StaticSignals(SignalMap::from([("build".to_string(), false)]));
        let second = StaticSignals(SignalMap::from([
            ("build".to_string(), true),
            ("test".to_string(), true),
        ]));
        let composite = CompositeSignals::new().with(first).with(second);

        let signals = composite.collect("i1", &names(&["build", "test"])).unwrap();
        assert!(!signals["build"]);
        assert!(signals["test"]);
    }
}
