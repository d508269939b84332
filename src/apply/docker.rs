//! Container-log subsystem: Docker `daemon.json` log-driver options.

use serde::Serialize;
use serde_json::{Map, Value};

use super::Rendered;
use crate::policy::retention::RetentionParameters;

/// Driver whose `max-size`/`max-file` options we manage.
pub const LOG_DRIVER: &str = "json-file";

/// Log settings currently present in `daemon.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerLogSettings {
    pub log_driver: Option<String>,
    pub max_size: Option<String>,
    pub max_file: Option<String>,
}

impl ContainerLogSettings {
    /// Whether these settings already enforce `params`.
    #[must_use]
    pub fn matches(&self, params: &RetentionParameters) -> bool {
        self.log_driver.as_deref() == Some(LOG_DRIVER)
            && self.max_size.as_deref() == Some(params.container_log_max_size)
            && self.max_file == Some(params.container_log_max_file.to_string())
    }
}

/// Merge the retention limits into an existing `daemon.json`.
///
/// Unrelated keys and unrelated `log-opts` entries survive. A missing or
/// blank file starts from `{}`; anything that is not a JSON object is
/// refused rather than overwritten.
pub fn render(current: Option<&str>, params: &RetentionParameters) -> Result<Rendered, String> {
    let before = parse_root(current)?;
    let mut root = before.clone().unwrap_or_default();

    root.insert(
        "log-driver".to_string(),
        Value::String(LOG_DRIVER.to_string()),
    );
    let opts = root
        .entry("log-opts")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(opts) = opts.as_object_mut() else {
        return Err("\"log-opts\" is present but is not an object".to_string());
    };
    opts.insert(
        "max-size".to_string(),
        Value::String(params.container_log_max_size.to_string()),
    );
    // dockerd rejects non-string log-opts values.
    opts.insert(
        "max-file".to_string(),
        Value::String(params.container_log_max_file.to_string()),
    );

    let changed = before.as_ref() != Some(&root);
    let mut contents = serde_json::to_string_pretty(&Value::Object(root))
        .map_err(|err| format!("serialize daemon.json: {err}"))?;
    contents.push('\n');
    Ok(Rendered { contents, changed })
}

/// Extract the managed settings; unreadable content yields all `None`.
#[must_use]
pub fn read_settings(raw: &str) -> ContainerLogSettings {
    let Ok(Some(root)) = parse_root(Some(raw)) else {
        return ContainerLogSettings::default();
    };
    let opt = |key: &str| {
        root.get("log-opts")
            .and_then(|opts| opts.get(key))
            .and_then(value_as_string)
    };
    ContainerLogSettings {
        log_driver: root.get("log-driver").and_then(value_as_string),
        max_size: opt("max-size"),
        max_file: opt("max-file"),
    }
}

fn parse_root(current: Option<&str>) -> Result<Option<Map<String, Value>>, String> {
    let Some(raw) = current.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err("existing daemon.json root is not a JSON object".to_string()),
        Err(err) => Err(format!("existing daemon.json is not valid JSON: {err}")),
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::retention::{RetentionMode, parameters_for};

    fn parsed(rendered: &Rendered) -> Value {
        serde_json::from_str(&rendered.contents).expect("rendered JSON parses")
    }

    #[test]
    fn missing_file_gets_minimal_config() {
        let out = render(None, &parameters_for(RetentionMode::Strict)).unwrap();
        assert!(out.changed);
        assert!(out.contents.ends_with('\n'));
        let v = parsed(&out);
        assert_eq!(v["log-driver"], "json-file");
        assert_eq!(v["log-opts"]["max-size"], "5m");
        assert_eq!(v["log-opts"]["max-file"], "2");
    }

    #[test]
    fn blank_file_is_treated_as_empty_object() {
        let out = render(Some("  \n"), &parameters_for(RetentionMode::Normal)).unwrap();
        assert!(out.changed);
        assert_eq!(parsed(&out)["log-opts"]["max-file"], "3");
    }

    #[test]
    fn unrelated_keys_are_preserved() {
        let existing = r#"{
            "registry-mirrors": ["https://mirror.example"],
            "log-opts": {"labels": "env", "max-size": "100m"}
        }"#;
        let out = render(Some(existing), &parameters_for(RetentionMode::Relaxed)).unwrap();
        let v = parsed(&out);
        assert_eq!(v["registry-mirrors"][0], "https://mirror.example");
        assert_eq!(v["log-opts"]["labels"], "env");
        assert_eq!(v["log-opts"]["max-size"], "20m");
        assert_eq!(v["log-opts"]["max-file"], "5");
    }

    #[test]
    fn already_applied_is_unchanged() {
        let params = parameters_for(RetentionMode::Ample);
        let first = render(None, &params).unwrap();
        let second = render(Some(&first.contents), &params).unwrap();
        assert!(!second.changed);
        assert_eq!(first.contents, second.contents);
    }

    #[test]
    fn non_object_root_is_refused() {
        let err = render(Some("[1, 2]"), &parameters_for(RetentionMode::Strict)).unwrap_err();
        assert!(err.contains("not a JSON object"));
        let err = render(Some("{ broken"), &parameters_for(RetentionMode::Strict)).unwrap_err();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn non_object_log_opts_is_refused() {
        let err = render(
            Some(r#"{"log-opts": "max-size=5m"}"#),
            &parameters_for(RetentionMode::Strict),
        )
        .unwrap_err();
        assert!(err.contains("log-opts"));
    }

    #[test]
    fn read_settings_reports_current_values() {
        let out = render(None, &parameters_for(RetentionMode::Normal)).unwrap();
        let settings = read_settings(&out.contents);
        assert_eq!(settings.log_driver.as_deref(), Some("json-file"));
        assert_eq!(settings.max_size.as_deref(), Some("10m"));
        assert_eq!(settings.max_file.as_deref(), Some("3"));
        assert_eq!(read_settings("not json"), ContainerLogSettings::default());
    }

    #[test]
    fn matches_requires_driver_and_both_opts() {
        let params = parameters_for(RetentionMode::Strict);
        let out = render(None, &params).unwrap();
        assert!(read_settings(&out.contents).matches(&params));
        assert!(!read_settings(&out.contents).matches(&parameters_for(RetentionMode::Normal)));
        let local = read_settings(r#"{"log-driver": "local", "log-opts": {"max-size": "5m", "max-file": "2"}}"#);
        assert!(!local.matches(&params));
    }
}
