//! Files generated for the served application.

use std::path::{Component, Path};

use serde_json::json;

use crate::config::SetupSettings;
use crate::config::paths::{APP_DIR, CONFIG_FILE, FALLBACK_MEDIA_DIR};

const SERVER_TEMPLATE: &str = include_str!("../../templates/server.js");

/// Static `package.json` for the served application.
pub fn package_manifest() -> serde_json::Value {
    json!({
        "name": "vista-server",
        "version": "1.0.0",
        "private": true,
        "main": "server.js",
        "scripts": {
            "start": "node server.js"
        },
        "dependencies": {
            "express": "^4.19.2"
        }
    })
}

/// Render `server.js` for a project.
///
/// The server locates the project root relative to its own directory when
/// `server_dir` is a plain relative path, so the project stays relocatable.
pub fn server_entry_source(project_root: &Path, settings: &SetupSettings) -> String {
    let root_expr = match ascent_to_root(&settings.server_dir) {
        Some(relative) => relative,
        None => project_root.display().to_string(),
    };

    SERVER_TEMPLATE
        .replace("{{PROJECT_ROOT}}", &js_string(&root_expr))
        .replace("{{APP_DIR}}", &js_string(APP_DIR))
        .replace("{{CONFIG_FILE}}", &js_string(CONFIG_FILE))
        .replace("{{FALLBACK_MEDIA_DIR}}", &js_string(FALLBACK_MEDIA_DIR))
        .replace("{{PORT}}", &settings.server_port.to_string())
}

/// `"../.."` for `a/b`; `None` when the path is absolute or climbs out.
fn ascent_to_root(server_dir: &Path) -> Option<String> {
    let mut depth = 0usize;
    for component in server_dir.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return None,
        }
    }
    if depth == 0 {
        return Some(".".to_string());
    }
    Some(vec![".."; depth].join("/"))
}

/// A JSON string literal is also a valid JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn ascent_counts_components() {
        assert_eq!(ascent_to_root(Path::new("server")).as_deref(), Some(".."));
        assert_eq!(ascent_to_root(Path::new("web/server")).as_deref(), Some("../.."));
        assert_eq!(ascent_to_root(Path::new("./server")).as_deref(), Some(".."));
        assert_eq!(ascent_to_root(Path::new("../elsewhere")), None);
    }

    #[test]
    fn server_source_has_no_placeholders_left() {
        let source = server_entry_source(Path::new("/srv/vista"), &SetupSettings::default());
        assert!(!source.contains("{{"));
        assert!(source.contains("\".vista\""));
        assert!(source.contains("3000"));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_server_dir_bakes_project_root() {
        let settings = SetupSettings {
            server_dir: PathBuf::from("/opt/vista-server"),
            ..SetupSettings::default()
        };
        let source = server_entry_source(Path::new("/srv/vista"), &settings);
        assert!(source.contains("\"/srv/vista\""));
    }

    #[test]
    fn manifest_depends_on_express() {
        let manifest = package_manifest();
        assert_eq!(manifest["main"], "server.js");
        assert!(manifest["dependencies"]["express"].is_string());
    }
}
